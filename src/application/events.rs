use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::transaction::TransactionId;

/// Lifecycle notifications published by the orchestrator. Subscribers (a bot
/// UI, an audit log) attach via [`PaymentEvents::subscribe`] and never call
/// back into the engine.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    TransactionCreated {
        id: TransactionId,
        final_amount: Decimal,
    },
    PaymentInitiated {
        id: TransactionId,
        reference: String,
    },
    PaymentCompleted {
        id: TransactionId,
        operation_id: Option<String>,
    },
    PaymentFailed {
        id: TransactionId,
        reason: String,
    },
    PaymentCancelled {
        id: TransactionId,
    },
    PaymentRefunded {
        id: TransactionId,
        reason: String,
    },
}

/// Broadcast publisher for [`PaymentEvent`]s.
#[derive(Debug, Clone)]
pub struct PaymentEvents {
    sender: broadcast::Sender<PaymentEvent>,
}

impl PaymentEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.sender.subscribe()
    }

    /// A send error only means nobody is subscribed right now.
    pub(crate) fn publish(&self, event: PaymentEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for PaymentEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
