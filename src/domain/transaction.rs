use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::offer::{AppliedOffer, OfferApplication};
use crate::error::{PaymentError, Result};

/// Monotonic, collision-free transaction identifier. The numeric value
/// doubles as the invoice id (`InvId`) sent to the gateway.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn invoice_id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TXN-{:06}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// The payment has been captured; replayed gateway notifications for
    /// these states are acknowledged without re-transitioning.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    fn permits(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Sbp,
    Card,
    Wallet,
    BankTransfer,
}

impl PaymentMethod {
    /// Methods settled asynchronously through the gateway; the rest
    /// complete in-process.
    pub fn is_asynchronous(&self) -> bool {
        matches!(self, Self::Sbp | Self::Card)
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sbp" => Ok(Self::Sbp),
            "card" => Ok(Self::Card),
            "wallet" => Ok(Self::Wallet),
            "bank_transfer" => Ok(Self::BankTransfer),
            other => Err(PaymentError::ValidationError(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// A command against the transaction state machine. Each variant maps to
/// exactly one target state; legality is decided by the current state.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StatusChange {
    BeginProcessing,
    Complete { gateway_reference: String },
    Fail { reason: String },
    Cancel,
    Refund { reason: String },
}

impl StatusChange {
    pub fn target(&self) -> PaymentStatus {
        match self {
            Self::BeginProcessing => PaymentStatus::Processing,
            Self::Complete { .. } => PaymentStatus::Completed,
            Self::Fail { .. } => PaymentStatus::Failed,
            Self::Cancel => PaymentStatus::Cancelled,
            Self::Refund { .. } => PaymentStatus::Refunded,
        }
    }
}

/// Creation request for a transaction, before offers are applied and an id
/// is allocated.
#[derive(Debug, PartialEq, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub description: Option<String>,
    /// Explicit offers to apply, in order. `None` selects every currently
    /// valid offer in catalog insertion order.
    pub offer_ids: Option<Vec<String>>,
    pub metadata: HashMap<String, String>,
}

impl NewTransaction {
    pub fn new(user_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            currency: "RUB".to_string(),
            payment_method: PaymentMethod::Sbp,
            description: None,
            offer_ids: None,
            metadata: HashMap::new(),
        }
    }
}

/// A payment transaction. Created in `Pending`, mutated only through
/// [`Transaction::apply`], never deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: String,
    /// Original amount before discounts.
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub description: Option<String>,
    /// Discount snapshot taken at creation, in application order.
    pub applied_offers: Vec<AppliedOffer>,
    pub total_discount: Decimal,
    /// `amount - total_discount`; never negative.
    pub final_amount: Decimal,
    pub gateway_reference: Option<String>,
    pub gateway_status: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        request: NewTransaction,
        application: OfferApplication,
        now: DateTime<Utc>,
    ) -> Self {
        let final_amount = request.amount - application.total_discount;
        Self {
            id,
            user_id: request.user_id,
            amount: request.amount,
            currency: request.currency,
            payment_method: request.payment_method,
            status: PaymentStatus::Pending,
            description: request.description,
            applied_offers: application.applied,
            total_discount: application.total_discount,
            final_amount,
            gateway_reference: None,
            gateway_status: None,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Drives the state machine. An illegal edge fails with
    /// `InvalidStateTransition` and leaves the record untouched.
    pub fn apply(&mut self, change: StatusChange, now: DateTime<Utc>) -> Result<()> {
        let to = change.target();
        if !self.status.permits(to) {
            return Err(PaymentError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }

        match change {
            StatusChange::BeginProcessing | StatusChange::Cancel => {}
            StatusChange::Complete { gateway_reference } => {
                self.gateway_reference = Some(gateway_reference);
                self.gateway_status = Some("success".to_string());
            }
            StatusChange::Fail { reason } => {
                self.gateway_status = Some("failed".to_string());
                self.metadata.insert("failure_reason".to_string(), reason);
            }
            StatusChange::Refund { reason } => {
                self.metadata.insert("refund_reason".to_string(), reason);
                self.metadata
                    .insert("refunded_at".to_string(), now.to_rfc3339());
            }
        }

        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Merges metadata entries without changing the status.
    pub fn annotate(&mut self, entries: Vec<(String, String)>, now: DateTime<Utc>) {
        self.metadata.extend(entries);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending_tx() -> Transaction {
        Transaction::new(
            TransactionId(1),
            NewTransaction::new("user-1", dec!(100.00)),
            OfferApplication::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_happy_path_edges() {
        let mut tx = pending_tx();
        let now = Utc::now();

        tx.apply(StatusChange::BeginProcessing, now).unwrap();
        assert_eq!(tx.status, PaymentStatus::Processing);

        tx.apply(
            StatusChange::Complete {
                gateway_reference: "op-1".to_string(),
            },
            now,
        )
        .unwrap();
        assert_eq!(tx.status, PaymentStatus::Completed);
        assert_eq!(tx.gateway_reference.as_deref(), Some("op-1"));

        tx.apply(
            StatusChange::Refund {
                reason: "customer request".to_string(),
            },
            now,
        )
        .unwrap();
        assert_eq!(tx.status, PaymentStatus::Refunded);
        assert_eq!(
            tx.metadata.get("refund_reason").map(String::as_str),
            Some("customer request")
        );
        assert!(tx.metadata.contains_key("refunded_at"));
    }

    #[test]
    fn test_refund_requires_completed() {
        let mut tx = pending_tx();
        let err = tx
            .apply(
                StatusChange::Refund {
                    reason: "too early".to_string(),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::InvalidStateTransition {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Refunded,
            }
        ));
        // Record untouched.
        assert_eq!(tx.status, PaymentStatus::Pending);
        assert!(tx.metadata.is_empty());
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut tx = pending_tx();
        assert!(
            tx.apply(
                StatusChange::Complete {
                    gateway_reference: "op-1".to_string(),
                },
                Utc::now(),
            )
            .is_err()
        );

        tx.apply(StatusChange::BeginProcessing, Utc::now()).unwrap();
        tx.apply(
            StatusChange::Complete {
                gateway_reference: "op-1".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        // Double completion is not a legal edge.
        assert!(
            tx.apply(
                StatusChange::Complete {
                    gateway_reference: "op-2".to_string(),
                },
                Utc::now(),
            )
            .is_err()
        );
    }

    #[test]
    fn test_cancel_from_pending_and_processing_only() {
        let mut tx = pending_tx();
        tx.apply(StatusChange::Cancel, Utc::now()).unwrap();
        assert_eq!(tx.status, PaymentStatus::Cancelled);

        let mut tx = pending_tx();
        tx.apply(StatusChange::BeginProcessing, Utc::now()).unwrap();
        tx.apply(StatusChange::Cancel, Utc::now()).unwrap();
        assert_eq!(tx.status, PaymentStatus::Cancelled);

        // Terminal states cannot be cancelled.
        assert!(tx.apply(StatusChange::Cancel, Utc::now()).is_err());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut tx = pending_tx();
        tx.apply(StatusChange::BeginProcessing, Utc::now()).unwrap();
        tx.apply(
            StatusChange::Fail {
                reason: "gateway unavailable".to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(tx.status, PaymentStatus::Failed);
        assert_eq!(
            tx.metadata.get("failure_reason").map(String::as_str),
            Some("gateway unavailable")
        );
    }

    #[test]
    fn test_updated_at_touched_created_at_immutable() {
        let mut tx = pending_tx();
        let created = tx.created_at;
        let later = Utc::now() + chrono::Duration::seconds(5);
        tx.apply(StatusChange::BeginProcessing, later).unwrap();
        assert_eq!(tx.created_at, created);
        assert_eq!(tx.updated_at, later);
    }

    #[test]
    fn test_invoice_id_round_trip() {
        let id = TransactionId(42);
        assert_eq!(id.invoice_id(), 42);
        assert_eq!(id.to_string(), "TXN-000042");
    }
}
