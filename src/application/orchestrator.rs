use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::events::{PaymentEvent, PaymentEvents};
use crate::domain::offer::{AppliedOffer, Offer};
use crate::domain::ports::{
    OfferCatalogBox, PaymentGatewayBox, PaymentInitiation, TransactionRepositoryBox, WebhookEvent,
};
use crate::domain::transaction::{
    NewTransaction, PaymentMethod, PaymentStatus, StatusChange, Transaction, TransactionId,
};
use crate::error::{PaymentError, Result};

/// Operational limits and timing policy for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on the original transaction amount.
    pub max_amount: Decimal,
    /// Per-attempt bound on a gateway call.
    pub gateway_timeout: Duration,
    /// Retries after the first attempt.
    pub gateway_retries: u32,
    /// Initial backoff between attempts; doubles each retry.
    pub retry_backoff: Duration,
    /// PROCESSING records untouched for longer than this are failed by the
    /// sweep.
    pub processing_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_amount: dec!(1_000_000),
            gateway_timeout: Duration::from_secs(30),
            gateway_retries: 3,
            retry_backoff: Duration::from_millis(500),
            processing_deadline: Duration::from_secs(15 * 60),
        }
    }
}

/// Result of initiating a payment.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub transaction: Transaction,
    /// Redirect URL when the method goes through the gateway.
    pub payment_url: Option<String>,
}

/// Response contract returned to the webhook caller. Always structured;
/// failures carry `success: false` and a message, never a raw fault.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct WebhookResponse {
    pub success: bool,
    pub order_id: Option<u64>,
    pub status: Option<PaymentStatus>,
    pub amount: Option<Decimal>,
    pub operation_id: Option<String>,
    pub is_test: Option<bool>,
    pub message: String,
}

impl WebhookResponse {
    fn settled(tx: &Transaction, event: &WebhookEvent, message: &str) -> Self {
        Self {
            success: true,
            order_id: Some(event.order_id),
            status: Some(tx.status),
            amount: Some(event.amount),
            operation_id: event.operation_id.clone(),
            is_test: Some(event.is_test),
            message: message.to_string(),
        }
    }

    fn rejected(raw: &HashMap<String, String>, err: &PaymentError) -> Self {
        Self {
            success: false,
            order_id: raw.get("InvId").and_then(|value| value.parse().ok()),
            status: None,
            amount: raw.get("Sum").and_then(|value| value.parse().ok()),
            operation_id: raw.get("OperationId").cloned(),
            is_test: None,
            message: err.to_string(),
        }
    }
}

/// Structured view of a transaction for display and export.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentSummary {
    pub transaction_id: String,
    pub user_id: String,
    pub original_amount: Decimal,
    pub currency: String,
    pub applied_offers: Vec<AppliedOffer>,
    pub total_discount: Decimal,
    pub final_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Top-level payment contract: creates transactions against the offer
/// catalog, drives them through the gateway, and settles them from
/// authenticated webhooks.
///
/// Owns the storage and gateway adapters behind their ports; constructed
/// once at startup and shared by handle.
pub struct PaymentOrchestrator {
    offers: OfferCatalogBox,
    transactions: TransactionRepositoryBox,
    gateway: PaymentGatewayBox,
    events: PaymentEvents,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        offers: OfferCatalogBox,
        transactions: TransactionRepositoryBox,
        gateway: PaymentGatewayBox,
    ) -> Self {
        Self::with_config(offers, transactions, gateway, OrchestratorConfig::default())
    }

    pub fn with_config(
        offers: OfferCatalogBox,
        transactions: TransactionRepositoryBox,
        gateway: PaymentGatewayBox,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            offers,
            transactions,
            gateway,
            events: PaymentEvents::default(),
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.events.subscribe()
    }

    /// Applies offers once and stores the new PENDING transaction with the
    /// discount snapshot.
    pub async fn create_transaction(&self, request: NewTransaction) -> Result<Transaction> {
        if request.amount <= Decimal::ZERO || request.amount > self.config.max_amount {
            return Err(PaymentError::AmountOutOfRange(request.amount));
        }

        let now = Utc::now();
        let id = self.transactions.allocate_id().await?;
        let application = self
            .offers
            .apply(request.amount, request.offer_ids.as_deref(), now)
            .await?;

        let tx = Transaction::new(id, request, application, now);
        self.transactions.insert(tx.clone()).await?;

        info!(
            %id,
            amount = %tx.amount,
            total_discount = %tx.total_discount,
            final_amount = %tx.final_amount,
            "transaction created"
        );
        self.events.publish(PaymentEvent::TransactionCreated {
            id,
            final_amount: tx.final_amount,
        });
        Ok(tx)
    }

    /// Moves the transaction into PROCESSING and dispatches it. Asynchronous
    /// methods stay PROCESSING until the gateway webhook arrives; the rest
    /// complete in-process. On final initiation failure the transaction is
    /// failed and the error returned.
    pub async fn process_payment(&self, id: TransactionId) -> Result<ProcessOutcome> {
        let tx = self
            .transactions
            .apply(id, StatusChange::BeginProcessing, Utc::now())
            .await?;

        if !tx.payment_method.is_asynchronous() {
            let reference = format!("INT_{}", Uuid::new_v4().simple());
            let completed = self
                .transactions
                .apply(
                    id,
                    StatusChange::Complete {
                        gateway_reference: reference.clone(),
                    },
                    Utc::now(),
                )
                .await?;
            info!(%id, %reference, "payment completed in-process");
            self.events.publish(PaymentEvent::PaymentCompleted {
                id,
                operation_id: Some(reference),
            });
            return Ok(ProcessOutcome {
                transaction: completed,
                payment_url: None,
            });
        }

        match self.initiate_with_retry(&tx).await {
            Ok(initiation) => {
                let mut entries = vec![(
                    "payment_reference".to_string(),
                    initiation.reference.clone(),
                )];
                if let Some(url) = &initiation.payment_url {
                    entries.push(("payment_url".to_string(), url.clone()));
                }
                let updated = self.transactions.annotate(id, entries, Utc::now()).await?;

                info!(%id, reference = %initiation.reference, "payment initiated, awaiting confirmation");
                self.events.publish(PaymentEvent::PaymentInitiated {
                    id,
                    reference: initiation.reference,
                });
                Ok(ProcessOutcome {
                    transaction: updated,
                    payment_url: initiation.payment_url,
                })
            }
            Err(err) => {
                // Boundary containment: whatever went wrong in the gateway,
                // the transaction must land in a terminal state.
                error!(%id, error = %err, "payment initiation failed");
                let reason = err.to_string();
                self.transactions
                    .apply(
                        id,
                        StatusChange::Fail {
                            reason: reason.clone(),
                        },
                        Utc::now(),
                    )
                    .await?;
                self.events
                    .publish(PaymentEvent::PaymentFailed { id, reason });
                Err(err)
            }
        }
    }

    async fn initiate_with_retry(&self, tx: &Transaction) -> Result<PaymentInitiation> {
        let mut backoff = self.config.retry_backoff;
        let mut last_error = PaymentError::GatewayTimeout;

        for attempt in 0..=self.config.gateway_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match tokio::time::timeout(self.config.gateway_timeout, self.gateway.initiate(tx)).await
            {
                Ok(Ok(initiation)) => return Ok(initiation),
                Ok(Err(err)) => {
                    warn!(id = %tx.id, attempt, error = %err, "gateway initiation attempt failed");
                    last_error = err;
                }
                Err(_) => {
                    warn!(id = %tx.id, attempt, "gateway initiation attempt timed out");
                    last_error = PaymentError::GatewayTimeout;
                }
            }
        }

        Err(last_error)
    }

    /// Handles a raw gateway notification. Failures are returned as a
    /// structured response, never as a fault.
    pub async fn handle_webhook(&self, raw: &HashMap<String, String>) -> WebhookResponse {
        match self.try_handle_webhook(raw).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "webhook rejected");
                WebhookResponse::rejected(raw, &err)
            }
        }
    }

    async fn try_handle_webhook(&self, raw: &HashMap<String, String>) -> Result<WebhookResponse> {
        let event = self.gateway.authenticate_webhook(raw)?;
        let id = TransactionId(event.order_id);
        let tx = self
            .transactions
            .get(id)
            .await?
            .ok_or(PaymentError::UnknownOrder(event.order_id))?;

        match tx.status {
            // At-least-once delivery: a replay after settlement is a no-op.
            status if status.is_settled() => {
                if event.amount != tx.final_amount {
                    warn!(
                        %id,
                        webhook_amount = %event.amount,
                        recorded_amount = %tx.final_amount,
                        "replayed webhook reports a different amount"
                    );
                }
                info!(%id, "webhook replay for a settled transaction");
                Ok(WebhookResponse::settled(&tx, &event, "already processed"))
            }
            PaymentStatus::Processing => {
                if event.amount != tx.final_amount {
                    warn!(
                        %id,
                        webhook_amount = %event.amount,
                        recorded_amount = %tx.final_amount,
                        "webhook amount differs from the recorded final amount"
                    );
                    self.transactions
                        .annotate(
                            id,
                            vec![(
                                "webhook_amount_mismatch".to_string(),
                                event.amount.to_string(),
                            )],
                            Utc::now(),
                        )
                        .await?;
                }

                let reference = event
                    .operation_id
                    .clone()
                    .unwrap_or_else(|| event.order_id.to_string());
                match self
                    .transactions
                    .apply(
                        id,
                        StatusChange::Complete {
                            gateway_reference: reference,
                        },
                        Utc::now(),
                    )
                    .await
                {
                    Ok(updated) => {
                        info!(
                            %id,
                            operation_id = event.operation_id.as_deref().unwrap_or(""),
                            verified_with = ?event.verified_with,
                            "payment confirmed by webhook"
                        );
                        self.events.publish(PaymentEvent::PaymentCompleted {
                            id,
                            operation_id: event.operation_id.clone(),
                        });
                        Ok(WebhookResponse::settled(
                            &updated,
                            &event,
                            "payment verified successfully",
                        ))
                    }
                    // A concurrent duplicate delivery can win the transition
                    // between our read and this apply; re-read and treat it
                    // as a replay.
                    Err(PaymentError::InvalidStateTransition { .. }) => {
                        let current = self
                            .transactions
                            .get(id)
                            .await?
                            .ok_or(PaymentError::UnknownOrder(event.order_id))?;
                        if current.status.is_settled() {
                            Ok(WebhookResponse::settled(&current, &event, "already processed"))
                        } else {
                            Err(PaymentError::InvalidStateTransition {
                                from: current.status,
                                to: PaymentStatus::Completed,
                            })
                        }
                    }
                    Err(err) => Err(err),
                }
            }
            from => Err(PaymentError::InvalidStateTransition {
                from,
                to: PaymentStatus::Completed,
            }),
        }
    }

    pub async fn cancel(&self, id: TransactionId) -> Result<Transaction> {
        let tx = self
            .transactions
            .apply(id, StatusChange::Cancel, Utc::now())
            .await?;
        info!(%id, "transaction cancelled");
        self.events.publish(PaymentEvent::PaymentCancelled { id });
        Ok(tx)
    }

    pub async fn refund(&self, id: TransactionId, reason: &str) -> Result<Transaction> {
        let tx = self
            .transactions
            .apply(
                id,
                StatusChange::Refund {
                    reason: reason.to_string(),
                },
                Utc::now(),
            )
            .await?;
        info!(%id, reason, "transaction refunded");
        self.events.publish(PaymentEvent::PaymentRefunded {
            id,
            reason: reason.to_string(),
        });
        Ok(tx)
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.transactions.get(id).await
    }

    /// Offers a user could apply to `amount` right now. Display only.
    pub async fn available_offers(&self, amount: Decimal) -> Result<Vec<Offer>> {
        self.offers.available(amount, Utc::now()).await
    }

    pub async fn payment_summary(&self, id: TransactionId) -> Result<PaymentSummary> {
        let tx = self
            .transactions
            .get(id)
            .await?
            .ok_or(PaymentError::UnknownTransaction(id))?;
        Ok(PaymentSummary {
            transaction_id: tx.id.to_string(),
            user_id: tx.user_id,
            original_amount: tx.amount,
            currency: tx.currency,
            applied_offers: tx.applied_offers,
            total_discount: tx.total_discount,
            final_amount: tx.final_amount,
            payment_method: tx.payment_method,
            status: tx.status,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        })
    }

    /// Fails every PROCESSING transaction untouched for longer than the
    /// configured deadline. Returns the ids it failed.
    pub async fn resolve_stale(&self) -> Result<Vec<TransactionId>> {
        let deadline = chrono::Duration::from_std(self.config.processing_deadline)
            .map_err(|err| PaymentError::ValidationError(err.to_string()))?;
        let cutoff = Utc::now() - deadline;
        let stale = self.transactions.stale_processing(cutoff).await?;

        let mut failed = Vec::with_capacity(stale.len());
        for id in stale {
            let change = StatusChange::Fail {
                reason: "processing deadline exceeded".to_string(),
            };
            match self.transactions.apply(id, change, Utc::now()).await {
                Ok(_) => {
                    warn!(%id, "stale PROCESSING transaction failed by sweep");
                    self.events.publish(PaymentEvent::PaymentFailed {
                        id,
                        reason: "processing deadline exceeded".to_string(),
                    });
                    failed.push(id);
                }
                // Settled between the scan and the sweep.
                Err(PaymentError::InvalidStateTransition { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(failed)
    }

    /// Background loop over [`Self::resolve_stale`].
    pub async fn run_sweeper(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(err) = self.resolve_stale().await {
                error!(error = %err, "stale-transaction sweep failed");
            }
        }
    }
}
