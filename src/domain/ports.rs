use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::offer::{Offer, OfferApplication};
use super::transaction::{StatusChange, Transaction, TransactionId};
use crate::error::Result;

/// Owns offer definitions, validity rules, and discount application.
#[async_trait]
pub trait OfferCatalog: Send + Sync {
    /// Registers a new offer; fails with `DuplicateOfferId` if the id exists.
    async fn register(&self, offer: Offer) -> Result<()>;

    async fn get(&self, offer_id: &str) -> Result<Option<Offer>>;

    /// Offers valid at `now` whose qualifying minimum is met. Display only:
    /// no usage is consumed.
    async fn available(&self, amount: Decimal, now: DateTime<Utc>) -> Result<Vec<Offer>>;

    /// Stacks offers over `amount`. With explicit ids, exactly those offers
    /// are tried in the caller-given order, silently skipping invalid ones;
    /// otherwise every currently valid offer is tried in catalog insertion
    /// order. Each successful application consumes one usage atomically.
    async fn apply(
        &self,
        amount: Decimal,
        offer_ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<OfferApplication>;
}

/// Owns transaction records and serializes lifecycle mutations per record.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn allocate_id(&self) -> Result<TransactionId>;

    /// Stores a full record; either the whole record is stored or nothing is.
    async fn insert(&self, tx: Transaction) -> Result<()>;

    /// Consistent snapshot of a record.
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Atomic read-modify-write of the state machine. Transitions on the
    /// same id are mutually exclusive; `UnknownTransaction` if absent.
    async fn apply(
        &self,
        id: TransactionId,
        change: StatusChange,
        now: DateTime<Utc>,
    ) -> Result<Transaction>;

    /// Merges metadata entries into a record without a status change.
    async fn annotate(
        &self,
        id: TransactionId,
        entries: Vec<(String, String)>,
        now: DateTime<Utc>,
    ) -> Result<Transaction>;

    /// Ids of PROCESSING records last touched before `cutoff`, for the
    /// stuck-payment sweep.
    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<TransactionId>>;
}

/// Artifact of a successful payment initiation.
#[derive(Debug, PartialEq, Clone)]
pub struct PaymentInitiation {
    /// Correlation reference recorded on the transaction.
    pub reference: String,
    /// Redirect URL for gateway-hosted checkout, when the method has one.
    pub payment_url: Option<String>,
}

/// Audit label of the credential that authenticated an inbound notification.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SecretUse {
    Inbound,
    Outbound,
}

/// An authenticated gateway notification. Ephemeral: consumed exactly once
/// by the orchestrator and discarded.
#[derive(Debug, PartialEq, Clone)]
pub struct WebhookEvent {
    pub order_id: u64,
    pub amount: Decimal,
    pub operation_id: Option<String>,
    pub is_test: bool,
    pub verified_with: SecretUse,
}

/// Boundary to the payment gateway. Implementations build signed outbound
/// requests and authenticate inbound notifications; they never own
/// transaction state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Builds the signed payment request for a transaction. Treated by the
    /// orchestrator as a fallible network operation.
    async fn initiate(&self, tx: &Transaction) -> Result<PaymentInitiation>;

    /// Validates and authenticates raw webhook fields.
    fn authenticate_webhook(&self, raw: &HashMap<String, String>) -> Result<WebhookEvent>;
}

pub type OfferCatalogBox = Box<dyn OfferCatalog>;
pub type TransactionRepositoryBox = Box<dyn TransactionRepository>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
