use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::domain::offer::{AppliedOffer, Offer, OfferApplication};
use crate::domain::ports::{OfferCatalog, TransactionRepository};
use crate::domain::transaction::{PaymentStatus, StatusChange, Transaction, TransactionId};
use crate::error::{PaymentError, Result};

/// A thread-safe in-memory offer catalog.
///
/// Offers are kept in a `Vec` so that insertion order is preserved: the
/// no-explicit-ids application policy is "catalog insertion order", and a
/// map would lose it. Usage-limit increments happen under the write lock,
/// so concurrent `apply` calls serialize and never race past the limit.
#[derive(Default, Clone)]
pub struct InMemoryOfferCatalog {
    offers: Arc<RwLock<Vec<Offer>>>,
}

impl InMemoryOfferCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferCatalog for InMemoryOfferCatalog {
    async fn register(&self, offer: Offer) -> Result<()> {
        offer.validate()?;
        let mut offers = self.offers.write().await;
        if offers.iter().any(|existing| existing.id == offer.id) {
            return Err(PaymentError::DuplicateOfferId(offer.id));
        }
        offers.push(offer);
        Ok(())
    }

    async fn get(&self, offer_id: &str) -> Result<Option<Offer>> {
        let offers = self.offers.read().await;
        Ok(offers.iter().find(|offer| offer.id == offer_id).cloned())
    }

    async fn available(&self, amount: Decimal, now: DateTime<Utc>) -> Result<Vec<Offer>> {
        let offers = self.offers.read().await;
        Ok(offers
            .iter()
            .filter(|offer| offer.is_valid(now) && amount >= offer.min_amount)
            .cloned()
            .collect())
    }

    async fn apply(
        &self,
        amount: Decimal,
        offer_ids: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Result<OfferApplication> {
        // Single writer for the whole stacking pass: validity checks and
        // usage increments are one atomic step per offer.
        let mut offers = self.offers.write().await;

        let candidates: Vec<usize> = match offer_ids {
            // Unknown ids are skipped silently, caller order is kept.
            Some(ids) => ids
                .iter()
                .filter_map(|id| offers.iter().position(|offer| &offer.id == id))
                .collect(),
            None => (0..offers.len()).collect(),
        };

        let mut application = OfferApplication::default();
        let mut remaining = amount;

        for index in candidates {
            let Some(offer) = offers.get_mut(index) else {
                continue;
            };
            if !offer.is_valid(now) {
                continue;
            }
            // Stacking is sequential: each offer sees the amount left over
            // after the ones before it, including the qualifying minimum.
            let discount = offer.discount(remaining);
            if discount.is_zero() {
                continue;
            }
            offer.current_usage += 1;
            application.applied.push(AppliedOffer {
                offer_id: offer.id.clone(),
                title: offer.title.clone(),
                discount,
                bonus_points: offer.bonus_points.unwrap_or(0),
            });
            application.total_discount += discount;
            remaining -= discount;
        }

        Ok(application)
    }
}

/// A thread-safe in-memory transaction repository.
///
/// `apply` performs the read-modify-write under the write lock, which makes
/// transitions on the same id mutually exclusive. Reads hand out clones, so
/// no caller ever observes a half-mutated record.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn allocate_id(&self) -> Result<TransactionId> {
        Ok(TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1))
    }

    async fn insert(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.id) {
            return Err(PaymentError::ValidationError(format!(
                "transaction {} already stored",
                tx.id
            )));
        }
        transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn apply(
        &self,
        id: TransactionId,
        change: StatusChange,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(&id)
            .ok_or(PaymentError::UnknownTransaction(id))?;
        tx.apply(change, now)?;
        Ok(tx.clone())
    }

    async fn annotate(
        &self,
        id: TransactionId,
        entries: Vec<(String, String)>,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(&id)
            .ok_or(PaymentError::UnknownTransaction(id))?;
        tx.annotate(entries, now);
        Ok(tx.clone())
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<TransactionId>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.status == PaymentStatus::Processing && tx.updated_at < cutoff)
            .map(|tx| tx.id)
            .collect())
    }
}
