use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money;
use crate::error::{PaymentError, Result};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    Discount,
    Cashback,
    Bonus,
    FreeShipping,
    LoyaltyPoints,
}

/// A monetary offer that can be stacked onto a transaction amount.
///
/// Offers are registered administratively and never deleted; they retire by
/// the `is_active` flag or by expiry of the validity window. `current_usage`
/// is only ever incremented by a successful application.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Offer {
    pub id: String,
    pub r#type: OfferType,
    pub title: String,
    pub description: String,
    /// Percentage for [`OfferType::Discount`], in `[0, 100]`.
    pub discount_percentage: Option<Decimal>,
    /// Fixed amount for [`OfferType::Cashback`].
    pub cashback_amount: Option<Decimal>,
    pub bonus_points: Option<u32>,
    /// Qualifying minimum; checked against the amount the offer is applied to.
    pub min_amount: Decimal,
    /// Upper bound on a percentage discount.
    pub max_discount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub code: Option<String>,
    pub is_active: bool,
    pub usage_limit: Option<u32>,
    pub current_usage: u32,
}

impl Offer {
    pub fn new(id: impl Into<String>, r#type: OfferType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            r#type,
            title: title.into(),
            description: String::new(),
            discount_percentage: None,
            cashback_amount: None,
            bonus_points: None,
            min_amount: Decimal::ZERO,
            max_discount: None,
            valid_from: None,
            valid_until: None,
            code: None,
            is_active: true,
            usage_limit: None,
            current_usage: 0,
        }
    }

    /// Checks the registration invariants.
    pub fn validate(&self) -> Result<()> {
        if let Some(pct) = self.discount_percentage
            && !(Decimal::ZERO..=Decimal::ONE_HUNDRED).contains(&pct)
        {
            return Err(PaymentError::ValidationError(format!(
                "offer {}: discount percentage must be between 0 and 100",
                self.id
            )));
        }
        if let Some(cashback) = self.cashback_amount
            && cashback < Decimal::ZERO
        {
            return Err(PaymentError::ValidationError(format!(
                "offer {}: cashback amount cannot be negative",
                self.id
            )));
        }
        if let Some(cap) = self.max_discount
            && cap < Decimal::ZERO
        {
            return Err(PaymentError::ValidationError(format!(
                "offer {}: max discount cannot be negative",
                self.id
            )));
        }
        if self.min_amount < Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "offer {}: minimum amount cannot be negative",
                self.id
            )));
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until)
            && from > until
        {
            return Err(PaymentError::ValidationError(format!(
                "offer {}: valid_from must not be after valid_until",
                self.id
            )));
        }
        if let Some(limit) = self.usage_limit
            && self.current_usage > limit
        {
            return Err(PaymentError::ValidationError(format!(
                "offer {}: current usage exceeds the usage limit",
                self.id
            )));
        }
        Ok(())
    }

    pub fn usage_remaining(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.current_usage < limit)
    }

    /// Active, inside the validity window (a missing bound is unbounded),
    /// and with usage remaining.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(from) = self.valid_from
            && now < from
        {
            return false;
        }
        if let Some(until) = self.valid_until
            && now > until
        {
            return false;
        }
        self.usage_remaining()
    }

    /// Discount this offer grants against `amount`, rounded to minor-unit
    /// precision. Below the qualifying minimum, and for types that carry no
    /// monetary discount, the result is zero.
    pub fn discount(&self, amount: Decimal) -> Decimal {
        if amount < self.min_amount {
            return Decimal::ZERO;
        }

        let raw = match self.r#type {
            OfferType::Discount => match self.discount_percentage {
                Some(pct) => {
                    let discount = amount * pct / Decimal::ONE_HUNDRED;
                    match self.max_discount {
                        Some(cap) => discount.min(cap),
                        None => discount,
                    }
                }
                None => Decimal::ZERO,
            },
            OfferType::Cashback => match self.cashback_amount {
                Some(cashback) => cashback.min(amount),
                None => Decimal::ZERO,
            },
            _ => Decimal::ZERO,
        };

        money::round_minor(raw)
    }
}

/// By-value snapshot of one applied offer, embedded into the transaction at
/// creation time. Later changes to the catalog never alter it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AppliedOffer {
    pub offer_id: String,
    pub title: String,
    pub discount: Decimal,
    pub bonus_points: u32,
}

/// Result of stacking offers over an amount.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct OfferApplication {
    pub total_discount: Decimal,
    pub applied: Vec<AppliedOffer>,
}
