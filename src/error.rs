use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::transaction::{PaymentStatus, TransactionId};

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("offer {0} is already registered")]
    DuplicateOfferId(String),
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),
    #[error("no transaction for order {0}")]
    UnknownOrder(u64),
    #[error("illegal state transition {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("signature verification failed")]
    SignatureMismatch,
    #[error("merchant login mismatch: expected {expected}, got {got}")]
    MerchantMismatch { expected: String, got: String },
    #[error("gateway call timed out")]
    GatewayTimeout,
    #[error("gateway error: {0}")]
    GatewayError(String),
    #[error("amount {0} is outside the accepted range")]
    AmountOutOfRange(Decimal),
}
