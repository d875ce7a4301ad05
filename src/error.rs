use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    /// Malformed input that is rejected outright (empty body, bad amount).
    #[error("Validation error: {0}")]
    Validation(String),
    /// Order number that fails the Luhn check or contains non-digits.
    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Intake queue is full")]
    QueueFull,
    #[error("Intake queue is closed")]
    QueueClosed,
    #[error("Persistence error: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoyaltyError {
    pub fn persistence<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Persistence(err.into())
    }
}

impl From<serde_json::Error> for LoyaltyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LoyaltyError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Persistence(Box::new(err))
    }
}

/// Failure modes of a single accrual oracle call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Network failure, timeout or 5xx. Retried within the polling window.
    #[error("transient oracle failure: {0}")]
    Transient(String),
    /// HTTP 429. The next poll must wait at least `retry_after`.
    #[error("oracle rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    /// Malformed or unexpected response. Reconciliation of the order is abandoned.
    #[error("permanent oracle failure: {0}")]
    Permanent(String),
}

pub type Result<T> = std::result::Result<T, LoyaltyError>;
