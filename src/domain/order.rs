use super::account::UserId;
use super::luhn;
use super::money::Money;
use crate::error::{LoyaltyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A Luhn-valid purchase order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validates `raw` as given; surrounding whitespace is not stripped.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(LoyaltyError::Validation(
                "order number is empty".to_string(),
            ));
        }
        if !luhn::is_valid(raw) {
            return Err(LoyaltyError::InvalidOrderNumber(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Status only moves forward: NEW -> PROCESSING -> {PROCESSED, INVALID},
    /// and NEW may jump straight to a terminal status.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::New, OrderStatus::New) => false,
            (OrderStatus::New, _) => true,
            (OrderStatus::Processing, next) => next.is_terminal(),
            (OrderStatus::Processed | OrderStatus::Invalid, _) => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub number: OrderNumber,
    pub owner: UserId,
    pub status: OrderStatus,
    /// Set once the order reaches PROCESSED.
    pub accrual: Option<Money>,
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: OrderNumber, owner: UserId) -> Self {
        Self {
            number,
            owner,
            status: OrderStatus::New,
            accrual: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Unit of work handed from order intake to the reconciliation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionEvent {
    pub order: OrderNumber,
    pub owner: UserId,
}
