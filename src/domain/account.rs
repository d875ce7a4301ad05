use super::money::Money;
use super::order::OrderNumber;
use crate::error::LoyaltyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loyalty balance of one user.
///
/// `current` only grows through accrual credits and only shrinks through a
/// withdrawal that passed the sufficiency check, so it never drops below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserBalance {
    /// Points available for withdrawal.
    pub current: Money,
    /// Points spent over the account's lifetime.
    pub withdrawn: Money,
}

impl UserBalance {
    /// Credits an accrual to the available balance
    pub fn credit(&mut self, amount: Money) -> Result<(), LoyaltyError> {
        self.current = self
            .current
            .checked_add(amount)
            .ok_or_else(|| LoyaltyError::Validation("balance overflow".to_string()))?;
        Ok(())
    }

    /// Debits available funds if sufficient
    pub fn debit(&mut self, amount: Money) -> Result<(), LoyaltyError> {
        let current = self
            .current
            .checked_sub(amount)
            .ok_or(LoyaltyError::InsufficientFunds)?;
        let withdrawn = self
            .withdrawn
            .checked_add(amount)
            .ok_or_else(|| LoyaltyError::Validation("withdrawn total overflow".to_string()))?;
        self.current = current;
        self.withdrawn = withdrawn;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub order: OrderNumber,
    pub owner: UserId,
    pub sum: Money,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(order: OrderNumber, owner: UserId, sum: Money) -> Self {
        Self {
            order,
            owner,
            sum,
            processed_at: Utc::now(),
        }
    }
}
