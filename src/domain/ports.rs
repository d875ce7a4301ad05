use super::account::{UserBalance, UserId, Withdrawal};
use super::accrual::AccrualReport;
use super::money::Money;
use super::order::{Order, OrderNumber, OrderStatus};
use crate::error::{OracleError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderInsert {
    Inserted,
    /// The number is already registered, possibly by someone else.
    Exists(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    /// The order is already terminal (or already at that status); nothing changed.
    Unchanged,
    /// No order with that number belongs to the given owner.
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalInsert {
    Recorded,
    Duplicate,
    InsufficientFunds,
}

/// Persistence port for orders, balances and withdrawals.
///
/// Implementations must make `update_order_status_and_balance` and
/// `insert_withdrawal` atomic and serialize them against each other for the
/// same user: each one reads, checks and writes the balance row as a single
/// critical section.
#[async_trait]
pub trait LoyaltyStore: Send + Sync {
    async fn order_owner(&self, number: &OrderNumber) -> Result<Option<UserId>>;

    async fn insert_order(&self, number: &OrderNumber, owner: &UserId) -> Result<OrderInsert>;

    /// Moves the order to `status`. When the new status is PROCESSED the
    /// `accrual` is recorded on the order and credited to the owner's balance
    /// in the same unit of work. Non-forward transitions are no-ops.
    async fn update_order_status_and_balance(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        owner: &UserId,
        accrual: Money,
    ) -> Result<StatusUpdate>;

    /// Orders of `owner`, oldest submission first.
    async fn orders_by_owner(&self, owner: &UserId) -> Result<Vec<Order>>;

    async fn balance(&self, owner: &UserId) -> Result<UserBalance>;

    /// Checks the balance, debits it and records the withdrawal as one unit.
    async fn insert_withdrawal(
        &self,
        number: &OrderNumber,
        owner: &UserId,
        sum: Money,
    ) -> Result<WithdrawalInsert>;

    /// Withdrawals of `owner`, oldest first.
    async fn withdrawals_by_owner(&self, owner: &UserId) -> Result<Vec<Withdrawal>>;
}

/// Client of the external accrual service.
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    async fn fetch_status(&self, order: &OrderNumber) -> std::result::Result<AccrualReport, OracleError>;
}

pub type SharedStore = Arc<dyn LoyaltyStore>;
pub type SharedOracle = Arc<dyn AccrualOracle>;
