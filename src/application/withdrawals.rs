use crate::domain::account::{UserBalance, UserId, Withdrawal};
use crate::domain::money::Money;
use crate::domain::order::OrderNumber;
use crate::domain::ports::{SharedStore, WithdrawalInsert};
use crate::error::{LoyaltyError, Result};
use tracing::info;

/// Balance queries and point spending.
#[derive(Clone)]
pub struct BalanceService {
    store: SharedStore,
}

impl BalanceService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Debits `sum` from the owner's balance against `raw_order`.
    ///
    /// The balance check, the debit and the withdrawal record are one store
    /// operation, so concurrent credits and debits cannot interleave with it.
    pub async fn withdraw(&self, owner: &UserId, raw_order: &str, sum: Money) -> Result<()> {
        let number = OrderNumber::parse(raw_order.trim())?;
        if sum.is_zero() {
            return Err(LoyaltyError::Validation(
                "withdrawal sum must be positive".to_string(),
            ));
        }

        match self.store.insert_withdrawal(&number, owner, sum).await? {
            WithdrawalInsert::Recorded => {
                info!(order = %number, %owner, %sum, "withdrawal recorded");
                Ok(())
            }
            WithdrawalInsert::Duplicate => Err(LoyaltyError::Conflict(format!(
                "withdrawal for order {number} already recorded"
            ))),
            WithdrawalInsert::InsufficientFunds => Err(LoyaltyError::InsufficientFunds),
        }
    }

    pub async fn balance(&self, owner: &UserId) -> Result<UserBalance> {
        self.store.balance(owner).await
    }

    pub async fn withdrawals(&self, owner: &UserId) -> Result<Vec<Withdrawal>> {
        self.store.withdrawals_by_owner(owner).await
    }
}
