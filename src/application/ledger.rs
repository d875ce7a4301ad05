use crate::domain::account::UserId;
use crate::domain::money::Money;
use crate::domain::order::{OrderNumber, OrderStatus};
use crate::domain::ports::{SharedStore, StatusUpdate};
use crate::error::{LoyaltyError, Result};
use tracing::{debug, info};

/// Final outcome of an order as decided by the accrual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Processed(Money),
    Invalid,
}

impl Resolution {
    pub fn status(self) -> OrderStatus {
        match self {
            Resolution::Processed(_) => OrderStatus::Processed,
            Resolution::Invalid => OrderStatus::Invalid,
        }
    }

    pub fn accrual(self) -> Money {
        match self {
            Resolution::Processed(accrual) => accrual,
            Resolution::Invalid => Money::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The order was already terminal; nothing was written.
    AlreadyFinal,
}

/// Writes reconciliation results to the store.
///
/// The credit is only ever performed by the store operation that moves the
/// order out of a non-terminal status, so replaying a result is a no-op.
#[derive(Clone)]
pub struct LedgerApplier {
    store: SharedStore,
}

impl LedgerApplier {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn apply_result(
        &self,
        order: &OrderNumber,
        owner: &UserId,
        resolution: Resolution,
    ) -> Result<ApplyOutcome> {
        let update = self
            .store
            .update_order_status_and_balance(order, resolution.status(), owner, resolution.accrual())
            .await?;

        match update {
            StatusUpdate::Applied => {
                info!(
                    %order,
                    %owner,
                    status = %resolution.status(),
                    accrual = %resolution.accrual(),
                    "reconciliation result applied"
                );
                Ok(ApplyOutcome::Applied)
            }
            StatusUpdate::Unchanged => {
                debug!(%order, "order already final, result ignored");
                Ok(ApplyOutcome::AlreadyFinal)
            }
            StatusUpdate::NotFound => Err(LoyaltyError::NotFound(format!(
                "order {order} of user {owner}"
            ))),
        }
    }

    /// Records that the accrual service has started processing the order.
    pub async fn record_processing(&self, order: &OrderNumber, owner: &UserId) -> Result<()> {
        match self
            .store
            .update_order_status_and_balance(order, OrderStatus::Processing, owner, Money::ZERO)
            .await?
        {
            StatusUpdate::NotFound => Err(LoyaltyError::NotFound(format!(
                "order {order} of user {owner}"
            ))),
            StatusUpdate::Applied | StatusUpdate::Unchanged => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::LoyaltyStore;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Arc;

    async fn setup() -> (Arc<InMemoryStore>, LedgerApplier, OrderNumber, UserId) {
        let store = Arc::new(InMemoryStore::new());
        let order = OrderNumber::parse("79927398713").unwrap();
        let owner = UserId::new("alice");
        store.insert_order(&order, &owner).await.unwrap();
        let ledger = LedgerApplier::new(store.clone());
        (store, ledger, order, owner)
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let (store, ledger, order, owner) = setup().await;
        let resolution = Resolution::Processed(Money::from_minor(500));

        assert_eq!(
            ledger.apply_result(&order, &owner, resolution).await.unwrap(),
            ApplyOutcome::Applied
        );
        assert_eq!(
            ledger.apply_result(&order, &owner, resolution).await.unwrap(),
            ApplyOutcome::AlreadyFinal
        );
        assert_eq!(
            store.balance(&owner).await.unwrap().current,
            Money::from_minor(500)
        );
    }

    #[tokio::test]
    async fn test_processing_then_invalid() {
        let (store, ledger, order, owner) = setup().await;

        ledger.record_processing(&order, &owner).await.unwrap();
        // a second PROCESSING report is harmless
        ledger.record_processing(&order, &owner).await.unwrap();
        ledger
            .apply_result(&order, &owner, Resolution::Invalid)
            .await
            .unwrap();

        let orders = store.orders_by_owner(&owner).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::Invalid);
        assert_eq!(orders[0].accrual, None);
        assert_eq!(store.balance(&owner).await.unwrap().current, Money::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (_store, ledger, _order, owner) = setup().await;
        let unknown = OrderNumber::parse("12345678903").unwrap();

        let result = ledger
            .apply_result(&unknown, &owner, Resolution::Processed(Money::from_minor(1)))
            .await;
        assert!(matches!(result, Err(LoyaltyError::NotFound(_))));
    }
}
