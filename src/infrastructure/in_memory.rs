use crate::domain::account::{UserBalance, UserId, Withdrawal};
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderNumber, OrderStatus};
use crate::domain::ports::{LoyaltyStore, OrderInsert, StatusUpdate, WithdrawalInsert};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderNumber, Order>,
    balances: HashMap<UserId, UserBalance>,
    withdrawals: HashMap<OrderNumber, Withdrawal>,
}

/// A thread-safe in-memory store.
///
/// All tables sit behind one `RwLock`; every mutating operation holds the
/// write guard for its whole read-check-write, which is what makes status
/// flips, credits and debits atomic with respect to each other.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoyaltyStore for InMemoryStore {
    async fn order_owner(&self, number: &OrderNumber) -> Result<Option<UserId>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(number).map(|o| o.owner.clone()))
    }

    async fn insert_order(&self, number: &OrderNumber, owner: &UserId) -> Result<OrderInsert> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.orders.get(number) {
            return Ok(OrderInsert::Exists(existing.owner.clone()));
        }
        tables
            .orders
            .insert(number.clone(), Order::new(number.clone(), owner.clone()));
        Ok(OrderInsert::Inserted)
    }

    async fn update_order_status_and_balance(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        owner: &UserId,
        accrual: Money,
    ) -> Result<StatusUpdate> {
        let mut tables = self.tables.write().await;
        let Tables {
            orders, balances, ..
        } = &mut *tables;

        let Some(order) = orders.get_mut(number).filter(|o| &o.owner == owner) else {
            return Ok(StatusUpdate::NotFound);
        };
        if !order.status.can_transition_to(status) {
            return Ok(StatusUpdate::Unchanged);
        }

        if status == OrderStatus::Processed {
            // Credit on a copy first so a failure leaves both rows untouched.
            let mut balance = balances.get(owner).copied().unwrap_or_default();
            balance.credit(accrual)?;
            balances.insert(owner.clone(), balance);
            order.accrual = Some(accrual);
        }
        order.status = status;
        Ok(StatusUpdate::Applied)
    }

    async fn orders_by_owner(&self, owner: &UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| &o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.submitted_at);
        Ok(orders)
    }

    async fn balance(&self, owner: &UserId) -> Result<UserBalance> {
        let tables = self.tables.read().await;
        Ok(tables.balances.get(owner).copied().unwrap_or_default())
    }

    async fn insert_withdrawal(
        &self,
        number: &OrderNumber,
        owner: &UserId,
        sum: Money,
    ) -> Result<WithdrawalInsert> {
        let mut tables = self.tables.write().await;
        if tables.withdrawals.contains_key(number) {
            return Ok(WithdrawalInsert::Duplicate);
        }

        let mut balance = tables.balances.get(owner).copied().unwrap_or_default();
        if balance.debit(sum).is_err() {
            return Ok(WithdrawalInsert::InsufficientFunds);
        }
        tables.balances.insert(owner.clone(), balance);
        tables.withdrawals.insert(
            number.clone(),
            Withdrawal::new(number.clone(), owner.clone(), sum),
        );
        Ok(WithdrawalInsert::Recorded)
    }

    async fn withdrawals_by_owner(&self, owner: &UserId) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read().await;
        let mut withdrawals: Vec<Withdrawal> = tables
            .withdrawals
            .values()
            .filter(|w| &w.owner == owner)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.processed_at);
        Ok(withdrawals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_insert_order_reports_existing_owner() {
        let store = InMemoryStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let number = order("79927398713");

        assert_eq!(
            store.insert_order(&number, &alice).await.unwrap(),
            OrderInsert::Inserted
        );
        assert_eq!(
            store.insert_order(&number, &bob).await.unwrap(),
            OrderInsert::Exists(alice.clone())
        );
        assert_eq!(store.order_owner(&number).await.unwrap(), Some(alice));
        assert_eq!(store.order_owner(&order("12345678903")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_processed_credits_once() {
        let store = InMemoryStore::new();
        let alice = UserId::new("alice");
        let number = order("79927398713");
        store.insert_order(&number, &alice).await.unwrap();

        let accrual = Money::from_minor(500);
        let first = store
            .update_order_status_and_balance(&number, OrderStatus::Processed, &alice, accrual)
            .await
            .unwrap();
        let second = store
            .update_order_status_and_balance(&number, OrderStatus::Processed, &alice, accrual)
            .await
            .unwrap();

        assert_eq!(first, StatusUpdate::Applied);
        assert_eq!(second, StatusUpdate::Unchanged);
        assert_eq!(store.balance(&alice).await.unwrap().current, accrual);

        let orders = store.orders_by_owner(&alice).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::Processed);
        assert_eq!(orders[0].accrual, Some(accrual));
    }

    #[tokio::test]
    async fn test_update_requires_matching_owner() {
        let store = InMemoryStore::new();
        let number = order("79927398713");
        store
            .insert_order(&number, &UserId::new("alice"))
            .await
            .unwrap();

        let result = store
            .update_order_status_and_balance(
                &number,
                OrderStatus::Processed,
                &UserId::new("mallory"),
                Money::from_minor(100),
            )
            .await
            .unwrap();
        assert_eq!(result, StatusUpdate::NotFound);
        assert_eq!(
            store.balance(&UserId::new("mallory")).await.unwrap(),
            UserBalance::default()
        );
    }

    #[tokio::test]
    async fn test_invalid_does_not_credit() {
        let store = InMemoryStore::new();
        let alice = UserId::new("alice");
        let number = order("79927398713");
        store.insert_order(&number, &alice).await.unwrap();

        store
            .update_order_status_and_balance(&number, OrderStatus::Invalid, &alice, Money::ZERO)
            .await
            .unwrap();
        let late = store
            .update_order_status_and_balance(
                &number,
                OrderStatus::Processed,
                &alice,
                Money::from_minor(100),
            )
            .await
            .unwrap();

        assert_eq!(late, StatusUpdate::Unchanged);
        assert_eq!(store.balance(&alice).await.unwrap().current, Money::ZERO);
    }

    #[tokio::test]
    async fn test_withdrawal_checks_and_records() {
        let store = InMemoryStore::new();
        let alice = UserId::new("alice");
        let number = order("79927398713");
        store.insert_order(&number, &alice).await.unwrap();
        store
            .update_order_status_and_balance(
                &number,
                OrderStatus::Processed,
                &alice,
                Money::from_minor(1000),
            )
            .await
            .unwrap();

        let spend = order("2377225624");
        assert_eq!(
            store
                .insert_withdrawal(&spend, &alice, Money::from_minor(1001))
                .await
                .unwrap(),
            WithdrawalInsert::InsufficientFunds
        );
        assert_eq!(
            store
                .insert_withdrawal(&spend, &alice, Money::from_minor(400))
                .await
                .unwrap(),
            WithdrawalInsert::Recorded
        );
        assert_eq!(
            store
                .insert_withdrawal(&spend, &alice, Money::from_minor(400))
                .await
                .unwrap(),
            WithdrawalInsert::Duplicate
        );

        let balance = store.balance(&alice).await.unwrap();
        assert_eq!(balance.current, Money::from_minor(600));
        assert_eq!(balance.withdrawn, Money::from_minor(400));
        assert_eq!(store.withdrawals_by_owner(&alice).await.unwrap().len(), 1);
    }
}
