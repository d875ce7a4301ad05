use crate::domain::account::{UserBalance, UserId, Withdrawal};
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderNumber, OrderStatus};
use crate::domain::ports::{LoyaltyStore, OrderInsert, StatusUpdate, WithdrawalInsert};
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for orders, keyed by order number.
pub const CF_ORDERS: &str = "orders";
/// Column Family for user balances, keyed by user id.
pub const CF_BALANCES: &str = "balances";
/// Column Family for withdrawals, keyed by order number.
pub const CF_WITHDRAWALS: &str = "withdrawals";

/// A persistent store implementation using RocksDB.
///
/// Multi-row updates go through a single `WriteBatch`, so a status flip and
/// its balance credit land together or not at all. RocksDB has no row locks;
/// the `write_lock` serializes every read-check-write sequence in this
/// process instead.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_BALANCES, CF_WITHDRAWALS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LoyaltyError::persistence(format!("{name} column family not found"))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn scan<T, F>(&self, cf_name: &str, mut keep: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let row: T = serde_json::from_slice(&value)?;
            if keep(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn load_balance(&self, owner: &UserId) -> Result<UserBalance> {
        Ok(self
            .get_json(CF_BALANCES, owner.as_str().as_bytes())?
            .unwrap_or_default())
    }
}

#[async_trait]
impl LoyaltyStore for RocksDbStore {
    async fn order_owner(&self, number: &OrderNumber) -> Result<Option<UserId>> {
        let order: Option<Order> = self.get_json(CF_ORDERS, number.as_str().as_bytes())?;
        Ok(order.map(|o| o.owner))
    }

    async fn insert_order(&self, number: &OrderNumber, owner: &UserId) -> Result<OrderInsert> {
        let _guard = self.write_lock.lock().await;
        let key = number.as_str().as_bytes();
        if let Some(existing) = self.get_json::<Order>(CF_ORDERS, key)? {
            return Ok(OrderInsert::Exists(existing.owner));
        }

        let mut batch = WriteBatch::default();
        self.put_json(
            &mut batch,
            CF_ORDERS,
            key,
            &Order::new(number.clone(), owner.clone()),
        )?;
        self.db.write(batch)?;
        Ok(OrderInsert::Inserted)
    }

    async fn update_order_status_and_balance(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        owner: &UserId,
        accrual: Money,
    ) -> Result<StatusUpdate> {
        let _guard = self.write_lock.lock().await;
        let key = number.as_str().as_bytes();
        let Some(mut order) = self
            .get_json::<Order>(CF_ORDERS, key)?
            .filter(|o| &o.owner == owner)
        else {
            return Ok(StatusUpdate::NotFound);
        };
        if !order.status.can_transition_to(status) {
            return Ok(StatusUpdate::Unchanged);
        }

        let mut batch = WriteBatch::default();
        if status == OrderStatus::Processed {
            let mut balance = self.load_balance(owner)?;
            balance.credit(accrual)?;
            self.put_json(&mut batch, CF_BALANCES, owner.as_str().as_bytes(), &balance)?;
            order.accrual = Some(accrual);
        }
        order.status = status;
        self.put_json(&mut batch, CF_ORDERS, key, &order)?;
        self.db.write(batch)?;
        Ok(StatusUpdate::Applied)
    }

    async fn orders_by_owner(&self, owner: &UserId) -> Result<Vec<Order>> {
        let mut orders = self.scan(CF_ORDERS, |o: &Order| &o.owner == owner)?;
        orders.sort_by_key(|o| o.submitted_at);
        Ok(orders)
    }

    async fn balance(&self, owner: &UserId) -> Result<UserBalance> {
        self.load_balance(owner)
    }

    async fn insert_withdrawal(
        &self,
        number: &OrderNumber,
        owner: &UserId,
        sum: Money,
    ) -> Result<WithdrawalInsert> {
        let _guard = self.write_lock.lock().await;
        let key = number.as_str().as_bytes();
        if self.get_json::<Withdrawal>(CF_WITHDRAWALS, key)?.is_some() {
            return Ok(WithdrawalInsert::Duplicate);
        }

        let mut balance = self.load_balance(owner)?;
        if balance.debit(sum).is_err() {
            return Ok(WithdrawalInsert::InsufficientFunds);
        }

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_BALANCES, owner.as_str().as_bytes(), &balance)?;
        self.put_json(
            &mut batch,
            CF_WITHDRAWALS,
            key,
            &Withdrawal::new(number.clone(), owner.clone(), sum),
        )?;
        self.db.write(batch)?;
        Ok(WithdrawalInsert::Recorded)
    }

    async fn withdrawals_by_owner(&self, owner: &UserId) -> Result<Vec<Withdrawal>> {
        let mut withdrawals = self.scan(CF_WITHDRAWALS, |w: &Withdrawal| &w.owner == owner)?;
        withdrawals.sort_by_key(|w| w.processed_at);
        Ok(withdrawals)
    }
}
