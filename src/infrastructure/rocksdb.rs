use crate::domain::balance::{Balance, BalanceId, BalanceState, ClaimOutcome};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{BalanceStore, PaymentStore, UserStore};
use crate::domain::user::{User, UserId};
use crate::error::{PayoutError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for payee records.
pub const CF_USERS: &str = "users";
/// Column Family for balance rows.
pub const CF_BALANCES: &str = "balances";
/// Column Family for payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const NEXT_PAYMENT_ID: &[u8] = b"next_payment_id";

/// A persistent store backed by a RocksDB `TransactionDB`.
///
/// Users, balances and payments live in separate Column Families and are
/// serialized as JSON. Every read-modify-write goes through a pessimistic
/// transaction that takes the row lock with `get_for_update_cf`, so two
/// workers can never both claim the same balance.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_USERS, CF_BALANCES, CF_PAYMENTS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            cfs,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PayoutError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_value<T: DeserializeOwned>(&self, cf_name: &str, key: u64) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_value<T: Serialize>(&self, cf_name: &str, key: u64, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key.to_be_bytes(), encode(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(decode(&value)?);
        }
        Ok(values)
    }

    /// Runs `change` against a locked copy of the row and commits it.
    ///
    /// Returns `Ok(None)` when the row does not exist.
    fn update_locked<T, R, F>(&self, cf_name: &str, key: u64, change: F) -> Result<Option<R>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let cf = self.cf(cf_name)?;
        let txn = self.db.transaction();
        let Some(bytes) = txn.get_for_update_cf(cf, key.to_be_bytes(), true)? else {
            return Ok(None);
        };
        let mut value: T = decode(&bytes)?;
        let outcome = change(&mut value)?;
        txn.put_cf(cf, key.to_be_bytes(), encode(&value)?)?;
        txn.commit()?;
        Ok(Some(outcome))
    }

    fn update_balance<F>(&self, balance_id: BalanceId, change: F) -> Result<()>
    where
        F: FnOnce(&mut Balance) -> Result<()>,
    {
        self.update_locked(CF_BALANCES, balance_id.0, change)?
            .ok_or(PayoutError::BalanceNotFound(balance_id))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        PayoutError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        PayoutError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn store(&self, user: User) -> Result<()> {
        self.put_value(CF_USERS, user.id.0, &user)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<User>> {
        self.get_value(CF_USERS, user_id.0)
    }

    async fn get_all(&self) -> Result<Vec<User>> {
        self.scan(CF_USERS)
    }

    async fn add_payout_note(&self, user_id: UserId, note: String) -> Result<()> {
        self.update_locked(CF_USERS, user_id.0, |user: &mut User| {
            user.add_payout_note(note);
            Ok(())
        })?
        .ok_or(PayoutError::UserNotFound(user_id))
    }
}

#[async_trait]
impl BalanceStore for RocksDBStore {
    async fn store(&self, balance: Balance) -> Result<()> {
        self.put_value(CF_BALANCES, balance.id.0, &balance)
    }

    async fn get(&self, balance_id: BalanceId) -> Result<Option<Balance>> {
        self.get_value(CF_BALANCES, balance_id.0)
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Balance>> {
        let mut balances: Vec<Balance> = self
            .scan::<Balance>(CF_BALANCES)?
            .into_iter()
            .filter(|b| b.user_id == user_id)
            .collect();
        balances.sort_by_key(|b| (b.date, b.id));
        Ok(balances)
    }

    async fn claim(&self, balance_id: BalanceId) -> Result<ClaimOutcome> {
        let cf = self.cf(CF_BALANCES)?;
        let key = balance_id.0.to_be_bytes();
        let txn = self.db.transaction();

        let bytes = txn
            .get_for_update_cf(cf, key, true)?
            .ok_or(PayoutError::BalanceNotFound(balance_id))?;
        let mut balance: Balance = decode(&bytes)?;
        if balance.state != BalanceState::Unpaid {
            // Dropping the transaction rolls it back and frees the lock.
            return Ok(ClaimOutcome::AlreadyClaimed {
                state: balance.state,
            });
        }

        balance.mark_processing()?;
        txn.put_cf(cf, key, encode(&balance)?)?;
        txn.commit()?;
        Ok(ClaimOutcome::Claimed(balance))
    }

    async fn release(&self, balance_id: BalanceId) -> Result<()> {
        self.update_balance(balance_id, Balance::mark_unpaid)
    }

    async fn settle(&self, balance_id: BalanceId) -> Result<()> {
        self.update_balance(balance_id, Balance::mark_paid)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let meta = self.cf(CF_META)?;
        let payments = self.cf(CF_PAYMENTS)?;
        let txn = self.db.transaction();

        let last_id = match txn.get_for_update_cf(meta, NEXT_PAYMENT_ID, true)? {
            Some(bytes) => decode::<u64>(&bytes)?,
            None => 0,
        };
        let payment = Payment::from_new(PaymentId(last_id + 1), payment);

        txn.put_cf(meta, NEXT_PAYMENT_ID, encode(&payment.id.0)?)?;
        txn.put_cf(payments, payment.id.0.to_be_bytes(), encode(&payment)?)?;
        txn.commit()?;
        Ok(payment)
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let payment_id = payment.id;
        self.update_locked(CF_PAYMENTS, payment_id.0, move |stored: &mut Payment| {
            *stored = payment;
            Ok(())
        })?
        .ok_or(PayoutError::PaymentNotFound(payment_id))
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        self.get_value(CF_PAYMENTS, payment_id.0)
    }

    async fn get_all(&self) -> Result<Vec<Payment>> {
        self.scan(CF_PAYMENTS)
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        Ok(self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::payment::{PayoutType, ProcessorType};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn new_payment(user: u64) -> NewPayment {
        NewPayment {
            user_id: UserId(user),
            balance_ids: vec![BalanceId(1)],
            processor: ProcessorType::Stripe,
            payout_type: PayoutType::Standard,
            payout_period_end_date: date(9),
            gross_amount: Money::new(dec!(42)),
            destination: None,
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_USERS, CF_BALANCES, CF_PAYMENTS, CF_META] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_user_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut user = User::new(UserId(1));
        user.paypal_email = Some("seller@example.com".to_string());
        UserStore::store(&store, user.clone()).await.unwrap();

        store
            .add_payout_note(UserId(1), "note".to_string())
            .await
            .unwrap();
        let retrieved = UserStore::get(&store, UserId(1)).await.unwrap().unwrap();
        assert_eq!(retrieved.paypal_email, user.paypal_email);
        assert_eq!(retrieved.payout_notes, vec!["note".to_string()]);

        assert_eq!(UserStore::get_all(&store).await.unwrap().len(), 1);
        assert!(UserStore::get(&store, UserId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_balance_claim_cycle() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let balance = Balance::new(BalanceId(1), UserId(1), date(1), Money::new(dec!(10)));
        BalanceStore::store(&store, balance).await.unwrap();

        assert!(matches!(
            store.claim(BalanceId(1)).await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert_eq!(
            store.claim(BalanceId(1)).await.unwrap(),
            ClaimOutcome::AlreadyClaimed {
                state: BalanceState::Processing
            }
        );

        store.settle(BalanceId(1)).await.unwrap();
        let stored = BalanceStore::get(&store, BalanceId(1)).await.unwrap().unwrap();
        assert_eq!(stored.state, BalanceState::Paid);

        assert!(matches!(
            store.release(BalanceId(1)).await,
            Err(PayoutError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.claim(BalanceId(2)).await,
            Err(PayoutError::BalanceNotFound(BalanceId(2)))
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_payment_ids_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let first = store.create(new_payment(1)).await.unwrap();
            let second = store.create(new_payment(2)).await.unwrap();
            assert_eq!(first.id, PaymentId(1));
            assert_eq!(second.id, PaymentId(2));
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let third = store.create(new_payment(1)).await.unwrap();
        assert_eq!(third.id, PaymentId(3));
        assert_eq!(PaymentStore::for_user(&store, UserId(1)).await.unwrap().len(), 2);

        let mut updated = third.clone();
        updated.mark_processing().unwrap();
        store.update(updated).await.unwrap();
        let stored = PaymentStore::get(&store, PaymentId(3)).await.unwrap().unwrap();
        assert_eq!(stored.state, crate::domain::payment::PaymentState::Processing);
    }
}
