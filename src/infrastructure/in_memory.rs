use crate::domain::balance::{Balance, BalanceId, BalanceState, ClaimOutcome};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{BalanceStore, PaymentStore, UserStore};
use crate::domain::user::{User, UserId};
use crate::error::{PayoutError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A thread-safe in-memory store for payees.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<BTreeMap<UserId, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn store(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        users.insert(user.id, user);
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.values().cloned().collect())
    }

    async fn add_payout_note(&self, user_id: UserId, note: String) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or(PayoutError::UserNotFound(user_id))?;
        user.add_payout_note(note);
        Ok(())
    }
}

/// A thread-safe in-memory balance table with one lock per row.
///
/// The outer `RwLock` only guards the shape of the table; every state change
/// happens while holding the row's own `Mutex`, which gives `claim` the same
/// exclusivity as `SELECT ... FOR UPDATE` on a relational store.
#[derive(Default, Clone)]
pub struct InMemoryBalanceStore {
    rows: Arc<RwLock<BTreeMap<BalanceId, Arc<Mutex<Balance>>>>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, balance_id: BalanceId) -> Result<Arc<Mutex<Balance>>> {
        let rows = self.rows.read().await;
        rows.get(&balance_id)
            .cloned()
            .ok_or(PayoutError::BalanceNotFound(balance_id))
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn store(&self, balance: Balance) -> Result<()> {
        let existing = {
            let mut rows = self.rows.write().await;
            match rows.get(&balance.id) {
                Some(row) => Some(row.clone()),
                None => {
                    rows.insert(balance.id, Arc::new(Mutex::new(balance.clone())));
                    None
                }
            }
        };
        if let Some(row) = existing {
            *row.lock().await = balance;
        }
        Ok(())
    }

    async fn get(&self, balance_id: BalanceId) -> Result<Option<Balance>> {
        let row = match self.row(balance_id).await {
            Ok(row) => row,
            Err(PayoutError::BalanceNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let balance = row.lock().await.clone();
        Ok(Some(balance))
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Balance>> {
        let rows: Vec<_> = self.rows.read().await.values().cloned().collect();

        let mut balances = Vec::new();
        for row in rows {
            let balance = row.lock().await;
            if balance.user_id == user_id {
                balances.push(balance.clone());
            }
        }
        balances.sort_by_key(|b| (b.date, b.id));
        Ok(balances)
    }

    async fn claim(&self, balance_id: BalanceId) -> Result<ClaimOutcome> {
        let row = self.row(balance_id).await?;
        let mut balance = row.lock().await;
        if balance.state != BalanceState::Unpaid {
            return Ok(ClaimOutcome::AlreadyClaimed {
                state: balance.state,
            });
        }
        balance.mark_processing()?;
        Ok(ClaimOutcome::Claimed(balance.clone()))
    }

    async fn release(&self, balance_id: BalanceId) -> Result<()> {
        let row = self.row(balance_id).await?;
        let mut balance = row.lock().await;
        balance.mark_unpaid()
    }

    async fn settle(&self, balance_id: BalanceId) -> Result<()> {
        let row = self.row(balance_id).await?;
        let mut balance = row.lock().await;
        balance.mark_paid()
    }
}

#[derive(Default)]
struct PaymentTable {
    last_id: u64,
    payments: BTreeMap<PaymentId, Payment>,
}

/// A thread-safe in-memory store for payments with sequential ids.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    table: Arc<RwLock<PaymentTable>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let payment = Payment::from_new(PaymentId(table.last_id), payment);
        table.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let mut table = self.table.write().await;
        match table.payments.get_mut(&payment.id) {
            Some(existing) => {
                *existing = payment;
                Ok(())
            }
            None => Err(PayoutError::PaymentNotFound(payment.id)),
        }
    }

    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table.payments.get(&payment_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Payment>> {
        let table = self.table.read().await;
        Ok(table.payments.values().cloned().collect())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
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

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_user_store_notes() {
        let store = InMemoryUserStore::new();
        store.store(User::new(UserId(1))).await.unwrap();

        store
            .add_payout_note(UserId(1), "skipped".to_string())
            .await
            .unwrap();
        let user = store.get(UserId(1)).await.unwrap().unwrap();
        assert_eq!(user.payout_notes, vec!["skipped".to_string()]);

        assert!(matches!(
            store.add_payout_note(UserId(2), "x".to_string()).await,
            Err(PayoutError::UserNotFound(UserId(2)))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_balance_claim_is_exclusive() {
        let store = InMemoryBalanceStore::new();
        let balance = Balance::new(BalanceId(1), UserId(1), date(1), Money::new(dec!(10)));
        store.store(balance).await.unwrap();

        let first = store.claim(BalanceId(1)).await.unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed(ref b) if b.state == BalanceState::Processing));

        let second = store.claim(BalanceId(1)).await.unwrap();
        assert_eq!(
            second,
            ClaimOutcome::AlreadyClaimed {
                state: BalanceState::Processing
            }
        );

        store.release(BalanceId(1)).await.unwrap();
        assert!(matches!(
            store.claim(BalanceId(1)).await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
    }

    #[tokio::test]
    async fn test_in_memory_balance_claim_missing_row() {
        let store = InMemoryBalanceStore::new();
        assert!(matches!(
            store.claim(BalanceId(9)).await,
            Err(PayoutError::BalanceNotFound(BalanceId(9)))
        ));
        assert!(store.get(BalanceId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_balances_for_user_are_ordered() {
        let store = InMemoryBalanceStore::new();
        store
            .store(Balance::new(BalanceId(3), UserId(1), date(5), Money::new(dec!(1))))
            .await
            .unwrap();
        store
            .store(Balance::new(BalanceId(2), UserId(1), date(2), Money::new(dec!(1))))
            .await
            .unwrap();
        store
            .store(Balance::new(BalanceId(1), UserId(2), date(1), Money::new(dec!(1))))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .for_user(UserId(1))
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![BalanceId(2), BalanceId(3)]);
    }

    #[tokio::test]
    async fn test_in_memory_payment_store_assigns_ids() {
        let store = InMemoryPaymentStore::new();
        let new = NewPayment {
            user_id: UserId(1),
            balance_ids: vec![BalanceId(1)],
            processor: ProcessorType::Paypal,
            payout_type: PayoutType::Standard,
            payout_period_end_date: date(1),
            gross_amount: Money::new(dec!(12)),
            destination: None,
        };

        let first = store.create(new.clone()).await.unwrap();
        let second = store.create(new).await.unwrap();
        assert_eq!(first.id, PaymentId(1));
        assert_eq!(second.id, PaymentId(2));
        assert_eq!(store.for_user(UserId(1)).await.unwrap().len(), 2);
        assert!(store.for_user(UserId(2)).await.unwrap().is_empty());
    }
}
