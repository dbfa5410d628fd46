#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use payouts::application::orchestrator::{PayoutOrchestrator, Stores};
use payouts::config::PayoutConfig;
use payouts::domain::balance::{Balance, BalanceHolder, BalanceId, BalanceState, ClaimOutcome};
use payouts::domain::money::Money;
use payouts::domain::payment::{NewPayment, Payment, PaymentId};
use payouts::domain::ports::{
    BalanceStore, BalanceStoreRef, PaymentJobQueueRef, PaymentStore, PaymentStoreRef, UserStore,
};
use payouts::domain::user::{BankAccount, User, UserId};
use payouts::error::{PayoutError, Result as PayoutResult};
use payouts::infrastructure::clock::FixedClock;
use payouts::infrastructure::in_memory::{
    InMemoryBalanceStore, InMemoryPaymentStore, InMemoryUserStore,
};
use payouts::infrastructure::processors::default_registry;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
}

/// The day every fixture considers "today".
pub fn today() -> NaiveDate {
    date(16)
}

/// A PayPal payee due for payout on `today()`.
pub fn paypal_user(id: u64) -> User {
    let mut user = User::new(UserId(id));
    user.paypal_email = Some(format!("seller{id}@example.com"));
    user.next_payout_date = Some(today());
    user
}

/// A Stripe payee with a bank account due for payout on `today()`.
pub fn bank_user(id: u64, kind: &str, supports_instant: bool) -> User {
    let mut user = User::new(UserId(id));
    user.bank_account = Some(BankAccount {
        kind: kind.to_string(),
        supports_instant,
    });
    user.next_payout_date = Some(today());
    user
}

/// In-memory stores wired to an orchestrator pinned to `today()`.
pub struct Fixture {
    pub stores: Stores,
    pub config: PayoutConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(PayoutConfig::default())
    }

    pub fn with_config(config: PayoutConfig) -> Self {
        Self {
            stores: Stores {
                users: Arc::new(InMemoryUserStore::new()),
                balances: Arc::new(InMemoryBalanceStore::new()),
                payments: Arc::new(InMemoryPaymentStore::new()),
            },
            config,
        }
    }

    /// Fixture over the given balance and payment stores.
    pub fn with_stores(balances: BalanceStoreRef, payments: PaymentStoreRef) -> Self {
        Self {
            stores: Stores {
                users: Arc::new(InMemoryUserStore::new()),
                balances,
                payments,
            },
            config: PayoutConfig::default(),
        }
    }

    pub fn orchestrator(&self) -> PayoutOrchestrator {
        PayoutOrchestrator::new(
            self.stores.clone(),
            default_registry(&self.config),
            Arc::new(FixedClock(today())),
            self.config.clone(),
        )
    }

    pub fn orchestrator_with_queue(&self, queue: PaymentJobQueueRef) -> PayoutOrchestrator {
        self.orchestrator().with_queue(queue)
    }

    pub async fn add_user(&self, user: User) {
        self.stores.users.store(user).await.unwrap();
    }

    pub async fn add_balance(&self, id: u64, user: u64, day: u32, amount: Decimal) {
        self.add_held_balance(id, user, day, amount, BalanceHolder::Platform)
            .await;
    }

    pub async fn add_held_balance(
        &self,
        id: u64,
        user: u64,
        day: u32,
        amount: Decimal,
        holder: BalanceHolder,
    ) {
        let mut balance = Balance::new(BalanceId(id), UserId(user), date(day), Money::new(amount));
        balance.holder = holder;
        self.stores.balances.store(balance).await.unwrap();
    }

    pub async fn balance_state(&self, id: u64) -> BalanceState {
        self.stores
            .balances
            .get(BalanceId(id))
            .await
            .unwrap()
            .unwrap()
            .state
    }

    pub async fn user(&self, id: u64) -> User {
        self.stores.users.get(UserId(id)).await.unwrap().unwrap()
    }
}

fn storage_error(message: &str) -> PayoutError {
    PayoutError::InternalError(Box::new(std::io::Error::other(message.to_string())))
}

/// Consumes one pending failure, if any are left.
fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory payment store whose `create` and `update` fail a set number
/// of times before behaving normally.
#[derive(Default)]
pub struct FlakyPaymentStore {
    inner: InMemoryPaymentStore,
    create_failures: AtomicUsize,
    update_failures: AtomicUsize,
}

impl FlakyPaymentStore {
    pub fn failing_creates(times: usize) -> Self {
        let store = Self::default();
        store.create_failures.store(times, Ordering::SeqCst);
        store
    }

    pub fn failing_updates(times: usize) -> Self {
        let store = Self::default();
        store.update_failures.store(times, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl PaymentStore for FlakyPaymentStore {
    async fn create(&self, payment: NewPayment) -> PayoutResult<Payment> {
        if take_failure(&self.create_failures) {
            return Err(storage_error("disk full"));
        }
        self.inner.create(payment).await
    }

    async fn update(&self, payment: Payment) -> PayoutResult<()> {
        if take_failure(&self.update_failures) {
            return Err(storage_error("disk full"));
        }
        self.inner.update(payment).await
    }

    async fn get(&self, payment_id: PaymentId) -> PayoutResult<Option<Payment>> {
        self.inner.get(payment_id).await
    }

    async fn get_all(&self) -> PayoutResult<Vec<Payment>> {
        self.inner.get_all().await
    }

    async fn for_user(&self, user_id: UserId) -> PayoutResult<Vec<Payment>> {
        self.inner.for_user(user_id).await
    }
}

/// In-memory balance store whose n-th `claim` (1-based) times out.
pub struct FlakyBalanceStore {
    inner: InMemoryBalanceStore,
    claims: AtomicUsize,
    failing_claim: usize,
}

impl FlakyBalanceStore {
    pub fn failing_claim(nth: usize) -> Self {
        Self {
            inner: InMemoryBalanceStore::new(),
            claims: AtomicUsize::new(0),
            failing_claim: nth,
        }
    }
}

#[async_trait]
impl BalanceStore for FlakyBalanceStore {
    async fn store(&self, balance: Balance) -> PayoutResult<()> {
        self.inner.store(balance).await
    }

    async fn get(&self, balance_id: BalanceId) -> PayoutResult<Option<Balance>> {
        self.inner.get(balance_id).await
    }

    async fn for_user(&self, user_id: UserId) -> PayoutResult<Vec<Balance>> {
        self.inner.for_user(user_id).await
    }

    async fn claim(&self, balance_id: BalanceId) -> PayoutResult<ClaimOutcome> {
        if self.claims.fetch_add(1, Ordering::SeqCst) + 1 == self.failing_claim {
            return Err(storage_error("lock timeout"));
        }
        self.inner.claim(balance_id).await
    }

    async fn release(&self, balance_id: BalanceId) -> PayoutResult<()> {
        self.inner.release(balance_id).await
    }

    async fn settle(&self, balance_id: BalanceId) -> PayoutResult<()> {
        self.inner.settle(balance_id).await
    }
}

pub const USERS_HEADER: [&str; 10] = [
    "id",
    "compliant",
    "paused_by",
    "minimum_payout",
    "frequency",
    "next_payout_date",
    "paypal_email",
    "bank_account",
    "instant",
    "stripe_account",
];

pub const BALANCES_HEADER: [&str; 6] = ["id", "user", "date", "amount", "holder", "state"];

pub fn write_csv(path: &Path, header: &[&str], rows: &[&[&str]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);

    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(*row)?;
    }

    wtr.flush()?;
    Ok(())
}
