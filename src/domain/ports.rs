use super::balance::{Balance, BalanceId, ClaimOutcome};
use super::payment::{NewPayment, Payment, PaymentId, PayoutType, ProcessorType};
use super::user::{User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn store(&self, user: User) -> Result<()>;
    async fn get(&self, user_id: UserId) -> Result<Option<User>>;
    async fn get_all(&self) -> Result<Vec<User>>;
    async fn add_payout_note(&self, user_id: UserId, note: String) -> Result<()>;
}

/// Owns balance rows and the only code paths allowed to change their state.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn store(&self, balance: Balance) -> Result<()>;
    async fn get(&self, balance_id: BalanceId) -> Result<Option<Balance>>;
    /// All balances of a user ordered by date, then id.
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Balance>>;
    /// Locks the row and moves it from `Unpaid` to `Processing`.
    async fn claim(&self, balance_id: BalanceId) -> Result<ClaimOutcome>;
    /// Moves a claimed balance back to `Unpaid`.
    async fn release(&self, balance_id: BalanceId) -> Result<()>;
    /// Moves a claimed balance to `Paid`.
    async fn settle(&self, balance_id: BalanceId) -> Result<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment>;
    async fn update(&self, payment: Payment) -> Result<()>;
    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>>;
    async fn get_all(&self) -> Result<Vec<Payment>>;
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>>;
}

/// One asynchronous unit of payout work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentJob {
    pub processor: ProcessorType,
    pub date: NaiveDate,
    pub payout_type: PayoutType,
    pub user_ids: Vec<UserId>,
}

#[async_trait]
pub trait PaymentJobQueue: Send + Sync {
    async fn push(&self, job: PaymentJob) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub type UserStoreRef = Arc<dyn UserStore>;
pub type BalanceStoreRef = Arc<dyn BalanceStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type PaymentJobQueueRef = Arc<dyn PaymentJobQueue>;
pub type ClockRef = Arc<dyn Clock>;
