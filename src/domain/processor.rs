//! The payout processor seam.
//!
//! Each payment rail (PayPal, Stripe) decides on its own which users and
//! balances it can pay, how fees are charged, and how work is queued. The
//! orchestration layer only ever talks to rails through [`PayoutProcessor`].

use super::balance::Balance;
use super::money::Money;
use super::payment::{Payment, PayoutDestination, PayoutType, ProcessorType};
use super::ports::PaymentJobQueue;
use super::user::{User, UserId};
use crate::error::{PayoutError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Inputs a rail needs to judge whether a user can be paid right now.
#[derive(Debug, Clone, Copy)]
pub struct PayabilityContext {
    pub amount: Money,
    pub payout_type: PayoutType,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payability {
    Payable,
    /// Rejected, with an optional note for the payee's account history.
    NotPayable(Option<String>),
}

impl Payability {
    pub fn is_payable(&self) -> bool {
        matches!(self, Payability::Payable)
    }
}

#[async_trait]
pub trait PayoutProcessor: Send + Sync {
    fn processor_type(&self) -> ProcessorType;

    fn is_user_payable(&self, user: &User, ctx: &PayabilityContext) -> Payability;

    fn is_balance_payable(&self, balance: &Balance) -> bool;

    fn destination_for(&self, user: &User) -> Option<PayoutDestination>;

    /// Sets the final amount and fee on a freshly created payment.
    ///
    /// Problems are returned as messages rather than raised: the payment
    /// still moves on to `Processing` so it can be reconciled later.
    fn prepare_payment_and_set_amount(&self, payment: &mut Payment, balances: &[Balance])
    -> Vec<String>;

    async fn enqueue_payments(
        &self,
        queue: &dyn PaymentJobQueue,
        user_ids: Vec<UserId>,
        date: NaiveDate,
        payout_type: PayoutType,
    ) -> Result<()>;
}

/// Maps each rail to its implementation.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<ProcessorType, Arc<dyn PayoutProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, processor: Arc<dyn PayoutProcessor>) -> Self {
        self.processors.insert(processor.processor_type(), processor);
        self
    }

    pub fn get(&self, processor_type: ProcessorType) -> Result<Arc<dyn PayoutProcessor>> {
        self.processors
            .get(&processor_type)
            .cloned()
            .ok_or(PayoutError::UnknownProcessor(processor_type))
    }

    /// Registered rails in a stable order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn PayoutProcessor>> {
        self.processors.values()
    }
}
