use super::balance::BalanceId;
use super::money::Money;
use super::user::{BankAccount, UserId};
use crate::error::{PayoutError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The payment rail a payout travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorType {
    Paypal,
    Stripe,
}

impl ProcessorType {
    pub const ALL: [ProcessorType; 2] = [ProcessorType::Paypal, ProcessorType::Stripe];
}

impl fmt::Display for ProcessorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorType::Paypal => f.write_str("paypal"),
            ProcessorType::Stripe => f.write_str("stripe"),
        }
    }
}

impl FromStr for ProcessorType {
    type Err = PayoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paypal" => Ok(ProcessorType::Paypal),
            "stripe" => Ok(ProcessorType::Stripe),
            other => Err(PayoutError::ValidationError(format!(
                "unknown payout processor '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutType {
    #[default]
    Standard,
    Instant,
}

impl fmt::Display for PayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutType::Standard => f.write_str("standard"),
            PayoutType::Instant => f.write_str("instant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    #[default]
    Creating,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PaymentState::Creating => "creating",
            PaymentState::Processing => "processing",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PayoutDestination {
    PaypalEmail(String),
    BankAccount(BankAccount),
    StripeConnect(String),
}

/// Everything needed to create a payment; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub balance_ids: Vec<BalanceId>,
    pub processor: ProcessorType,
    pub payout_type: PayoutType,
    pub payout_period_end_date: NaiveDate,
    pub gross_amount: Money,
    pub destination: Option<PayoutDestination>,
}

/// A single payout attempt aggregating one or more balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub balance_ids: Vec<BalanceId>,
    pub processor: ProcessorType,
    pub payout_type: PayoutType,
    pub payout_period_end_date: NaiveDate,
    /// Sum of the aggregated balances, before processor fees.
    pub gross_amount: Money,
    pub processor_fee: Money,
    /// Amount the payee actually receives.
    pub amount: Money,
    pub destination: Option<PayoutDestination>,
    pub state: PaymentState,
    #[serde(default)]
    pub errors: Vec<String>,
    pub failure_reason: Option<String>,
}

impl Payment {
    pub fn from_new(id: PaymentId, new: NewPayment) -> Self {
        Self {
            id,
            user_id: new.user_id,
            balance_ids: new.balance_ids,
            processor: new.processor,
            payout_type: new.payout_type,
            payout_period_end_date: new.payout_period_end_date,
            gross_amount: new.gross_amount,
            processor_fee: Money::ZERO,
            amount: new.gross_amount,
            destination: new.destination,
            state: PaymentState::Creating,
            errors: Vec::new(),
            failure_reason: None,
        }
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(PaymentState::Creating, PaymentState::Processing)
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(PaymentState::Processing, PaymentState::Completed)
    }

    /// Fails an in-flight payment. `Creating` is accepted so that a payment
    /// abandoned half way through creation can still be closed out.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition_from(
            &[PaymentState::Creating, PaymentState::Processing],
            PaymentState::Failed,
        )?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, from: PaymentState, to: PaymentState) -> Result<()> {
        self.transition_from(&[from], to)
    }

    fn transition_from(&mut self, from: &[PaymentState], to: PaymentState) -> Result<()> {
        if !from.contains(&self.state) {
            return Err(PayoutError::InvalidTransition {
                entity: "payment",
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}
