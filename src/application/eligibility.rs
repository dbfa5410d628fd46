use crate::config::PayoutConfig;
use crate::domain::balance::{Balance, BalanceHolder};
use crate::domain::money::Money;
use crate::domain::payment::{PaymentState, PayoutType, ProcessorType};
use crate::domain::ports::{BalanceStoreRef, ClockRef, PaymentStoreRef, UserStoreRef};
use crate::domain::processor::{Payability, PayabilityContext, PayoutProcessor, ProcessorRegistry};
use crate::domain::user::{PauseSource, User, UserId, note_date};
use crate::error::Result;
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;

/// How a payability check should be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EligibilityCheck {
    /// Restrict the check to one rail; any registered rail otherwise.
    pub processor: Option<ProcessorType>,
    pub payout_type: PayoutType,
    /// Record a note on the user for every rejection.
    pub add_comment: bool,
    /// Admin-triggered payouts skip compliance and may go below the minimum.
    pub from_admin: bool,
}

impl EligibilityCheck {
    pub fn for_processor(processor: ProcessorType) -> Self {
        Self {
            processor: Some(processor),
            ..Self::default()
        }
    }

    pub fn instant(mut self) -> Self {
        self.payout_type = PayoutType::Instant;
        self
    }

    pub fn with_comments(mut self) -> Self {
        self.add_comment = true;
        self
    }

    pub fn from_admin(mut self) -> Self {
        self.from_admin = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    NotCompliant,
    PayoutsPaused(PauseSource),
    BelowMinimum { balance: Money, minimum: Money },
    InstantUnsupported,
    ProcessorRejected,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::NotCompliant => f.write_str("account is not compliant"),
            Ineligibility::PayoutsPaused(source) => {
                write!(f, "payouts paused by the {source}")
            }
            Ineligibility::BelowMinimum { balance, minimum } => {
                write!(f, "balance {balance} is below the minimum of {minimum}")
            }
            Ineligibility::InstantUnsupported => {
                f.write_str("account is not eligible for instant payouts")
            }
            Ineligibility::ProcessorRejected => f.write_str("no payout processor accepted the account"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Payable {
        amount: Money,
        processor: ProcessorType,
    },
    Ineligible(Ineligibility),
}

impl Eligibility {
    pub fn is_payable(&self) -> bool {
        matches!(self, Eligibility::Payable { .. })
    }
}

/// Decides whether a user can be paid for balances up to a date.
///
/// Checks run in a fixed order: compliance, pause, minimum threshold,
/// instant capability, and finally the rail's own rules. The first failing
/// check wins.
#[derive(Clone)]
pub struct EligibilityEvaluator {
    users: UserStoreRef,
    balances: BalanceStoreRef,
    payments: PaymentStoreRef,
    processors: ProcessorRegistry,
    clock: ClockRef,
    config: Arc<PayoutConfig>,
}

impl EligibilityEvaluator {
    pub fn new(
        users: UserStoreRef,
        balances: BalanceStoreRef,
        payments: PaymentStoreRef,
        processors: ProcessorRegistry,
        clock: ClockRef,
        config: Arc<PayoutConfig>,
    ) -> Self {
        Self {
            users,
            balances,
            payments,
            processors,
            clock,
            config,
        }
    }

    pub async fn is_user_payable(
        &self,
        user: &User,
        date: NaiveDate,
        check: &EligibilityCheck,
    ) -> Result<bool> {
        Ok(self.evaluate(user, date, check).await?.is_payable())
    }

    pub async fn evaluate(
        &self,
        user: &User,
        date: NaiveDate,
        check: &EligibilityCheck,
    ) -> Result<Eligibility> {
        let today = self.clock.today();
        let skipped = |reason: String| {
            format!(
                "Payout on {} was skipped because {reason}",
                note_date(today)
            )
        };

        if !(user.compliant || check.from_admin) {
            self.note(user.id, check, skipped("the account was not compliant.".to_string()))
                .await?;
            return Ok(Eligibility::Ineligible(Ineligibility::NotCompliant));
        }

        if let Some(source) = user.payouts_paused_by {
            self.note(
                user.id,
                check,
                skipped(format!(
                    "payouts on the account were paused by the {source}."
                )),
            )
            .await?;
            return Ok(Eligibility::Ineligible(Ineligibility::PayoutsPaused(source)));
        }

        let balances = self.balances.for_user(user.id).await?;
        let unpaid: Vec<&Balance> = balances
            .iter()
            .filter(|b| b.is_unpaid_up_to(date))
            .collect();
        let amount_payable: Money = unpaid.iter().map(|b| b.amount).sum();
        let account_balance = amount_payable + self.paid_amount_for_date(user.id, date).await?;
        let minimum = user
            .minimum_payout_amount
            .unwrap_or(self.config.minimum_payout_amount);

        if account_balance < minimum {
            if account_balance.is_positive() {
                self.note(
                    user.id,
                    check,
                    skipped(format!(
                        "the account balance {account_balance} was less than the minimum payout amount of {minimum}."
                    )),
                )
                .await?;
            }
            let held_by_platform: Money = unpaid
                .iter()
                .filter(|b| b.holder == BalanceHolder::Platform)
                .map(|b| b.amount)
                .sum();
            let admin_override = check.from_admin
                && account_balance.is_positive()
                && held_by_platform == account_balance;
            if !admin_override {
                return Ok(Eligibility::Ineligible(Ineligibility::BelowMinimum {
                    balance: account_balance,
                    minimum,
                }));
            }
        }

        let instant = check.payout_type == PayoutType::Instant;
        if instant && !user.instant_payouts_supported() {
            self.note(
                user.id,
                check,
                skipped("the account is not eligible for instant payouts.".to_string()),
            )
            .await?;
            return Ok(Eligibility::Ineligible(Ineligibility::InstantUnsupported));
        }

        let candidates: Vec<Arc<dyn PayoutProcessor>> = match check.processor {
            Some(processor_type) => vec![self.processors.get(processor_type)?],
            None => self.processors.all().cloned().collect(),
        };

        for processor in candidates {
            let amount = if instant {
                unpaid
                    .iter()
                    .filter(|b| processor.is_balance_payable(b))
                    .map(|b| b.amount)
                    .sum()
            } else {
                amount_payable
            };
            let ctx = PayabilityContext {
                amount,
                payout_type: check.payout_type,
                today,
            };
            match processor.is_user_payable(user, &ctx) {
                Payability::Payable => {
                    return Ok(Eligibility::Payable {
                        amount,
                        processor: processor.processor_type(),
                    });
                }
                Payability::NotPayable(Some(note)) => self.note(user.id, check, note).await?,
                Payability::NotPayable(None) => {}
            }
        }

        Ok(Eligibility::Ineligible(Ineligibility::ProcessorRejected))
    }

    /// Pre-fee total of completed payments closing the period ending on `date`.
    async fn paid_amount_for_date(&self, user_id: UserId, date: NaiveDate) -> Result<Money> {
        let payments = self.payments.for_user(user_id).await?;
        Ok(payments
            .iter()
            .filter(|p| p.state == PaymentState::Completed && p.payout_period_end_date == date)
            .map(|p| p.gross_amount)
            .sum())
    }

    async fn note(&self, user_id: UserId, check: &EligibilityCheck, note: String) -> Result<()> {
        if check.add_comment {
            self.users.add_payout_note(user_id, note).await?;
        }
        Ok(())
    }
}
