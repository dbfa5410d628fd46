use crate::config::StripeConfig;
use crate::domain::balance::Balance;
use crate::domain::money::Money;
use crate::domain::payment::{Payment, PayoutDestination, PayoutType, ProcessorType};
use crate::domain::ports::{PaymentJob, PaymentJobQueue};
use crate::domain::processor::{Payability, PayabilityContext, PayoutProcessor};
use crate::domain::user::{User, UserId, note_date};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Transfers to bank accounts and Stripe Connect accounts, including
/// instant payouts to debit-capable accounts.
pub struct StripePayoutProcessor {
    config: StripeConfig,
}

impl StripePayoutProcessor {
    pub fn new(config: StripeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PayoutProcessor for StripePayoutProcessor {
    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Stripe
    }

    fn is_user_payable(&self, user: &User, ctx: &PayabilityContext) -> Payability {
        let date = note_date(ctx.today);
        if self.destination_for(user).is_none() {
            return Payability::NotPayable(Some(format!(
                "Payout via Stripe on {date} was skipped because the account does not have a bank account or Stripe Connect account."
            )));
        }
        if !ctx.amount.is_positive() {
            return Payability::NotPayable(None);
        }
        if ctx.payout_type == PayoutType::Instant && ctx.amount < self.config.minimum_instant_amount
        {
            return Payability::NotPayable(Some(format!(
                "Instant payout on {date} was skipped because the balance {} was less than the minimum instant payout amount of {}.",
                ctx.amount, self.config.minimum_instant_amount
            )));
        }
        Payability::Payable
    }

    fn is_balance_payable(&self, _balance: &Balance) -> bool {
        // Both platform-held and connected-account funds move through Stripe
        true
    }

    fn destination_for(&self, user: &User) -> Option<PayoutDestination> {
        if let Some(account) = &user.stripe_connect_account {
            return Some(PayoutDestination::StripeConnect(account.clone()));
        }
        user.bank_account
            .as_ref()
            .map(|account| PayoutDestination::BankAccount(account.clone()))
    }

    fn prepare_payment_and_set_amount(
        &self,
        payment: &mut Payment,
        _balances: &[Balance],
    ) -> Vec<String> {
        let mut errors = Vec::new();
        if payment.destination.is_none() {
            errors.push("missing payout destination".to_string());
        }

        let fee = match payment.payout_type {
            PayoutType::Instant => payment.gross_amount.percent(self.config.instant_fee_percent),
            PayoutType::Standard => Money::ZERO,
        };
        payment.processor_fee = fee;
        payment.amount = payment.gross_amount - fee;

        if !payment.amount.is_positive() {
            errors.push("payout amount after fees must be positive".to_string());
        }
        errors
    }

    async fn enqueue_payments(
        &self,
        queue: &dyn PaymentJobQueue,
        user_ids: Vec<UserId>,
        date: NaiveDate,
        payout_type: PayoutType,
    ) -> Result<()> {
        for user_id in user_ids {
            queue
                .push(PaymentJob {
                    processor: ProcessorType::Stripe,
                    date,
                    payout_type,
                    user_ids: vec![user_id],
                })
                .await?;
        }
        Ok(())
    }
}
