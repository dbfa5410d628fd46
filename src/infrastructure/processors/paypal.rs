use crate::config::PaypalConfig;
use crate::domain::balance::{Balance, BalanceHolder};
use crate::domain::payment::{Payment, PayoutDestination, PayoutType, ProcessorType};
use crate::domain::ports::{PaymentJob, PaymentJobQueue};
use crate::domain::processor::{Payability, PayabilityContext, PayoutProcessor};
use crate::domain::user::{User, UserId, note_date};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Mass payouts to PayPal addresses.
///
/// Only pays out funds the platform holds itself, and only to users who
/// have no bank account on file.
pub struct PaypalPayoutProcessor {
    config: PaypalConfig,
}

impl PaypalPayoutProcessor {
    pub fn new(config: PaypalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PayoutProcessor for PaypalPayoutProcessor {
    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Paypal
    }

    fn is_user_payable(&self, user: &User, ctx: &PayabilityContext) -> Payability {
        if ctx.payout_type == PayoutType::Instant {
            return Payability::NotPayable(None);
        }
        if user.bank_account.is_some() {
            return Payability::NotPayable(None);
        }
        if user.paypal_email.as_deref().is_none_or(str::is_empty) {
            return Payability::NotPayable(Some(format!(
                "Payout via PayPal on {} was skipped because the account does not have a valid PayPal payment address.",
                note_date(ctx.today)
            )));
        }
        if !ctx.amount.is_positive() {
            return Payability::NotPayable(None);
        }
        Payability::Payable
    }

    fn is_balance_payable(&self, balance: &Balance) -> bool {
        balance.holder == BalanceHolder::Platform
    }

    fn destination_for(&self, user: &User) -> Option<PayoutDestination> {
        user.paypal_email
            .as_ref()
            .filter(|email| !email.is_empty())
            .map(|email| PayoutDestination::PaypalEmail(email.clone()))
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

        let fee = payment
            .gross_amount
            .percent(self.config.fee_percent)
            .min(self.config.max_fee);
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
        if user_ids.is_empty() {
            return Ok(());
        }
        // PayPal mass payouts are sent as one batch
        queue
            .push(PaymentJob {
                processor: ProcessorType::Paypal,
                date,
                payout_type,
                user_ids,
            })
            .await
    }
}
