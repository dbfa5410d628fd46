use super::eligibility::{EligibilityCheck, EligibilityEvaluator};
use crate::config::PayoutConfig;
use crate::domain::balance::{Balance, BalanceState, ClaimOutcome};
use crate::domain::money::Money;
use crate::domain::payment::{
    NewPayment, Payment, PaymentId, PaymentState, PayoutType, ProcessorType,
};
use crate::domain::ports::{
    BalanceStoreRef, ClockRef, PaymentJob, PaymentJobQueueRef, PaymentStoreRef, UserStoreRef,
};
use crate::domain::processor::{PayoutProcessor, ProcessorRegistry};
use crate::domain::user::{PayoutFrequency, User, UserId};
use crate::error::{PayoutError, Result};
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Storage backends the orchestrator works against.
#[derive(Clone)]
pub struct Stores {
    pub users: UserStoreRef,
    pub balances: BalanceStoreRef,
    pub payments: PaymentStoreRef,
}

/// Which users a scheduled batch starts from. All variants only consider
/// users holding a positive unpaid balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateFilter {
    HoldingBalance,
    StripeConnect,
    BankAccountKind(String),
    DailyFrequency,
}

impl CandidateFilter {
    fn matches(&self, user: &User) -> bool {
        match self {
            CandidateFilter::HoldingBalance => true,
            CandidateFilter::StripeConnect => user.stripe_connect_account.is_some(),
            CandidateFilter::BankAccountKind(kind) => user
                .bank_account
                .as_ref()
                .is_some_and(|account| &account.kind == kind),
            CandidateFilter::DailyFrequency => user.payout_frequency == PayoutFrequency::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOptions {
    /// Hand users to the job queue instead of creating payments inline.
    pub perform_async: bool,
    pub from_admin: bool,
    pub add_comment: bool,
    pub payout_type: PayoutType,
}

/// A payment created by a run, with the processor's preparation errors.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPayment {
    pub payment: Payment,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Enqueued(Vec<UserId>),
    Created(Vec<CreatedPayment>),
}

impl BatchOutcome {
    pub fn user_ids(&self) -> Vec<UserId> {
        match self {
            BatchOutcome::Enqueued(ids) => ids.clone(),
            BatchOutcome::Created(created) => {
                created.iter().map(|c| c.payment.user_id).collect()
            }
        }
    }
}

/// Selects payable users, claims their balances and creates payments.
///
/// Balance claims go through [`BalanceStore::claim`](crate::domain::ports::BalanceStore::claim),
/// so two runs racing for the same user never aggregate the same balance
/// twice. Failures are propagated; retrying is the caller's decision.
pub struct PayoutOrchestrator {
    stores: Stores,
    processors: ProcessorRegistry,
    clock: ClockRef,
    config: Arc<PayoutConfig>,
    evaluator: EligibilityEvaluator,
    queue: Option<PaymentJobQueueRef>,
}

impl PayoutOrchestrator {
    pub fn new(
        stores: Stores,
        processors: ProcessorRegistry,
        clock: ClockRef,
        config: PayoutConfig,
    ) -> Self {
        let config = Arc::new(config);
        let evaluator = EligibilityEvaluator::new(
            stores.users.clone(),
            stores.balances.clone(),
            stores.payments.clone(),
            processors.clone(),
            clock.clone(),
            config.clone(),
        );
        Self {
            stores,
            processors,
            clock,
            config,
            evaluator,
            queue: None,
        }
    }

    /// Attaches the queue used by asynchronous batches.
    pub fn with_queue(mut self, queue: PaymentJobQueueRef) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn evaluator(&self) -> &EligibilityEvaluator {
        &self.evaluator
    }

    pub fn config(&self) -> &PayoutConfig {
        &self.config
    }

    /// Scheduled batch for one rail. Stripe only pays connected accounts here.
    pub async fn create_payments_for_balances_up_to_date(
        &self,
        date: NaiveDate,
        processor: ProcessorType,
    ) -> Result<BatchOutcome> {
        let filter = match processor {
            ProcessorType::Stripe => CandidateFilter::StripeConnect,
            ProcessorType::Paypal => CandidateFilter::HoldingBalance,
        };
        let users = self.holding_balance_users(&filter).await?;
        let options = BatchOptions {
            perform_async: true,
            ..BatchOptions::default()
        };
        self.create_payments_for_users(date, processor, users, options)
            .await
    }

    /// Scheduled batch per bank account kind, one run per kind.
    pub async fn create_payments_for_bank_account_types(
        &self,
        date: NaiveDate,
        processor: ProcessorType,
        kinds: &[String],
    ) -> Result<Vec<BatchOutcome>> {
        let mut outcomes = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let filter = CandidateFilter::BankAccountKind(kind.clone());
            let users = self.holding_balance_users(&filter).await?;
            let options = BatchOptions {
                perform_async: true,
                ..BatchOptions::default()
            };
            outcomes.push(
                self.create_payments_for_users(date, processor, users, options)
                    .await?,
            );
        }
        Ok(outcomes)
    }

    /// Scheduled instant batch for users on a daily payout frequency.
    pub async fn create_instant_payouts_for_balances_up_to_date(
        &self,
        date: NaiveDate,
    ) -> Result<BatchOutcome> {
        let users = self
            .holding_balance_users(&CandidateFilter::DailyFrequency)
            .await?;
        let options = BatchOptions {
            perform_async: true,
            add_comment: true,
            payout_type: PayoutType::Instant,
            ..BatchOptions::default()
        };
        self.create_instant_payouts_for_users(date, users, options)
            .await
    }

    pub async fn create_payments_for_users(
        &self,
        date: NaiveDate,
        processor: ProcessorType,
        users: Vec<User>,
        options: BatchOptions,
    ) -> Result<BatchOutcome> {
        self.validate_date(date)?;

        let mut check = EligibilityCheck::for_processor(processor).with_comments();
        check.from_admin = options.from_admin;
        check.payout_type = options.payout_type;

        let mut user_ids_to_pay = Vec::new();
        for user in users {
            if self.evaluator.is_user_payable(&user, date, &check).await?
                && (options.from_admin || self.is_scheduled(&user, date))
            {
                info!(user_id = %user.id, %processor, "payable user");
                user_ids_to_pay.push(user.id);
            } else {
                info!(user_id = %user.id, %processor, "not payable user");
            }
        }

        self.dispatch(date, processor, options, user_ids_to_pay)
            .await
    }

    pub async fn create_instant_payouts_for_users(
        &self,
        date: NaiveDate,
        users: Vec<User>,
        options: BatchOptions,
    ) -> Result<BatchOutcome> {
        self.validate_date(date)?;

        let mut check = EligibilityCheck::for_processor(ProcessorType::Stripe).instant();
        check.add_comment = options.add_comment;
        check.from_admin = options.from_admin;

        let mut user_ids_to_pay = Vec::new();
        for user in users {
            if self.evaluator.is_user_payable(&user, date, &check).await? {
                info!(user_id = %user.id, "instant payable user");
                user_ids_to_pay.push(user.id);
            } else {
                info!(user_id = %user.id, "instant not payable user");
            }
        }

        let options = BatchOptions {
            payout_type: PayoutType::Instant,
            ..options
        };
        self.dispatch(date, ProcessorType::Stripe, options, user_ids_to_pay)
            .await
    }

    /// Claims a user's payable balances and turns them into one payment.
    ///
    /// Returns `None` when nothing positive could be claimed. On `None` or
    /// on any error, balances claimed along the way are released again.
    pub async fn create_payment(
        &self,
        date: NaiveDate,
        processor_type: ProcessorType,
        user_id: UserId,
        payout_type: PayoutType,
    ) -> Result<Option<CreatedPayment>> {
        let processor = self.processors.get(processor_type)?;
        let user = self
            .stores
            .users
            .get(user_id)
            .await?
            .ok_or(PayoutError::UserNotFound(user_id))?;

        let balances = self
            .mark_balances_processing(date, processor.as_ref(), &user)
            .await?;
        let gross: Money = balances.iter().map(|b| b.amount).sum();

        if !gross.is_positive() {
            info!(%user_id, amount = %gross, "non-positive balance, nothing to pay");
            self.release_all(&balances).await?;
            return Ok(None);
        }

        let new_payment = NewPayment {
            user_id,
            balance_ids: balances.iter().map(|b| b.id).collect(),
            processor: processor_type,
            payout_type,
            payout_period_end_date: date,
            gross_amount: gross,
            destination: processor.destination_for(&user),
        };
        let mut payment = match self.stores.payments.create(new_payment).await {
            Ok(payment) => payment,
            Err(e) => return Err(self.abandon(&balances, None, e).await),
        };

        let errors = processor.prepare_payment_and_set_amount(&mut payment, &balances);
        for error in &errors {
            warn!(payment_id = %payment.id, %user_id, %error, "payment preparation error");
        }
        payment.errors.extend(errors.iter().cloned());
        if let Err(e) = self.start_processing(&mut payment).await {
            return Err(self.abandon(&balances, Some(payment), e).await);
        }

        info!(
            payment_id = %payment.id,
            %user_id,
            processor = %processor_type,
            gross = %payment.gross_amount,
            fee = %payment.processor_fee,
            balances = payment.balance_ids.len(),
            "payment processing"
        );
        Ok(Some(CreatedPayment { payment, errors }))
    }

    /// Runs one queued unit of work. A failing user does not stop the others.
    pub async fn process_job(&self, job: &PaymentJob) -> Vec<Result<Option<CreatedPayment>>> {
        let mut results = Vec::with_capacity(job.user_ids.len());
        for &user_id in &job.user_ids {
            results.push(
                self.create_payment(job.date, job.processor, user_id, job.payout_type)
                    .await,
            );
        }
        results
    }

    /// Processor callback: the transfer went through.
    pub async fn complete_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut payment = self.payment(payment_id).await?;
        payment.mark_completed()?;
        for &balance_id in &payment.balance_ids {
            self.stores.balances.settle(balance_id).await?;
        }
        self.stores.payments.update(payment.clone()).await?;
        info!(%payment_id, user_id = %payment.user_id, "payment completed");
        Ok(payment)
    }

    /// Processor callback: the transfer failed; balances become payable again.
    pub async fn fail_payment(&self, payment_id: PaymentId, reason: &str) -> Result<Payment> {
        let mut payment = self.payment(payment_id).await?;
        // An abandoned payment already gave its balances back
        let holds_balances = payment.state == PaymentState::Processing;
        payment.mark_failed(reason)?;
        if holds_balances {
            for &balance_id in &payment.balance_ids {
                self.stores.balances.release(balance_id).await?;
            }
        }
        self.stores.payments.update(payment.clone()).await?;
        warn!(%payment_id, user_id = %payment.user_id, %reason, "payment failed");
        Ok(payment)
    }

    /// Users matching `filter` whose unpaid balances sum to more than zero.
    pub async fn holding_balance_users(&self, filter: &CandidateFilter) -> Result<Vec<User>> {
        let mut holding = Vec::new();
        for user in self.stores.users.get_all().await? {
            if !filter.matches(&user) {
                continue;
            }
            let unpaid: Money = self
                .stores
                .balances
                .for_user(user.id)
                .await?
                .iter()
                .filter(|b| b.state == BalanceState::Unpaid)
                .map(|b| b.amount)
                .sum();
            if unpaid.is_positive() {
                holding.push(user);
            }
        }
        Ok(holding)
    }

    fn validate_date(&self, date: NaiveDate) -> Result<()> {
        let today = self.clock.today();
        if date >= today {
            return Err(PayoutError::InvalidPayoutDate { date, today });
        }
        Ok(())
    }

    fn is_scheduled(&self, user: &User, date: NaiveDate) -> bool {
        let Some(next_payout_date) = user.next_payout_date else {
            return false;
        };
        date.checked_add_days(Days::new(self.config.payout_delay_days))
            .is_some_and(|due| due >= next_payout_date)
    }

    async fn dispatch(
        &self,
        date: NaiveDate,
        processor_type: ProcessorType,
        options: BatchOptions,
        user_ids: Vec<UserId>,
    ) -> Result<BatchOutcome> {
        if options.perform_async {
            let queue = self.queue.as_ref().ok_or_else(|| {
                PayoutError::ValidationError("no payment job queue configured".to_string())
            })?;
            let processor = self.processors.get(processor_type)?;
            processor
                .enqueue_payments(queue.as_ref(), user_ids.clone(), date, options.payout_type)
                .await?;
            info!(%processor_type, %date, users = user_ids.len(), "payout jobs enqueued");
            return Ok(BatchOutcome::Enqueued(user_ids));
        }

        let mut created = Vec::new();
        for user_id in user_ids {
            if let Some(payment) = self
                .create_payment(date, processor_type, user_id, options.payout_type)
                .await?
            {
                created.push(payment);
            }
        }
        Ok(BatchOutcome::Created(created))
    }

    async fn mark_balances_processing(
        &self,
        date: NaiveDate,
        processor: &dyn PayoutProcessor,
        user: &User,
    ) -> Result<Vec<Balance>> {
        let mut claimed = Vec::new();
        for balance in self.stores.balances.for_user(user.id).await? {
            if !balance.is_unpaid_up_to(date) || !processor.is_balance_payable(&balance) {
                continue;
            }
            match self.stores.balances.claim(balance.id).await {
                Ok(ClaimOutcome::Claimed(balance)) => claimed.push(balance),
                Ok(ClaimOutcome::AlreadyClaimed { state }) => {
                    debug!(balance_id = %balance.id, %state, "balance already claimed, skipping");
                }
                Err(e) => return Err(self.abandon(&claimed, None, e).await),
            }
        }
        Ok(claimed)
    }

    async fn release_all(&self, balances: &[Balance]) -> Result<()> {
        for balance in balances {
            self.stores.balances.release(balance.id).await?;
        }
        Ok(())
    }

    async fn start_processing(&self, payment: &mut Payment) -> Result<()> {
        payment.mark_processing()?;
        self.stores.payments.update(payment.clone()).await
    }

    /// Gives back everything a failed `create_payment` claimed and returns
    /// the error that caused it. Cleanup failures are logged, never raised
    /// over the original error.
    async fn abandon(
        &self,
        balances: &[Balance],
        payment: Option<Payment>,
        error: PayoutError,
    ) -> PayoutError {
        warn!(error = %error, balances = balances.len(), "payment creation failed, releasing balances");
        for balance in balances {
            if let Err(e) = self.stores.balances.release(balance.id).await {
                error!(balance_id = %balance.id, error = %e, "failed to release balance");
            }
        }

        if let Some(mut payment) = payment {
            let payment_id = payment.id;
            let closed = match payment.mark_failed(error.to_string()) {
                Ok(()) => self.stores.payments.update(payment).await,
                Err(e) => Err(e),
            };
            if let Err(e) = closed {
                error!(%payment_id, error = %e, "failed to mark abandoned payment as failed");
            }
        }
        error
    }

    async fn payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.stores
            .payments
            .get(payment_id)
            .await?
            .ok_or(PayoutError::PaymentNotFound(payment_id))
    }
}
