use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use payouts::application::eligibility::{Eligibility, EligibilityCheck};
use payouts::application::orchestrator::{
    BatchOptions, CandidateFilter, PayoutOrchestrator, Stores,
};
use payouts::application::worker::PayoutWorker;
use payouts::config::PayoutConfig;
use payouts::domain::payment::{Payment, PaymentId, PayoutType, ProcessorType};
use payouts::domain::ports::{BalanceStore, ClockRef, PaymentStore, UserStore};
use payouts::domain::user::UserId;
use payouts::infrastructure::clock::{FixedClock, SystemClock};
use payouts::infrastructure::in_memory::{
    InMemoryBalanceStore, InMemoryPaymentStore, InMemoryUserStore,
};
use payouts::infrastructure::processors::default_registry;
use payouts::infrastructure::queue::ChannelJobQueue;
use payouts::interfaces::csv::balance_reader::BalanceReader;
use payouts::interfaces::csv::payment_writer::PaymentWriter;
use payouts::interfaces::csv::user_reader::UserReader;
use payouts::telemetry::init_logging;
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payees CSV to seed the store with
    #[arg(long, global = true)]
    users: Option<PathBuf>,

    /// Balances CSV to seed the store with
    #[arg(long, global = true)]
    balances: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// YAML file overriding the default payout configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pin "today" instead of reading the system clock
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scheduled payout batch for balances up to a date
    Run {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        processor: ProcessorType,
        /// Only pay users with this bank account kind; repeatable
        #[arg(long = "bank-account-type")]
        bank_account_types: Vec<String>,
        /// Create payments inline instead of going through the job queue
        #[arg(long)]
        sync: bool,
    },
    /// Instant payout batch for daily-frequency users
    Instant {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        sync: bool,
    },
    /// Create one user's payment right away
    PayUser {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        processor: ProcessorType,
        #[arg(long)]
        instant: bool,
    },
    /// Explain whether a user is payable
    Check {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        processor: Option<ProcessorType>,
        #[arg(long)]
        instant: bool,
        #[arg(long)]
        admin: bool,
    },
    /// Record the processor's verdict on a payment
    Settle {
        #[arg(long)]
        payment: u64,
        /// Mark the payment failed with this reason instead of completed
        #[arg(long)]
        failed: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = PayoutConfig::load(cli.config.as_deref()).into_diagnostic()?;
    let stores = open_stores(cli.db_path.as_deref())?;
    seed(&stores, cli.users.as_deref(), cli.balances.as_deref()).await?;

    let clock: ClockRef = match cli.today {
        Some(today) => Arc::new(FixedClock(today)),
        None => Arc::new(SystemClock),
    };

    let (queue, jobs) = ChannelJobQueue::channel(config.worker.queue_capacity);
    let max_concurrent_jobs = config.worker.max_concurrent_jobs;
    let orchestrator = Arc::new(
        PayoutOrchestrator::new(stores.clone(), default_registry(&config), clock, config)
            .with_queue(Arc::new(queue)),
    );
    let worker = PayoutWorker::new(orchestrator.clone(), jobs, max_concurrent_jobs).spawn();

    let existing: BTreeSet<PaymentId> = stores
        .payments
        .get_all()
        .await
        .into_diagnostic()?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let outcome = execute(&orchestrator, cli.command).await;

    // Drain queued jobs even when the command failed part way.
    let report = worker.shutdown().await.into_diagnostic()?;
    if report.jobs_received > 0 {
        info!(
            jobs = report.jobs_received,
            payments = report.payments_created,
            skipped = report.users_skipped,
            failures = report.failures,
            "payout jobs processed"
        );
    }

    match outcome? {
        Output::Payments(Some(payments)) => write_payments(payments),
        Output::Payments(None) => {
            let created: Vec<Payment> = stores
                .payments
                .get_all()
                .await
                .into_diagnostic()?
                .into_iter()
                .filter(|p| !existing.contains(&p.id))
                .collect();
            write_payments(created)
        }
        Output::Text(lines) => {
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// What a command leaves on stdout.
enum Output {
    /// Specific payments, or `None` for every payment created by this run.
    Payments(Option<Vec<Payment>>),
    Text(Vec<String>),
}

async fn execute(orchestrator: &PayoutOrchestrator, command: Command) -> Result<Output> {
    match command {
        Command::Run {
            date,
            processor,
            bank_account_types,
            sync,
        } => {
            if sync {
                let filters = if bank_account_types.is_empty() {
                    vec![match processor {
                        ProcessorType::Stripe => CandidateFilter::StripeConnect,
                        ProcessorType::Paypal => CandidateFilter::HoldingBalance,
                    }]
                } else {
                    bank_account_types
                        .into_iter()
                        .map(CandidateFilter::BankAccountKind)
                        .collect()
                };
                for filter in filters {
                    let users = orchestrator
                        .holding_balance_users(&filter)
                        .await
                        .into_diagnostic()?;
                    orchestrator
                        .create_payments_for_users(date, processor, users, BatchOptions::default())
                        .await
                        .into_diagnostic()?;
                }
            } else if bank_account_types.is_empty() {
                orchestrator
                    .create_payments_for_balances_up_to_date(date, processor)
                    .await
                    .into_diagnostic()?;
            } else {
                orchestrator
                    .create_payments_for_bank_account_types(date, processor, &bank_account_types)
                    .await
                    .into_diagnostic()?;
            }
            Ok(Output::Payments(None))
        }
        Command::Instant { date, sync } => {
            if sync {
                let users = orchestrator
                    .holding_balance_users(&CandidateFilter::DailyFrequency)
                    .await
                    .into_diagnostic()?;
                let options = BatchOptions {
                    add_comment: true,
                    payout_type: PayoutType::Instant,
                    ..BatchOptions::default()
                };
                orchestrator
                    .create_instant_payouts_for_users(date, users, options)
                    .await
                    .into_diagnostic()?;
            } else {
                orchestrator
                    .create_instant_payouts_for_balances_up_to_date(date)
                    .await
                    .into_diagnostic()?;
            }
            Ok(Output::Payments(None))
        }
        Command::PayUser {
            user,
            date,
            processor,
            instant,
        } => {
            let payout_type = if instant {
                PayoutType::Instant
            } else {
                PayoutType::Standard
            };
            let created = orchestrator
                .create_payment(date, processor, UserId(user), payout_type)
                .await
                .into_diagnostic()?;
            if created.is_none() {
                warn!(user_id = user, "nothing to pay");
            }
            Ok(Output::Payments(Some(
                created.into_iter().map(|c| c.payment).collect(),
            )))
        }
        Command::Check {
            user,
            date,
            processor,
            instant,
            admin,
        } => {
            let user_id = UserId(user);
            let stored = orchestrator
                .stores()
                .users
                .get(user_id)
                .await
                .into_diagnostic()?
                .ok_or_else(|| miette::miette!("user {user_id} not found"))?;

            let mut check = EligibilityCheck {
                processor,
                ..EligibilityCheck::default()
            }
            .with_comments();
            if instant {
                check = check.instant();
            }
            if admin {
                check = check.from_admin();
            }

            let verdict = match orchestrator
                .evaluator()
                .evaluate(&stored, date, &check)
                .await
                .into_diagnostic()?
            {
                Eligibility::Payable { amount, processor } => {
                    format!("payable: {amount} via {processor}")
                }
                Eligibility::Ineligible(reason) => format!("not payable: {reason}"),
            };

            let notes = orchestrator
                .stores()
                .users
                .get(user_id)
                .await
                .into_diagnostic()?
                .map(|u| u.payout_notes)
                .unwrap_or_default();
            Ok(Output::Text(std::iter::once(verdict).chain(notes).collect()))
        }
        Command::Settle { payment, failed } => {
            let payment_id = PaymentId(payment);
            let payment = match failed {
                Some(reason) => orchestrator.fail_payment(payment_id, &reason).await,
                None => orchestrator.complete_payment(payment_id).await,
            }
            .into_diagnostic()?;
            Ok(Output::Payments(Some(vec![payment])))
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    use payouts::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = Arc::new(RocksDBStore::open(path).into_diagnostic()?);
            info!(path = %path.display(), "using rocksdb storage");
            Ok(Stores {
                users: store.clone(),
                balances: store.clone(),
                payments: store,
            })
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "rocksdb support not compiled in, falling back to in-memory storage"
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> Stores {
    Stores {
        users: Arc::new(InMemoryUserStore::new()),
        balances: Arc::new(InMemoryBalanceStore::new()),
        payments: Arc::new(InMemoryPaymentStore::new()),
    }
}

/// Loads CSV rows into the stores, leaving rows that already exist alone.
async fn seed(stores: &Stores, users: Option<&Path>, balances: Option<&Path>) -> Result<()> {
    if let Some(path) = users {
        let file = File::open(path).into_diagnostic()?;
        for user_result in UserReader::new(file).users() {
            match user_result {
                Ok(user) => {
                    if stores.users.get(user.id).await.into_diagnostic()?.is_none() {
                        stores.users.store(user).await.into_diagnostic()?;
                    }
                }
                Err(e) => error!(error = %e, "error reading user"),
            }
        }
    }

    if let Some(path) = balances {
        let file = File::open(path).into_diagnostic()?;
        for balance_result in BalanceReader::new(file).balances() {
            match balance_result {
                Ok(balance) => {
                    if stores
                        .balances
                        .get(balance.id)
                        .await
                        .into_diagnostic()?
                        .is_none()
                    {
                        stores.balances.store(balance).await.into_diagnostic()?;
                    }
                }
                Err(e) => error!(error = %e, "error reading balance"),
            }
        }
    }
    Ok(())
}

fn write_payments(payments: Vec<Payment>) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(payments).into_diagnostic()
}
