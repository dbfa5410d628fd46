use crate::domain::balance::BalanceId;
use crate::domain::payment::{PaymentId, ProcessorType};
use crate::domain::user::UserId;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] serde_yaml::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Cannot payout for today or future balances (requested {date}, today is {today})")]
    InvalidPayoutDate { date: NaiveDate, today: NaiveDate },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("User {0} not found")]
    UserNotFound(UserId),
    #[error("Balance {0} not found")]
    BalanceNotFound(BalanceId),
    #[error("Payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("No payout processor registered for {0}")]
    UnknownProcessor(ProcessorType),
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("Payment job queue is closed")]
    QueueClosed,
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, PayoutError>;
