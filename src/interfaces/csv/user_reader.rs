use crate::domain::money::Money;
use crate::domain::user::{BankAccount, PauseSource, PayoutFrequency, User, UserId};
use crate::error::{PayoutError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

/// One row of the payee CSV.
#[derive(Debug, Deserialize)]
struct UserRecord {
    id: u64,
    compliant: bool,
    #[serde(default)]
    paused_by: Option<PauseSource>,
    #[serde(default)]
    minimum_payout: Option<Money>,
    #[serde(default)]
    frequency: Option<PayoutFrequency>,
    #[serde(default)]
    next_payout_date: Option<NaiveDate>,
    #[serde(default)]
    paypal_email: Option<String>,
    #[serde(default)]
    bank_account: Option<String>,
    #[serde(default)]
    instant: Option<bool>,
    #[serde(default)]
    stripe_account: Option<String>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        let mut user = User::new(UserId(record.id));
        user.compliant = record.compliant;
        user.payouts_paused_by = record.paused_by;
        user.minimum_payout_amount = record.minimum_payout;
        user.payout_frequency = record.frequency.unwrap_or_default();
        user.next_payout_date = record.next_payout_date;
        user.paypal_email = record.paypal_email.filter(|e| !e.is_empty());
        user.bank_account = record
            .bank_account
            .filter(|kind| !kind.is_empty())
            .map(|kind| BankAccount {
                kind,
                supports_instant: record.instant.unwrap_or(false),
            });
        user.stripe_connect_account = record.stripe_account.filter(|a| !a.is_empty());
        user
    }
}

/// Reads payees from a CSV source.
///
/// Columns: `id,compliant,paused_by,minimum_payout,frequency,next_payout_date,paypal_email,bank_account,instant,stripe_account`.
/// Everything after `compliant` may be left empty.
pub struct UserReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> UserReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn users(self) -> impl Iterator<Item = Result<User>> {
        self.reader
            .into_deserialize::<UserRecord>()
            .map(|result| result.map(User::from).map_err(PayoutError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "id,compliant,paused_by,minimum_payout,frequency,next_payout_date,paypal_email,bank_account,instant,stripe_account";

    #[test]
    fn test_reader_full_row() {
        let data = format!(
            "{HEADER}\n1, true, stripe, 25.00, daily, 2026-10-16, , AchAccount, true, acct_1"
        );
        let users: Vec<Result<User>> = UserReader::new(data.as_bytes()).users().collect();

        let user = users[0].as_ref().unwrap();
        assert_eq!(user.id, UserId(1));
        assert_eq!(user.payouts_paused_by, Some(PauseSource::Stripe));
        assert_eq!(user.minimum_payout_amount, Some(Money::new(dec!(25.00))));
        assert_eq!(user.payout_frequency, PayoutFrequency::Daily);
        assert_eq!(user.paypal_email, None);
        assert!(user.instant_payouts_supported());
        assert_eq!(user.stripe_connect_account.as_deref(), Some("acct_1"));
    }

    #[test]
    fn test_reader_sparse_row_uses_defaults() {
        let data = format!("{HEADER}\n2, false,,,,,seller@example.com,,,");
        let users: Vec<Result<User>> = UserReader::new(data.as_bytes()).users().collect();

        let user = users[0].as_ref().unwrap();
        assert!(!user.compliant);
        assert_eq!(user.payout_frequency, PayoutFrequency::Weekly);
        assert_eq!(user.next_payout_date, None);
        assert_eq!(user.paypal_email.as_deref(), Some("seller@example.com"));
        assert!(user.bank_account.is_none());
    }

    #[test]
    fn test_reader_malformed_row() {
        let data = format!("{HEADER}\nabc, true,,,,,,,,");
        let users: Vec<Result<User>> = UserReader::new(data.as_bytes()).users().collect();
        assert!(users[0].is_err());
    }
}
