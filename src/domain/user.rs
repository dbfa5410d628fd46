use super::money::Money;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who paused payouts on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseSource {
    Admin,
    Stripe,
    User,
    System,
}

impl fmt::Display for PauseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PauseSource::Admin => "admin",
            PauseSource::Stripe => "payout processor",
            PauseSource::User => "user",
            PauseSource::System => "system",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutFrequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
    Quarterly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    /// Account kind, e.g. `AchAccount` or `CanadianBankAccount`.
    pub kind: String,
    /// Debit-card style accounts can receive instant payouts.
    pub supports_instant: bool,
}

/// A payee holding balances on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub compliant: bool,
    pub payouts_paused_by: Option<PauseSource>,
    /// Per-user threshold; the configured default applies when unset.
    pub minimum_payout_amount: Option<Money>,
    pub payout_frequency: PayoutFrequency,
    pub next_payout_date: Option<NaiveDate>,
    pub paypal_email: Option<String>,
    pub bank_account: Option<BankAccount>,
    pub stripe_connect_account: Option<String>,
    #[serde(default)]
    pub payout_notes: Vec<String>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            compliant: true,
            payouts_paused_by: None,
            minimum_payout_amount: None,
            payout_frequency: PayoutFrequency::default(),
            next_payout_date: None,
            paypal_email: None,
            bank_account: None,
            stripe_connect_account: None,
            payout_notes: Vec::new(),
        }
    }

    pub fn payouts_paused(&self) -> bool {
        self.payouts_paused_by.is_some()
    }

    pub fn instant_payouts_supported(&self) -> bool {
        self.bank_account
            .as_ref()
            .is_some_and(|account| account.supports_instant)
    }

    pub fn add_payout_note(&mut self, note: impl Into<String>) {
        self.payout_notes.push(note.into());
    }
}

/// Renders a date the way payout notes display it, e.g. `October 9, 2026`.
pub fn note_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}
