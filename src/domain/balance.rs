use super::money::Money;
use super::user::UserId;
use crate::error::{PayoutError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BalanceId(pub u64);

impl fmt::Display for BalanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceState {
    #[default]
    Unpaid,
    Processing,
    Paid,
}

impl fmt::Display for BalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BalanceState::Unpaid => "unpaid",
            BalanceState::Processing => "processing",
            BalanceState::Paid => "paid",
        };
        f.write_str(label)
    }
}

/// Where the funds backing a balance currently sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceHolder {
    /// Held by the platform's own merchant account.
    #[default]
    Platform,
    /// Already in the creator's Stripe Connect account.
    StripeConnect,
}

/// Money owed to a user for a single settlement date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub amount: Money,
    pub holder: BalanceHolder,
    pub state: BalanceState,
}

impl Balance {
    pub fn new(id: BalanceId, user_id: UserId, date: NaiveDate, amount: Money) -> Self {
        Self {
            id,
            user_id,
            date,
            amount,
            holder: BalanceHolder::Platform,
            state: BalanceState::Unpaid,
        }
    }

    /// True for unpaid balances settled on or before `date`.
    pub fn is_unpaid_up_to(&self, date: NaiveDate) -> bool {
        self.state == BalanceState::Unpaid && self.date <= date
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(BalanceState::Unpaid, BalanceState::Processing)
    }

    pub fn mark_paid(&mut self) -> Result<()> {
        self.transition(BalanceState::Processing, BalanceState::Paid)
    }

    pub fn mark_unpaid(&mut self) -> Result<()> {
        self.transition(BalanceState::Processing, BalanceState::Unpaid)
    }

    fn transition(&mut self, from: BalanceState, to: BalanceState) -> Result<()> {
        if self.state != from {
            return Err(PayoutError::InvalidTransition {
                entity: "balance",
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Result of trying to move a balance into `Processing` under its row lock.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The balance was unpaid and now belongs to the caller.
    Claimed(Balance),
    /// Another run got there first; the row was left untouched.
    AlreadyClaimed { state: BalanceState },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balance() -> Balance {
        Balance::new(
            BalanceId(1),
            UserId(1),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            Money::new(dec!(25.00)),
        )
    }

    #[test]
    fn test_balance_lifecycle() {
        let mut b = balance();
        b.mark_processing().unwrap();
        assert_eq!(b.state, BalanceState::Processing);
        b.mark_paid().unwrap();
        assert_eq!(b.state, BalanceState::Paid);
    }

    #[test]
    fn test_balance_release_back_to_unpaid() {
        let mut b = balance();
        b.mark_processing().unwrap();
        b.mark_unpaid().unwrap();
        assert_eq!(b.state, BalanceState::Unpaid);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut b = balance();
        assert!(matches!(
            b.mark_paid(),
            Err(PayoutError::InvalidTransition { .. })
        ));
        b.mark_processing().unwrap();
        assert!(b.mark_processing().is_err());
        b.mark_paid().unwrap();
        assert!(b.mark_unpaid().is_err());
    }

    #[test]
    fn test_unpaid_up_to() {
        let b = balance();
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        assert!(b.is_unpaid_up_to(date));
        assert!(!b.is_unpaid_up_to(date.pred_opt().unwrap()));
    }
}
