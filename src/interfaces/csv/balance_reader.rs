use crate::domain::balance::{Balance, BalanceHolder, BalanceId, BalanceState};
use crate::domain::money::Money;
use crate::domain::user::UserId;
use crate::error::{PayoutError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct BalanceRecord {
    id: u64,
    user: u64,
    date: NaiveDate,
    amount: Money,
    #[serde(default)]
    holder: Option<BalanceHolder>,
    #[serde(default)]
    state: Option<BalanceState>,
}

impl From<BalanceRecord> for Balance {
    fn from(record: BalanceRecord) -> Self {
        let mut balance = Balance::new(
            BalanceId(record.id),
            UserId(record.user),
            record.date,
            record.amount,
        );
        balance.holder = record.holder.unwrap_or_default();
        balance.state = record.state.unwrap_or_default();
        balance
    }
}

/// Reads settled balances from a CSV source (`id,user,date,amount,holder,state`).
pub struct BalanceReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> BalanceReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes balances, one `Result` per row.
    pub fn balances(self) -> impl Iterator<Item = Result<Balance>> {
        self.reader
            .into_deserialize::<BalanceRecord>()
            .map(|result| result.map(Balance::from).map_err(PayoutError::from))
    }
}
