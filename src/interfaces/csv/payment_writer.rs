use crate::domain::money::Money;
use crate::domain::payment::Payment;
use crate::error::Result;
use std::io::Write;

const HEADER: [&str; 11] = [
    "id",
    "user",
    "processor",
    "payout_type",
    "period_end",
    "gross",
    "fee",
    "amount",
    "state",
    "balances",
    "errors",
];

/// Writes payments as CSV, amounts fixed to two decimal places.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<I>(&mut self, payments: I) -> Result<()>
    where
        I: IntoIterator<Item = Payment>,
    {
        self.writer.write_record(HEADER)?;
        for payment in payments {
            let balances = payment
                .balance_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(";");
            self.writer.write_record([
                payment.id.to_string(),
                payment.user_id.to_string(),
                payment.processor.to_string(),
                payment.payout_type.to_string(),
                payment.payout_period_end_date.to_string(),
                amount(payment.gross_amount),
                amount(payment.processor_fee),
                amount(payment.amount),
                payment.state.to_string(),
                balances,
                payment.errors.join(";"),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn amount(money: Money) -> String {
    format!("{:.2}", money.round_to_cents().value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::BalanceId;
    use crate::domain::payment::{NewPayment, PaymentId, PayoutType, ProcessorType};
    use crate::domain::user::UserId;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_payments() {
        let mut payment = Payment::from_new(
            PaymentId(3),
            NewPayment {
                user_id: UserId(9),
                balance_ids: vec![BalanceId(1), BalanceId(4)],
                processor: ProcessorType::Paypal,
                payout_type: PayoutType::Standard,
                payout_period_end_date: NaiveDate::from_ymd_opt(2026, 10, 9).unwrap(),
                gross_amount: Money::new(dec!(100)),
                destination: None,
            },
        );
        payment.processor_fee = Money::new(dec!(2));
        payment.amount = Money::new(dec!(98));
        payment.errors.push("missing payout destination".to_string());

        let mut out = Vec::new();
        PaymentWriter::new(&mut out)
            .write_payments(vec![payment])
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with(
            "id,user,processor,payout_type,period_end,gross,fee,amount,state,balances,errors\n"
        ));
        assert!(text.contains(
            "3,9,paypal,standard,2026-10-09,100.00,2.00,98.00,creating,1;4,missing payout destination"
        ));
    }
}
