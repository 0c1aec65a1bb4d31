use super::CREDIT_COLUMNS;
use crate::domain::credit::CreditRecord;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;

/// Writes validated credits back out in the column layout the reader accepts.
pub struct CreditWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CreditWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_credits<'a>(
        &mut self,
        credits: impl IntoIterator<Item = &'a CreditRecord>,
    ) -> Result<()> {
        self.writer.write_record(CREDIT_COLUMNS)?;
        for credit in credits {
            let redemption = credit.redemption.as_ref();
            self.writer.write_record([
                credit.id.clone(),
                credit.value().to_string(),
                credit.currency.clone(),
                credit.source.as_str().to_string(),
                timestamp(credit.earned_date),
                credit.expiration_date.map(timestamp).unwrap_or_default(),
                credit.status.as_str().to_string(),
                redemption
                    .map(|r| timestamp(r.redeemed_date))
                    .unwrap_or_default(),
                redemption
                    .map(|r| r.redeemed_bill_id.clone())
                    .unwrap_or_default(),
                redemption
                    .map(|r| r.redeemed_amount.to_string())
                    .unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
