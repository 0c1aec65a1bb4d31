use crate::error::{PaymentError, Result};
use serde_json::{Map, Value};
use std::io::Read;

/// Reads raw credit documents from a CSV source.
///
/// Each row becomes a JSON object keyed by the header names, with empty
/// cells left out. Rows are not validated here; they are handed to the
/// credit ledger exactly like documents from a credit store.
pub struct CreditReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CreditReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields one document per row.
    pub fn credits(mut self) -> Result<impl Iterator<Item = Result<Value>>> {
        let headers = self.reader.headers()?.clone();
        Ok(self.reader.into_records().map(move |row| {
            let row = row?;
            let doc: Map<String, Value> = headers
                .iter()
                .zip(row.iter())
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
                .collect();
            Ok::<_, PaymentError>(Value::Object(doc))
        }))
    }

    /// Reads every row, failing on the first malformed one.
    pub fn read_all(self) -> Result<Vec<Value>> {
        self.credits()?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reader_valid_stream() {
        let data = "id, amount, currency, source, earnedDate, expirationDate, status\n\
                    C1, 25.00, USD, recyclable, 2026-01-01, 2026-06-01, active\n\
                    C2, 10, USD, referral, 2026-02-01, , active";
        let credits = CreditReader::new(data.as_bytes()).read_all().unwrap();

        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0]["id"], "C1");
        assert_eq!(credits[0]["amount"], "25.00");
        assert_eq!(credits[0]["expirationDate"], "2026-06-01");
        assert_eq!(
            credits[1],
            json!({
                "id": "C2",
                "amount": "10",
                "currency": "USD",
                "source": "referral",
                "earnedDate": "2026-02-01",
                "status": "active",
            })
        );
    }

    #[test]
    fn test_reader_short_rows_drop_missing_columns() {
        let data = "id,amount,currency,source\nC1,5";
        let credits = CreditReader::new(data.as_bytes()).read_all().unwrap();
        assert_eq!(credits[0], json!({"id": "C1", "amount": "5"}));
    }

    #[test]
    fn test_reader_invalid_utf8_is_an_error() {
        let mut data = b"id,amount\nC1,".to_vec();
        data.extend_from_slice(&[0xff, 0xfe]);
        let results: Vec<Result<Value>> = CreditReader::new(data.as_slice())
            .credits()
            .unwrap()
            .collect();
        assert!(results[0].is_err());
    }
}
