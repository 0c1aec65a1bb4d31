#![allow(dead_code)]

use ecopay::domain::bill::Bill;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Error;
use std::path::Path;

pub const HEADER: [&str; 10] = [
    "id",
    "amount",
    "currency",
    "source",
    "earnedDate",
    "expirationDate",
    "status",
    "redeemedDate",
    "redeemedBillId",
    "redeemedAmount",
];

/// Writes `count` active credits of `amount` each, expiring a day apart.
pub fn generate_credits_csv(path: &Path, count: usize, amount: &str) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(HEADER)?;
    for i in 1..=count {
        wtr.write_record([
            format!("C{i}").as_str(),
            amount,
            "USD",
            "recyclable",
            "2025-01-01T00:00:00Z",
            format!("2098-01-{:02}T00:00:00Z", i.min(28)).as_str(),
            "active",
            "",
            "",
            "",
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// A raw active credit document as a credit store would hand it over.
pub fn active_credit(id: &str, amount: &str, earned: &str, expires: Option<&str>) -> Value {
    let mut doc = json!({
        "id": id,
        "amount": amount,
        "currency": "USD",
        "source": "recyclable",
        "status": "active",
        "earnedDate": earned,
    });
    if let Some(expires) = expires {
        doc["expirationDate"] = json!(expires);
    }
    doc
}

pub fn unpaid_bill(id: &str, resident_id: &str, amount: rust_decimal::Decimal) -> Bill {
    let due = chrono::DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
        .map(|d| d.to_utc())
        .unwrap();
    Bill::new(id, resident_id, amount, due)
}
