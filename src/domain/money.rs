use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// ISO code of the single currency the billing system works in.
pub const CURRENCY_CODE: &str = "USD";

/// Prefix of every formatted amount.
pub const CURRENCY_SYMBOL: &str = "$";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("amount must be greater than zero")]
pub struct NonPositiveAmount;

/// A strictly positive monetary amount.
///
/// Used for credit and bill base amounts, which are never zero or negative
/// once they have been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, NonPositiveAmount> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(NonPositiveAmount)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = NonPositiveAmount;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Rounds to whole cents, half away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamps a balance so it never drops below zero.
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Formats an amount as `$1,234.56`.
///
/// Negative amounts keep the symbol first (`$-12.50`).
pub fn format_currency(amount: Decimal) -> String {
    let rounded = round_cents(amount);
    let sign = if rounded < Decimal::ZERO { "-" } else { "" };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    format!("{CURRENCY_SYMBOL}{sign}{}.{cents}", group_thousands(whole))
}

/// Formats a floating point amount; NaN and infinities render as zero.
pub fn format_currency_f64(amount: f64) -> String {
    let value = if amount.is_finite() {
        Decimal::from_f64(amount).unwrap_or_default()
    } else {
        Decimal::ZERO
    };
    format_currency(value)
}

/// Formats free-text input; anything that is not a number renders as zero.
pub fn format_currency_str(input: &str) -> String {
    format_currency(parse_decimal(input).unwrap_or_default())
}

/// Parses plain or scientific decimal notation, ignoring surrounding whitespace.
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
