//! Payment input validators: card numbers, CVV, expiry, email and phone.
//!
//! None of these fail on malformed input; they report a [`FieldCheck`] whose
//! message can be shown to the resident as is.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCheck {
    pub valid: bool,
    pub message: Option<String>,
}

impl FieldCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<(), String> {
        if self.valid {
            Ok(())
        } else {
            Err(self.message.unwrap_or_default())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardCheck {
    pub valid: bool,
    pub brand: CardBrand,
    pub message: Option<String>,
}

/// Classifies a card by its leading digits.
pub fn card_brand(number: &str) -> CardBrand {
    let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    let prefix2 = digits.get(..2).and_then(|p| p.parse::<u8>().ok());
    if digits.starts_with('4') {
        CardBrand::Visa
    } else if matches!(prefix2, Some(51..=55)) {
        CardBrand::Mastercard
    } else if matches!(prefix2, Some(34 | 37)) {
        CardBrand::Amex
    } else if digits.starts_with("6011") || digits.starts_with("65") {
        CardBrand::Discover
    } else {
        CardBrand::Unknown
    }
}

pub fn validate_card_number(number: &str) -> CardCheck {
    let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    let brand = card_brand(&digits);
    let failure = |message: &str| CardCheck {
        valid: false,
        brand,
        message: Some(message.to_string()),
    };

    if digits.is_empty() {
        return failure("Card number is required");
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return failure("Card number can only contain digits");
    }
    if !(13..=19).contains(&digits.len()) {
        return failure("Card number must be between 13 and 19 digits");
    }
    if !luhn(&digits) {
        return failure("Card number is invalid");
    }
    CardCheck {
        valid: true,
        brand,
        message: None,
    }
}

fn luhn(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Three digits, or four for American Express.
pub fn validate_cvv(cvv: &str, brand: CardBrand) -> FieldCheck {
    let cvv = cvv.trim();
    let expected = if brand == CardBrand::Amex { 4 } else { 3 };
    if cvv.is_empty() {
        FieldCheck::invalid("CVV is required")
    } else if !cvv.chars().all(|c| c.is_ascii_digit()) || cvv.len() != expected {
        FieldCheck::invalid(format!("CVV must be {expected} digits"))
    } else {
        FieldCheck::ok()
    }
}

/// Month `1..=12`; two digit years are read as `20YY`. A card expiring in
/// the current month is still valid.
pub fn validate_card_expiry(month: &str, year: &str, today: NaiveDate) -> FieldCheck {
    let Ok(month) = month.trim().parse::<u32>() else {
        return FieldCheck::invalid("Expiry month is invalid");
    };
    if !(1..=12).contains(&month) {
        return FieldCheck::invalid("Expiry month must be between 1 and 12");
    }
    let Ok(mut year) = year.trim().parse::<i32>() else {
        return FieldCheck::invalid("Expiry year is invalid");
    };
    if (0..100).contains(&year) {
        year += 2000;
    }
    if (year, month) < (today.year(), today.month()) {
        return FieldCheck::invalid("Card has expired");
    }
    FieldCheck::ok()
}

pub fn validate_email(email: &str) -> FieldCheck {
    let email = email.trim();
    if email.is_empty() {
        return FieldCheck::invalid("Email is required");
    }
    let valid = !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !domain.ends_with('.')
        });
    if valid {
        FieldCheck::ok()
    } else {
        FieldCheck::invalid("Please enter a valid email address")
    }
}

/// Accepts 10 to 15 digits once spaces, dashes, dots, parentheses and a
/// leading `+` are removed.
pub fn validate_phone(phone: &str) -> FieldCheck {
    let phone = phone.trim();
    if phone.is_empty() {
        return FieldCheck::invalid("Phone number is required");
    }
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let digits: String = body
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    if digits.chars().all(|c| c.is_ascii_digit()) && (10..=15).contains(&digits.len()) {
        FieldCheck::ok()
    } else {
        FieldCheck::invalid("Please enter a valid phone number")
    }
}
