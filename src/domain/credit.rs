use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::money::{Amount, parse_decimal};
use crate::error::CreditValidationError;

const DAY_MS: i64 = 86_400_000;

/// Credits with at most this many days left are flagged as urgent.
pub const URGENT_DAYS: i64 = 7;

/// Credits with at most this many days left are "expiring soon".
pub const EXPIRING_SOON_DAYS: i64 = 30;

/// Largest face value a single credit may carry.
pub const MAX_CREDIT_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// How a credit was earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditSource {
    Recyclable,
    Ewaste,
    Referral,
    Promotion,
    Manual,
}

impl CreditSource {
    pub const ALL: [Self; 5] = [
        Self::Recyclable,
        Self::Ewaste,
        Self::Referral,
        Self::Promotion,
        Self::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recyclable => "recyclable",
            Self::Ewaste => "ewaste",
            Self::Referral => "referral",
            Self::Promotion => "promotion",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditStatus {
    Active,
    Redeemed,
    Expired,
    Cancelled,
}

impl CreditStatus {
    pub const ALL: [Self; 4] = [Self::Active, Self::Redeemed, Self::Expired, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

/// Which list a credit is shown in. Cancelled credits have no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditVariant {
    Active,
    Redeemed,
    Expired,
}

impl CreditVariant {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Active => "Available",
            Self::Redeemed => "Used",
            Self::Expired => "Expired",
        }
    }
}

/// Where and when a credit was spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub redeemed_date: DateTime<Utc>,
    pub redeemed_bill_id: String,
    pub redeemed_amount: Decimal,
}

/// A validated loyalty credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRecord {
    pub id: String,
    pub amount: Amount,
    pub currency: String,
    pub source: CreditSource,
    pub earned_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub status: CreditStatus,
    #[serde(flatten)]
    pub redemption: Option<Redemption>,
}

impl CreditRecord {
    pub fn value(&self) -> Decimal {
        self.amount.value()
    }

    /// An expiration date strictly before `now`.
    pub fn is_past_expiration(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp < now)
    }

    /// Active and not past its expiration date.
    pub fn is_spendable(&self, now: DateTime<Utc>) -> bool {
        self.status == CreditStatus::Active && !self.is_past_expiration(now)
    }

    /// Amount actually consumed by a redemption, falling back to the full amount.
    pub fn redeemed_value(&self) -> Decimal {
        self.redemption
            .as_ref()
            .map_or(self.value(), |r| r.redeemed_amount)
    }

    pub fn variant(&self) -> Option<CreditVariant> {
        match self.status {
            CreditStatus::Active => Some(CreditVariant::Active),
            CreditStatus::Redeemed => Some(CreditVariant::Redeemed),
            CreditStatus::Expired => Some(CreditVariant::Expired),
            CreditStatus::Cancelled => None,
        }
    }
}

/// Orders expiration dates soonest first, with "never expires" last.
pub fn soonest_expiring_first(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One credit's contribution to an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditUse {
    pub credit_id: String,
    pub source: CreditSource,
    pub amount_applied: Decimal,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl CreditUse {
    pub fn new(credit: &CreditRecord, amount_applied: Decimal) -> Self {
        Self {
            credit_id: credit.id.clone(),
            source: credit.source,
            amount_applied,
            expiration_date: credit.expiration_date,
        }
    }
}

/// A credit that passed validation.
///
/// `corrected_status` is set when the stored status was stale (an active
/// credit past its expiration date). `credit.status` already carries the
/// corrected value; the raw document is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCredit {
    pub credit: CreditRecord,
    pub corrected_status: Option<CreditStatus>,
}

/// Validates raw credit documents as handed over by the credit store.
#[derive(Debug, Clone, Copy)]
pub struct CreditValidator {
    /// Re-label active credits whose expiration has passed instead of rejecting them.
    pub self_heal_expired: bool,
}

impl Default for CreditValidator {
    fn default() -> Self {
        Self {
            self_heal_expired: true,
        }
    }
}

impl CreditValidator {
    pub fn new(self_heal_expired: bool) -> Self {
        Self { self_heal_expired }
    }

    pub fn validate(
        &self,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<ValidatedCredit, CreditValidationError> {
        use CreditValidationError as E;

        let doc = raw.as_object().ok_or(E::NotAnObject)?;

        let id = non_empty_str(doc, "id").ok_or(E::InvalidId)?;
        let amount = decimal_field(doc, "amount")
            .filter(|v| *v <= MAX_CREDIT_AMOUNT)
            .and_then(|v| Amount::new(v).ok())
            .ok_or(E::InvalidAmount)?;
        let currency = non_empty_str(doc, "currency").ok_or(E::MissingCurrency)?;
        let source = enum_field(doc, "source", CreditSource::parse).map_err(E::InvalidSource)?;
        let mut status =
            enum_field(doc, "status", CreditStatus::parse).map_err(E::InvalidStatus)?;

        let earned_raw = present(doc, "earnedDate").ok_or(E::MissingEarnedDate)?;
        let earned_date =
            parse_timestamp(earned_raw).ok_or_else(|| E::InvalidEarnedDate(display(earned_raw)))?;
        if earned_date > now {
            return Err(E::FutureEarnedDate);
        }

        let expiration_date = match present(doc, "expirationDate") {
            None => None,
            Some(v) => {
                Some(parse_timestamp(v).ok_or_else(|| E::InvalidExpirationDate(display(v)))?)
            }
        };
        if expiration_date.is_some_and(|exp| exp < earned_date) {
            return Err(E::ExpirationBeforeEarned);
        }
        let past_expiration = expiration_date.is_some_and(|exp| exp < now);

        let mut redemption = None;
        let mut corrected_status = None;
        match status {
            CreditStatus::Redeemed => {
                let redeemed_date = present(doc, "redeemedDate")
                    .and_then(parse_timestamp)
                    .ok_or(E::MissingRedeemedDate)?;
                let redeemed_bill_id =
                    non_empty_str(doc, "redeemedBillId").ok_or(E::MissingRedeemedBillId)?;
                let redeemed_amount = decimal_field(doc, "redeemedAmount")
                    .filter(|v| *v > Decimal::ZERO && *v <= amount.value())
                    .ok_or(E::InvalidRedeemedAmount)?;
                redemption = Some(Redemption {
                    redeemed_date,
                    redeemed_bill_id: redeemed_bill_id.to_string(),
                    redeemed_amount,
                });
            }
            CreditStatus::Active => {
                if present(doc, "redeemedDate").is_some() {
                    return Err(E::ActiveWithRedeemedDate);
                }
                if past_expiration {
                    if !self.self_heal_expired {
                        return Err(E::ActiveCreditExpired);
                    }
                    tracing::warn!(credit_id = id, "active credit past expiration, treating as expired");
                    status = CreditStatus::Expired;
                    corrected_status = Some(CreditStatus::Expired);
                }
            }
            CreditStatus::Expired => {
                if !past_expiration {
                    return Err(E::ExpiredWithoutPastExpiration);
                }
            }
            CreditStatus::Cancelled => {}
        }

        Ok(ValidatedCredit {
            credit: CreditRecord {
                id: id.to_string(),
                amount,
                currency: currency.to_string(),
                source,
                earned_date,
                expiration_date,
                status,
                redemption,
            },
            corrected_status,
        })
    }
}

/// Validates one raw credit document with the default (self-healing) validator.
pub fn validate_credit_item(
    raw: &Value,
    now: DateTime<Utc>,
) -> Result<ValidatedCredit, CreditValidationError> {
    CreditValidator::default().validate(raw, now)
}

fn present<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match doc.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    }
}

fn non_empty_str<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    doc.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn decimal_field(doc: &Map<String, Value>, key: &str) -> Option<Decimal> {
    match doc.get(key)? {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn enum_field<T>(
    doc: &Map<String, Value>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, String> {
    match doc.get(key) {
        Some(Value::String(s)) => parse(s).ok_or_else(|| s.clone()),
        Some(other) => Err(display(other)),
        None => Err(String::new()),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS` (read as UTC), plain
/// `YYYY-MM-DD` (midnight UTC) and integer epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub fn parse_timestamp_str(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationBand {
    NoExpiration,
    Expired,
    ExpiringToday,
    ExpiringSoon,
    Valid,
}

/// Display banding for a credit's expiration date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationStatus {
    pub status: ExpirationBand,
    pub days_remaining: Option<i64>,
    /// Seven days or fewer left; only ever set on `ExpiringSoon`.
    pub urgent: bool,
    pub label: String,
    pub color: &'static str,
}

/// Days left are the ceiling of the remaining time in whole days, so
/// anything under 24 hours away counts as one day.
pub fn calculate_expiration_status(
    expiration: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ExpirationStatus {
    let Some(expiration) = expiration else {
        return ExpirationStatus {
            status: ExpirationBand::NoExpiration,
            days_remaining: None,
            urgent: false,
            label: "No expiration".to_string(),
            color: "#6B7280",
        };
    };

    let days = days_until(expiration, now);
    let plural = |n: i64| if n == 1 { "day" } else { "days" };
    let (status, urgent, label, color) = match days {
        d if d < 0 => (
            ExpirationBand::Expired,
            false,
            format!("Expired {} {} ago", -d, plural(-d)),
            "#9CA3AF",
        ),
        0 => (
            ExpirationBand::ExpiringToday,
            false,
            "Expires today".to_string(),
            "#DC2626",
        ),
        d if d <= URGENT_DAYS => (
            ExpirationBand::ExpiringSoon,
            true,
            format!("Only {d} {} left!", plural(d)),
            "#EA580C",
        ),
        d if d <= EXPIRING_SOON_DAYS => (
            ExpirationBand::ExpiringSoon,
            false,
            format!("Expires in {d} days"),
            "#F59E0B",
        ),
        d => (
            ExpirationBand::Valid,
            false,
            format!("Valid for {d} days"),
            "#16A34A",
        ),
    };

    ExpirationStatus {
        status,
        days_remaining: Some(days),
        urgent,
        label,
        color,
    }
}

/// Ceiling of the millisecond delta divided by one day.
pub fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = (target - now).num_milliseconds();
    -((-delta).div_euclid(DAY_MS))
}
