use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

use super::card::{validate_card_expiry, validate_card_number, validate_cvv, validate_phone};
use super::credit::CreditUse;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single payment attempt by one resident against one bill.
///
/// Only `Active`, `Completed` and `Failed` are ever stored; `Expired` is
/// derived from `expires_at` whenever the session is looked at.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub session_id: String,
    pub resident_id: String,
    pub bill_id: String,
    /// What the bill asked for when the session started.
    pub bill_amount: Decimal,
    /// Credits applied during this session.
    pub applied_credits: Decimal,
    /// Amount left to charge.
    pub final_amount: Decimal,
    /// Credits backing `applied_credits`, committed on success.
    pub credit_allocation: Vec<CreditUse>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl PaymentSession {
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.status == SessionStatus::Active && now >= self.expires_at {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    /// Active and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == SessionStatus::Active
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    pub cvv: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub holder_name: String,
}

impl CardDetails {
    pub fn last4(&self) -> String {
        let digits: Vec<char> = self.number.chars().filter(char::is_ascii_digit).collect();
        digits[digits.len().saturating_sub(4)..].iter().collect()
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &format_args!("**** {}", self.last4()))
            .field("cvv", &"***")
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    Card(CardDetails),
    EWallet { provider: String, phone: String },
}

impl PaymentMethod {
    /// Runs the input validators; the error is the first failing field's message.
    pub fn validate(&self, today: NaiveDate) -> Result<(), String> {
        match self {
            Self::Card(card) => {
                let number = validate_card_number(&card.number);
                if !number.valid {
                    return Err(number.message.unwrap_or_default());
                }
                validate_cvv(&card.cvv, number.brand).into_result()?;
                validate_card_expiry(&card.expiry_month, &card.expiry_year, today)
                    .into_result()?;
                if card.holder_name.trim().is_empty() {
                    return Err("Cardholder name is required".to_string());
                }
                Ok(())
            }
            Self::EWallet { provider, phone } => {
                if provider.trim().is_empty() {
                    return Err("E-wallet provider is required".to_string());
                }
                validate_phone(phone).into_result()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Card(_) => "card",
            Self::EWallet { .. } => "ewallet",
        }
    }
}

/// Reasons a gateway may refuse a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayErrorCode {
    CardDeclined,
    InsufficientFunds,
    NetworkError,
    GatewayTimeout,
    ProcessingError,
    Other(String),
}

impl GatewayErrorCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "CARD_DECLINED" => Self::CardDeclined,
            "INSUFFICIENT_FUNDS" => Self::InsufficientFunds,
            "NETWORK_ERROR" => Self::NetworkError,
            "GATEWAY_TIMEOUT" => Self::GatewayTimeout,
            "PROCESSING_ERROR" => Self::ProcessingError,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::CardDeclined => "CARD_DECLINED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::NetworkError => "NETWORK_ERROR",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::ProcessingError => "PROCESSING_ERROR",
            Self::Other(code) => code,
        }
    }

    /// Whether trying again with a fresh session may succeed.
    pub fn retryable(&self) -> bool {
        !matches!(self, Self::CardDeclined | Self::InsufficientFunds)
    }
}

impl Serialize for GatewayErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

/// What the gateway reported for a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum GatewayOutcome {
    Approved {
        transaction_id: String,
        amount: Decimal,
        completed_at: DateTime<Utc>,
    },
    Declined {
        code: GatewayErrorCode,
        message: String,
        retryable: bool,
    },
}

impl GatewayOutcome {
    pub fn declined(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        let retryable = code.retryable();
        Self::Declined {
            code,
            message: message.into(),
            retryable,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Durable result of a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub receipt_id: String,
    pub transaction_id: String,
    pub session_id: String,
    pub resident_id: String,
    pub bill_id: String,
    pub amount: Decimal,
    pub credits_applied: Decimal,
    pub redeemed_credit_ids: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub failure_id: String,
    pub session_id: String,
    pub resident_id: String,
    pub bill_id: String,
    pub code: GatewayErrorCode,
    pub message: String,
    pub retryable: bool,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn session(status: SessionStatus) -> PaymentSession {
        PaymentSession {
            session_id: "s".into(),
            resident_id: "R1".into(),
            bill_id: "B1".into(),
            bill_amount: dec!(100),
            applied_credits: dec!(0),
            final_amount: dec!(100),
            credit_allocation: Vec::new(),
            created_at: now(),
            expires_at: now() + Duration::minutes(15),
            status,
        }
    }

    fn card(number: &str) -> CardDetails {
        CardDetails {
            number: number.into(),
            cvv: "123".into(),
            expiry_month: "12".into(),
            expiry_year: "2030".into(),
            holder_name: "Dana Cruz".into(),
        }
    }

    #[test]
    fn test_expiry_is_derived() {
        let s = session(SessionStatus::Active);
        assert!(s.is_usable(now()));
        assert_eq!(
            s.effective_status(now() + Duration::minutes(15)),
            SessionStatus::Expired
        );
        assert_eq!(s.status, SessionStatus::Active);
    }

    #[test]
    fn test_terminal_sessions_never_report_expired() {
        let s = session(SessionStatus::Completed);
        assert_eq!(
            s.effective_status(now() + Duration::days(1)),
            SessionStatus::Completed
        );
        assert!(s.status.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
    }

    #[test]
    fn test_payment_method_validation() {
        let today = now().date_naive();
        assert!(PaymentMethod::Card(card("4242424242424242")).validate(today).is_ok());
        assert_eq!(
            PaymentMethod::Card(card("1234567890123456")).validate(today),
            Err("Card number is invalid".to_string())
        );

        let mut amex = card("378282246310005");
        assert!(PaymentMethod::Card(amex.clone()).validate(today).is_err());
        amex.cvv = "1234".into();
        assert!(PaymentMethod::Card(amex).validate(today).is_ok());

        let wallet = PaymentMethod::EWallet {
            provider: "gcash".into(),
            phone: "0917 123 4567".into(),
        };
        assert!(wallet.validate(today).is_ok());
    }

    #[test]
    fn test_card_debug_is_redacted() {
        let rendered = format!("{:?}", card("4242424242424242"));
        assert!(rendered.contains("**** 4242"));
        assert!(!rendered.contains("4242424242424242"));
        assert!(!rendered.contains("123\""));
    }

    #[test]
    fn test_gateway_codes() {
        assert!(!GatewayErrorCode::parse("CARD_DECLINED").retryable());
        assert!(GatewayErrorCode::parse("GATEWAY_TIMEOUT").retryable());
        let other = GatewayErrorCode::parse("SOMETHING_NEW");
        assert_eq!(other.code(), "SOMETHING_NEW");
        assert!(other.retryable());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = GatewayOutcome::declined(GatewayErrorCode::NetworkError, "Network error");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "declined");
        assert_eq!(json["code"], "NETWORK_ERROR");
        assert_eq!(json["retryable"], true);
    }
}
