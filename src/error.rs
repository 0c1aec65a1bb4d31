use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::money::format_currency;

/// Reasons a raw credit document is rejected by the credit validator.
///
/// Variants are listed in the order the validator checks them; the first
/// failing check wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreditValidationError {
    #[error("Credit record must be an object")]
    NotAnObject,
    #[error("Credit is missing a valid id")]
    InvalidId,
    #[error("Credit amount must be greater than zero")]
    InvalidAmount,
    #[error("Credit is missing a currency")]
    MissingCurrency,
    #[error("Unknown credit source '{0}'")]
    InvalidSource(String),
    #[error("Unknown credit status '{0}'")]
    InvalidStatus(String),
    #[error("Credit is missing the date it was earned")]
    MissingEarnedDate,
    #[error("Credit earned date '{0}' is not a valid date")]
    InvalidEarnedDate(String),
    #[error("Credit earned date cannot be in the future")]
    FutureEarnedDate,
    #[error("Credit expiration date '{0}' is not a valid date")]
    InvalidExpirationDate(String),
    #[error("Credit cannot expire before it was earned")]
    ExpirationBeforeEarned,
    #[error("Redeemed credit is missing its redeemed date")]
    MissingRedeemedDate,
    #[error("Redeemed credit is missing the bill it was applied to")]
    MissingRedeemedBillId,
    #[error("Redeemed amount must be positive and no more than the credit amount")]
    InvalidRedeemedAmount,
    #[error("Active credit cannot have a redeemed date")]
    ActiveWithRedeemedDate,
    #[error("Active credit has already expired")]
    ActiveCreditExpired,
    #[error("Expired credit must have an expiration date in the past")]
    ExpiredWithoutPastExpiration,
}

impl CreditValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject => "INVALID_CREDIT_OBJECT",
            Self::InvalidId => "INVALID_CREDIT_ID",
            Self::InvalidAmount => "INVALID_CREDIT_AMOUNT",
            Self::MissingCurrency => "MISSING_CURRENCY",
            Self::InvalidSource(_) => "INVALID_CREDIT_SOURCE",
            Self::InvalidStatus(_) => "INVALID_CREDIT_STATUS",
            Self::MissingEarnedDate => "MISSING_EARNED_DATE",
            Self::InvalidEarnedDate(_) => "INVALID_EARNED_DATE",
            Self::FutureEarnedDate => "FUTURE_EARNED_DATE",
            Self::InvalidExpirationDate(_) => "INVALID_EXPIRATION_DATE",
            Self::ExpirationBeforeEarned => "EXPIRATION_BEFORE_EARNED",
            Self::MissingRedeemedDate => "MISSING_REDEEMED_DATE",
            Self::MissingRedeemedBillId => "MISSING_REDEEMED_BILL_ID",
            Self::InvalidRedeemedAmount => "INVALID_REDEEMED_AMOUNT",
            Self::ActiveWithRedeemedDate => "ACTIVE_WITH_REDEEMED_DATE",
            Self::ActiveCreditExpired => "ACTIVE_CREDIT_EXPIRED",
            Self::ExpiredWithoutPastExpiration => "INVALID_EXPIRED_CREDIT",
        }
    }
}

/// Failures of the allocation engine: bill checks, manual selection and
/// custom amount input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Please enter an amount")]
    EmptyInput,
    #[error("'{0}' is not a valid amount")]
    InvalidAmount(String),
    #[error("Amount cannot be negative")]
    NegativeAmount,
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("You only have {} in credits available", format_currency(*available))]
    InsufficientCredits { available: Decimal },
    #[error("Amount cannot exceed the bill total of {}", format_currency(*bill))]
    ExceedsBill { bill: Decimal },
    #[error("Amount can have at most two decimal places")]
    InvalidPrecision,
    #[error("Credit {0} is not active and cannot be applied")]
    InvalidCreditStatus(String),
    #[error("Credit {0} has expired and cannot be applied")]
    CreditExpired(String),
    #[error("Selected credits total {}, which is more than the bill amount of {}", format_currency(*selected), format_currency(*bill))]
    CreditsExceedBill { selected: Decimal, bill: Decimal },
    #[error("Bill not found")]
    BillNotFound,
    #[error("Bill is missing a valid id")]
    InvalidBillId,
    #[error("Bill amount must be greater than zero")]
    InvalidBillAmount,
    #[error("Credits can only be applied to unpaid bills")]
    BillNotPayable,
}

impl AllocationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "EMPTY_INPUT",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::NegativeAmount => "NEGATIVE_AMOUNT",
            Self::ZeroAmount => "ZERO_AMOUNT",
            Self::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            Self::ExceedsBill { .. } => "EXCEEDS_BILL",
            Self::InvalidPrecision => "INVALID_PRECISION",
            Self::InvalidCreditStatus(_) => "INVALID_CREDIT_STATUS",
            Self::CreditExpired(_) => "CREDIT_EXPIRED",
            Self::CreditsExceedBill { .. } => "CREDITS_EXCEED_BILL",
            Self::BillNotFound => "BILL_NOT_FOUND",
            Self::InvalidBillId => "INVALID_BILL_ID",
            Self::InvalidBillAmount => "INVALID_BILL_AMOUNT",
            Self::BillNotPayable => "BILL_NOT_PAYABLE",
        }
    }
}

/// Errors raised by the external stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Bill {0} not found")]
    BillNotFound(String),
    #[error("Credit {0} not found")]
    CreditNotFound(String),
    #[error("Credit {0} is no longer available")]
    CreditNotActive(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BillNotFound(_) => "BILL_NOT_FOUND",
            Self::CreditNotFound(_) => "CREDIT_NOT_FOUND",
            Self::CreditNotActive(_) => "CREDIT_NOT_ACTIVE",
            Self::Unavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Failures of the payment session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A resident id is required to start a payment")]
    ResidentIdRequired,
    #[error("A bill id is required to start a payment")]
    BillIdRequired,
    #[error("A session id is required")]
    SessionIdRequired,
    #[error("Bill not found")]
    BillNotFound,
    #[error("This bill has already been paid")]
    BillAlreadyPaid,
    #[error("Payment session not found")]
    SessionNotFound,
    #[error("Payment session has expired, please start again")]
    SessionExpired,
    #[error("Payment session is already finalized")]
    SessionFinalized,
    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResidentIdRequired => "RESIDENT_ID_REQUIRED",
            Self::BillIdRequired => "BILL_ID_REQUIRED",
            Self::SessionIdRequired => "SESSION_ID_REQUIRED",
            Self::BillNotFound => "BILL_NOT_FOUND",
            Self::BillAlreadyPaid => "BILL_ALREADY_PAID",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionFinalized => "SESSION_FINALIZED",
            Self::InvalidPaymentMethod(_) => "INVALID_PAYMENT_METHOD",
            Self::Allocation(e) => e.code(),
            Self::Store(e) => e.code(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    Credit(#[from] CreditValidationError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
