use super::bill::Bill;
use super::credit::CreditUse;
use super::session::{FailureRecord, GatewayOutcome, PaymentMethod, PaymentRecord};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::io;
use std::sync::Arc;

#[async_trait]
pub trait BillStore: Send + Sync {
    async fn get_bill_by_id(&self, id: &str) -> Result<Option<Bill>, StoreError>;
    async fn get_unpaid_bills(&self, resident_id: &str) -> Result<Vec<Bill>, StoreError>;
    /// Settles the bill with the credits that went towards it.
    async fn mark_bill_paid(&self, id: &str, applied_credits: Decimal) -> Result<Bill, StoreError>;
}

/// Ledger of earned credits. Records are handed out as raw documents and
/// validated by the caller.
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn get_credits(&self, resident_id: &str) -> Result<Vec<Value>, StoreError>;
    /// Redeems every credit in `uses` against `bill_id`, or none of them.
    ///
    /// Must refuse the whole batch if any credit is missing from the
    /// resident's ledger or is no longer active.
    async fn redeem_credits(
        &self,
        resident_id: &str,
        bill_id: &str,
        uses: &[CreditUse],
        redeemed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, method: &PaymentMethod, amount: Decimal) -> GatewayOutcome;
}

/// Side effects that follow a finished payment. Called by the application
/// driving the session, never by the session engine itself.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, record: &PaymentRecord) -> io::Result<()>;
    async fn send_failure_notice(&self, failure: &FailureRecord) -> io::Result<()>;
    /// Returns where the receipt document was written.
    async fn generate_receipt_pdf(&self, record: &PaymentRecord) -> io::Result<String>;
    async fn send_receipt_email(&self, record: &PaymentRecord, email: &str) -> io::Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type BillStoreRef = Arc<dyn BillStore>;
pub type CreditStoreRef = Arc<dyn CreditStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type ClockRef = Arc<dyn Clock>;
