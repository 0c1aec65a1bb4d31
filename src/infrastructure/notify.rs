use crate::domain::card::validate_email;
use crate::domain::money::format_currency;
use crate::domain::ports::Notifier;
use crate::domain::session::{FailureRecord, PaymentRecord};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A notification the resident would have received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Confirmation { receipt_id: String, message: String },
    FailureNotice { failure_id: String, message: String },
    ReceiptPdf { receipt_id: String, path: String },
    ReceiptEmail { receipt_id: String, email: String },
}

/// Notifier that logs every notice and keeps it for inspection.
#[derive(Default, Clone)]
pub struct LogNotifier {
    sent: Arc<RwLock<Vec<Notice>>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notice> {
        self.sent.read().await.clone()
    }

    async fn record(&self, notice: Notice) {
        self.sent.write().await.push(notice);
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, record: &PaymentRecord) -> io::Result<()> {
        let message = format!(
            "Payment of {} for bill {} received. Receipt {}.",
            format_currency(record.amount),
            record.bill_id,
            record.receipt_id
        );
        tracing::info!(receipt_id = %record.receipt_id, "{message}");
        self.record(Notice::Confirmation {
            receipt_id: record.receipt_id.clone(),
            message,
        })
        .await;
        Ok(())
    }

    async fn send_failure_notice(&self, failure: &FailureRecord) -> io::Result<()> {
        let message = if failure.retryable {
            format!("{} You can try again.", failure.message)
        } else {
            failure.message.clone()
        };
        tracing::info!(failure_id = %failure.failure_id, code = failure.code.code(), "{message}");
        self.record(Notice::FailureNotice {
            failure_id: failure.failure_id.clone(),
            message,
        })
        .await;
        Ok(())
    }

    async fn generate_receipt_pdf(&self, record: &PaymentRecord) -> io::Result<String> {
        let path = format!("receipts/{}.pdf", record.receipt_id);
        tracing::info!(receipt_id = %record.receipt_id, %path, "receipt generated");
        self.record(Notice::ReceiptPdf {
            receipt_id: record.receipt_id.clone(),
            path: path.clone(),
        })
        .await;
        Ok(path)
    }

    async fn send_receipt_email(&self, record: &PaymentRecord, email: &str) -> io::Result<()> {
        if let Err(reason) = validate_email(email).into_result() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, reason));
        }
        tracing::info!(receipt_id = %record.receipt_id, email, "receipt emailed");
        self.record(Notice::ReceiptEmail {
            receipt_id: record.receipt_id.clone(),
            email: email.to_string(),
        })
        .await;
        Ok(())
    }
}
