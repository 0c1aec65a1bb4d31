use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::non_negative;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Unpaid,
    Paid,
}

/// An amount a resident owes for a billing period.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub resident_id: String,
    /// Base amount before any credits.
    pub amount: Decimal,
    pub status: BillStatus,
    pub due_date: DateTime<Utc>,
    /// Credits already applied against this bill.
    #[serde(default)]
    pub applied_credits: Decimal,
}

impl Bill {
    pub fn new(
        id: impl Into<String>,
        resident_id: impl Into<String>,
        amount: Decimal,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            resident_id: resident_id.into(),
            amount,
            status: BillStatus::Unpaid,
            due_date,
            applied_credits: Decimal::ZERO,
        }
    }

    /// Amount still owed after credits, never below zero.
    pub fn final_amount(&self) -> Decimal {
        non_negative(self.amount - self.applied_credits)
    }

    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }

    /// Whole days past the due date; zero when not yet due.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        (now - self.due_date).num_days().max(0)
    }

    /// Settles the bill, recording the credits that went towards it.
    pub fn mark_paid(&mut self, applied_credits: Decimal) {
        self.applied_credits = applied_credits;
        self.status = BillStatus::Paid;
    }
}
