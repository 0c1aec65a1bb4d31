use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashSet;

use crate::domain::bill::{Bill, BillStatus};
use crate::domain::credit::{CreditRecord, CreditStatus, CreditUse, soonest_expiring_first};
use crate::domain::money::{non_negative, parse_decimal};
use crate::error::AllocationError;

/// Bills overdue by more than this many days carry a warning.
pub const HEAVILY_OVERDUE_DAYS: i64 = 30;

/// Outcome of applying credits to a bill amount. Computed per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    pub credits_to_apply: Decimal,
    /// In consumption order.
    pub credits_used: Vec<CreditUse>,
    pub new_bill_amount: Decimal,
    /// Eligible credit value left over after this allocation.
    pub credits_remaining: Decimal,
    pub fully_paid: bool,
    /// Selected ids that matched no credit in the pool (manual mode only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_ids: Vec<String>,
}

impl AllocationResult {
    fn new(
        bill_amount: Decimal,
        eligible_total: Decimal,
        credits_used: Vec<CreditUse>,
        unresolved_ids: Vec<String>,
    ) -> Self {
        let credits_to_apply: Decimal = credits_used.iter().map(|u| u.amount_applied).sum();
        let new_bill_amount = non_negative(bill_amount - credits_to_apply);
        Self {
            credits_to_apply,
            credits_used,
            new_bill_amount,
            credits_remaining: non_negative(eligible_total - credits_to_apply),
            fully_paid: new_bill_amount.is_zero(),
            unresolved_ids,
        }
    }
}

fn eligible_total(credits: &[CreditRecord], now: DateTime<Utc>) -> Decimal {
    credits
        .iter()
        .filter(|c| c.is_spendable(now))
        .map(CreditRecord::value)
        .sum()
}

/// Spends eligible credits soonest-expiring first until the bill is covered.
///
/// Eligible means active and not past expiration. Credits without an
/// expiration go last; ties go to the oldest earned. The last credit
/// touched is only used up to the remaining balance.
pub fn calculate_automatic_application(
    available_credits: &[CreditRecord],
    bill_amount: Decimal,
    now: DateTime<Utc>,
) -> AllocationResult {
    let mut eligible: Vec<&CreditRecord> = available_credits
        .iter()
        .filter(|c| c.is_spendable(now))
        .collect();
    eligible.sort_by(|a, b| {
        soonest_expiring_first(a.expiration_date, b.expiration_date)
            .then_with(|| a.earned_date.cmp(&b.earned_date))
    });

    let mut outstanding = non_negative(bill_amount);
    let mut credits_used = Vec::new();
    for credit in &eligible {
        if outstanding.is_zero() {
            break;
        }
        let applied = credit.value().min(outstanding);
        outstanding -= applied;
        credits_used.push(CreditUse::new(credit, applied));
    }

    let result = AllocationResult::new(
        bill_amount,
        eligible_total(available_credits, now),
        credits_used,
        Vec::new(),
    );
    tracing::debug!(
        bill = %bill_amount,
        applied = %result.credits_to_apply,
        credits = result.credits_used.len(),
        "computed automatic credit application"
    );
    result
}

/// Applies exactly the credits the resident picked.
///
/// Ids that match nothing are skipped and reported in `unresolved_ids`.
/// A picked credit that is not active or has expired fails the whole
/// selection, as does a selection worth more than the bill; nothing is
/// capped.
pub fn calculate_manual_application<S: AsRef<str>>(
    selected_credit_ids: &[S],
    available_credits: &[CreditRecord],
    bill_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<AllocationResult, AllocationError> {
    let mut seen = HashSet::new();
    let mut credits_used = Vec::new();
    let mut unresolved_ids = Vec::new();

    for id in selected_credit_ids.iter().map(AsRef::as_ref) {
        if !seen.insert(id) {
            continue;
        }
        let Some(credit) = available_credits.iter().find(|c| c.id == id) else {
            tracing::warn!(credit_id = id, "selected credit not found, skipping");
            unresolved_ids.push(id.to_string());
            continue;
        };
        if credit.status != CreditStatus::Active {
            return Err(AllocationError::InvalidCreditStatus(credit.id.clone()));
        }
        if credit.is_past_expiration(now) {
            return Err(AllocationError::CreditExpired(credit.id.clone()));
        }
        credits_used.push(CreditUse::new(credit, credit.value()));
    }

    let selected: Decimal = credits_used.iter().map(|u| u.amount_applied).sum();
    if selected > bill_amount {
        return Err(AllocationError::CreditsExceedBill {
            selected,
            bill: bill_amount,
        });
    }

    Ok(AllocationResult::new(
        bill_amount,
        eligible_total(available_credits, now),
        credits_used,
        unresolved_ids,
    ))
}

/// Parses and checks a typed-in credit amount.
pub fn validate_custom_amount_input(
    input: &str,
    available_total: Decimal,
    bill_amount: Decimal,
) -> Result<Decimal, AllocationError> {
    if input.trim().is_empty() {
        return Err(AllocationError::EmptyInput);
    }
    let amount =
        parse_decimal(input).ok_or_else(|| AllocationError::InvalidAmount(input.trim().to_string()))?;
    check_custom_amount(amount, available_total, bill_amount)
}

/// Bounds and precision checks for an amount of credits to apply.
pub fn check_custom_amount(
    amount: Decimal,
    available_total: Decimal,
    bill_amount: Decimal,
) -> Result<Decimal, AllocationError> {
    if amount < Decimal::ZERO {
        return Err(AllocationError::NegativeAmount);
    }
    if amount.is_zero() {
        return Err(AllocationError::ZeroAmount);
    }
    if amount > available_total {
        return Err(AllocationError::InsufficientCredits {
            available: available_total,
        });
    }
    if amount > bill_amount {
        return Err(AllocationError::ExceedsBill { bill: bill_amount });
    }
    if amount.normalize().scale() > 2 {
        return Err(AllocationError::InvalidPrecision);
    }
    Ok(amount)
}

/// Largest amount of credits that can go towards the bill.
pub fn max_applicable_credits(available_total: Decimal, bill_amount: Decimal) -> Decimal {
    non_negative(available_total.min(bill_amount))
}

/// Amount selected by a slider at `percent` (clamped to 100) of the
/// applicable maximum, rounded down to whole cents.
pub fn slider_amount(percent: u8, available_total: Decimal, bill_amount: Decimal) -> Decimal {
    let max = max_applicable_credits(available_total, bill_amount);
    let fraction = Decimal::from(percent.min(100)) / Decimal::ONE_HUNDRED;
    (max * fraction).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Non-fatal findings that accompany a bill that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillWarning {
    #[serde(rename_all = "camelCase")]
    HeavilyOverdue { days_overdue: i64 },
}

impl BillWarning {
    pub fn code(&self) -> &'static str {
        match self {
            Self::HeavilyOverdue { .. } => "HEAVILY_OVERDUE",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::HeavilyOverdue { days_overdue } => {
                format!("This bill is {days_overdue} days overdue")
            }
        }
    }
}

/// A bill that may receive credits, plus any advisory warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillCheck {
    pub warnings: Vec<BillWarning>,
}

pub fn validate_bill_for_credit_application(
    bill: Option<&Bill>,
    now: DateTime<Utc>,
) -> Result<BillCheck, AllocationError> {
    check_bill(bill, now, HEAVILY_OVERDUE_DAYS)
}

/// Same as [`validate_bill_for_credit_application`] with a custom overdue threshold.
pub fn check_bill(
    bill: Option<&Bill>,
    now: DateTime<Utc>,
    heavily_overdue_days: i64,
) -> Result<BillCheck, AllocationError> {
    let bill = bill.ok_or(AllocationError::BillNotFound)?;
    if bill.id.trim().is_empty() {
        return Err(AllocationError::InvalidBillId);
    }
    if bill.amount <= Decimal::ZERO {
        return Err(AllocationError::InvalidBillAmount);
    }
    if bill.status != BillStatus::Unpaid {
        return Err(AllocationError::BillNotPayable);
    }

    let mut check = BillCheck::default();
    let days_overdue = bill.days_overdue(now);
    if days_overdue > heavily_overdue_days {
        tracing::info!(bill_id = %bill.id, days_overdue, "bill is heavily overdue");
        check.warnings.push(BillWarning::HeavilyOverdue { days_overdue });
    }
    Ok(check)
}
