use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::credit::{
    CreditRecord, CreditSource, CreditValidator, CreditVariant, ExpirationStatus, URGENT_DAYS,
    calculate_expiration_status, soonest_expiring_first,
};

/// A validated credit together with what the credits screen needs to show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayCredit {
    #[serde(flatten)]
    pub credit: CreditRecord,
    pub variant: CreditVariant,
    pub expiration: ExpirationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub total_active: Decimal,
    pub total_redeemed: Decimal,
    pub total_expired: Decimal,
    pub active_count: usize,
    pub redeemed_count: usize,
    pub expired_count: usize,
    /// Active credits close enough to expiry to warn the resident about.
    pub expiring_soon_count: usize,
    pub expiring_soon_amount: Decimal,
}

/// Categorized view of a resident's credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditDisplay {
    pub valid_credits_count: usize,
    pub invalid_credits_count: usize,
    pub active_credits: Vec<DisplayCredit>,
    pub redeemed_credits: Vec<DisplayCredit>,
    pub expired_credits: Vec<DisplayCredit>,
    pub summary: CreditSummary,
    /// Active credit totals per source; every source is present.
    pub breakdown: BTreeMap<CreditSource, Decimal>,
}

impl Default for CreditDisplay {
    fn default() -> Self {
        Self {
            valid_credits_count: 0,
            invalid_credits_count: 0,
            active_credits: Vec::new(),
            redeemed_credits: Vec::new(),
            expired_credits: Vec::new(),
            summary: CreditSummary::default(),
            breakdown: CreditSource::ALL
                .into_iter()
                .map(|source| (source, Decimal::ZERO))
                .collect(),
        }
    }
}

/// Validates, partitions, sorts and totals raw credit records.
///
/// One bad record never fails the batch: it is dropped and counted.
#[derive(Debug, Clone, Copy)]
pub struct CreditLedger {
    validator: CreditValidator,
    expiring_soon_days: i64,
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new(CreditValidator::default(), URGENT_DAYS)
    }
}

impl CreditLedger {
    pub fn new(validator: CreditValidator, expiring_soon_days: i64) -> Self {
        Self {
            validator,
            expiring_soon_days,
        }
    }

    /// Anything other than a JSON array yields an empty display.
    pub fn process(&self, all_credits: &Value, now: DateTime<Utc>) -> CreditDisplay {
        match all_credits.as_array() {
            Some(records) => self.process_records(records, now),
            None => CreditDisplay::default(),
        }
    }

    pub fn process_records(&self, records: &[Value], now: DateTime<Utc>) -> CreditDisplay {
        let mut view = CreditDisplay::default();

        for raw in records {
            let credit = match self.validator.validate(raw, now) {
                Ok(validated) => validated.credit,
                Err(e) => {
                    tracing::warn!(code = e.code(), error = %e, "dropping invalid credit record");
                    view.invalid_credits_count += 1;
                    continue;
                }
            };
            view.valid_credits_count += 1;

            let Some(variant) = credit.variant() else {
                continue;
            };
            let entry = DisplayCredit {
                expiration: calculate_expiration_status(credit.expiration_date, now),
                variant,
                credit,
            };
            match variant {
                CreditVariant::Active => view.active_credits.push(entry),
                CreditVariant::Redeemed => view.redeemed_credits.push(entry),
                CreditVariant::Expired => view.expired_credits.push(entry),
            }
        }

        view.active_credits.sort_by(|a, b| {
            soonest_expiring_first(a.credit.expiration_date, b.credit.expiration_date)
                .then_with(|| b.credit.earned_date.cmp(&a.credit.earned_date))
        });
        view.redeemed_credits.sort_by(|a, b| {
            let date = |c: &DisplayCredit| c.credit.redemption.as_ref().map(|r| r.redeemed_date);
            date(b).cmp(&date(a))
        });
        view
            .expired_credits
            .sort_by(|a, b| b.credit.expiration_date.cmp(&a.credit.expiration_date));

        self.summarize(&mut view);
        tracing::debug!(
            valid = view.valid_credits_count,
            invalid = view.invalid_credits_count,
            active = %view.summary.total_active,
            "processed credit ledger"
        );
        view
    }

    fn summarize(&self, view: &mut CreditDisplay) {
        let summary = &mut view.summary;
        for entry in &view.active_credits {
            let value = entry.credit.value();
            summary.total_active += value;
            if entry
                .expiration
                .days_remaining
                .is_some_and(|days| days <= self.expiring_soon_days)
            {
                summary.expiring_soon_count += 1;
                summary.expiring_soon_amount += value;
            }
            *view
                .breakdown
                .entry(entry.credit.source)
                .or_insert(Decimal::ZERO) += value;
        }
        summary.total_redeemed = view
            .redeemed_credits
            .iter()
            .map(|e| e.credit.redeemed_value())
            .sum();
        summary.total_expired = view
            .expired_credits
            .iter()
            .map(|e| e.credit.value())
            .sum();
        summary.active_count = view.active_credits.len();
        summary.redeemed_count = view.redeemed_credits.len();
        summary.expired_count = view.expired_credits.len();
    }

    /// Every record that passes validation, in input order.
    pub fn valid_credits(&self, records: &[Value], now: DateTime<Utc>) -> Vec<CreditRecord> {
        records
            .iter()
            .filter_map(|raw| self.validator.validate(raw, now).ok())
            .map(|validated| validated.credit)
            .collect()
    }

    /// Validated credits that can be spent right now.
    pub fn spendable_credits(&self, records: &[Value], now: DateTime<Utc>) -> Vec<CreditRecord> {
        let mut credits = self.valid_credits(records, now);
        credits.retain(|credit| credit.is_spendable(now));
        credits
    }
}

/// Categorizes credits with the default ledger settings.
pub fn process_credits_for_display(all_credits: &Value, now: DateTime<Utc>) -> CreditDisplay {
    CreditLedger::default().process(all_credits, now)
}
