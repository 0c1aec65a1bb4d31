use crate::domain::bill::{Bill, BillStatus};
use crate::domain::credit::{CreditStatus, CreditUse};
use crate::domain::ports::{BillStore, CreditStore};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory bill store keyed by bill id.
#[derive(Default, Clone)]
pub struct InMemoryBillStore {
    bills: Arc<RwLock<HashMap<String, Bill>>>,
}

impl InMemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bill: Bill) {
        let mut bills = self.bills.write().await;
        bills.insert(bill.id.clone(), bill);
    }
}

#[async_trait]
impl BillStore for InMemoryBillStore {
    async fn get_bill_by_id(&self, id: &str) -> Result<Option<Bill>, StoreError> {
        let bills = self.bills.read().await;
        Ok(bills.get(id).cloned())
    }

    async fn get_unpaid_bills(&self, resident_id: &str) -> Result<Vec<Bill>, StoreError> {
        let bills = self.bills.read().await;
        let mut unpaid: Vec<Bill> = bills
            .values()
            .filter(|b| b.resident_id == resident_id && b.status == BillStatus::Unpaid)
            .cloned()
            .collect();
        unpaid.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(unpaid)
    }

    async fn mark_bill_paid(&self, id: &str, applied_credits: Decimal) -> Result<Bill, StoreError> {
        let mut bills = self.bills.write().await;
        let bill = bills
            .get_mut(id)
            .ok_or_else(|| StoreError::BillNotFound(id.to_string()))?;
        bill.mark_paid(applied_credits);
        Ok(bill.clone())
    }
}

/// A thread-safe in-memory credit ledger holding raw credit documents per resident.
///
/// `redeem_credits` checks and marks a whole batch under one write lock and
/// only succeeds on documents still marked active, so two sessions cannot
/// both spend the same credit.
#[derive(Default, Clone)]
pub struct InMemoryCreditStore {
    credits: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl InMemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, resident_id: &str, credit: Value) {
        let mut credits = self.credits.write().await;
        credits
            .entry(resident_id.to_string())
            .or_default()
            .push(credit);
    }

    pub async fn extend(&self, resident_id: &str, batch: impl IntoIterator<Item = Value>) {
        let mut credits = self.credits.write().await;
        credits
            .entry(resident_id.to_string())
            .or_default()
            .extend(batch);
    }
}

#[async_trait]
impl CreditStore for InMemoryCreditStore {
    async fn get_credits(&self, resident_id: &str) -> Result<Vec<Value>, StoreError> {
        let credits = self.credits.read().await;
        Ok(credits.get(resident_id).cloned().unwrap_or_default())
    }

    async fn redeem_credits(
        &self,
        resident_id: &str,
        bill_id: &str,
        uses: &[CreditUse],
        redeemed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut credits = self.credits.write().await;
        let docs = credits.get_mut(resident_id).map(Vec::as_mut_slice).unwrap_or_default();

        let mut positions = Vec::with_capacity(uses.len());
        for used in uses {
            let position = docs
                .iter()
                .position(|doc| doc.get("id").and_then(Value::as_str) == Some(used.credit_id.as_str()))
                .ok_or_else(|| StoreError::CreditNotFound(used.credit_id.clone()))?;
            let active = docs[position].get("status").and_then(Value::as_str)
                == Some(CreditStatus::Active.as_str());
            if !active {
                return Err(StoreError::CreditNotActive(used.credit_id.clone()));
            }
            positions.push(position);
        }

        for (position, used) in positions.into_iter().zip(uses) {
            if let Some(fields) = docs[position].as_object_mut() {
                fields.insert("status".into(), json!(CreditStatus::Redeemed.as_str()));
                fields.insert("redeemedDate".into(), json!(redeemed_at.to_rfc3339()));
                fields.insert("redeemedBillId".into(), json!(bill_id));
                fields.insert("redeemedAmount".into(), json!(used.amount_applied.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credit::{CreditSource, validate_credit_item};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn credit(id: &str) -> Value {
        json!({
            "id": id,
            "amount": 100,
            "currency": "USD",
            "source": "ewaste",
            "status": "active",
            "earnedDate": (now() - Duration::days(3)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn test_in_memory_bill_store() {
        let store = InMemoryBillStore::new();
        let bill = Bill::new("B1", "R1", dec!(100), now());
        store.insert(bill.clone()).await;

        let retrieved = store.get_bill_by_id("B1").await.unwrap().unwrap();
        assert_eq!(retrieved, bill);
        assert!(store.get_bill_by_id("B2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unpaid_bills_by_resident_oldest_first() {
        let store = InMemoryBillStore::new();
        store.insert(Bill::new("late", "R1", dec!(10), now())).await;
        store
            .insert(Bill::new("early", "R1", dec!(10), now() - Duration::days(30)))
            .await;
        store.insert(Bill::new("other", "R2", dec!(10), now())).await;
        store.insert(Bill::new("paid", "R1", dec!(10), now())).await;
        store.mark_bill_paid("paid", dec!(0)).await.unwrap();

        let unpaid = store.get_unpaid_bills("R1").await.unwrap();
        let ids: Vec<&str> = unpaid.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_mark_unknown_bill_paid() {
        let store = InMemoryBillStore::new();
        assert_eq!(
            store.mark_bill_paid("nope", dec!(0)).await,
            Err(StoreError::BillNotFound("nope".into()))
        );
    }

    fn used(id: &str, amount: Decimal) -> CreditUse {
        CreditUse {
            credit_id: id.into(),
            source: CreditSource::Ewaste,
            amount_applied: amount,
            expiration_date: None,
        }
    }

    #[tokio::test]
    async fn test_redeemed_credit_passes_validation() {
        let store = InMemoryCreditStore::new();
        store.insert("R1", credit("c1")).await;

        store
            .redeem_credits("R1", "B1", &[used("c1", dec!(40))], now())
            .await
            .unwrap();

        let docs = store.get_credits("R1").await.unwrap();
        let credit = validate_credit_item(&docs[0], now()).unwrap().credit;
        assert_eq!(credit.status, CreditStatus::Redeemed);
        assert_eq!(credit.redeemed_value(), dec!(40));
    }

    #[tokio::test]
    async fn test_credit_cannot_be_redeemed_twice() {
        let store = InMemoryCreditStore::new();
        store.extend("R1", [credit("c1"), credit("c2")]).await;
        store
            .redeem_credits("R1", "B1", &[used("c1", dec!(100))], now())
            .await
            .unwrap();

        assert_eq!(
            store
                .redeem_credits("R1", "B2", &[used("c1", dec!(100))], now())
                .await,
            Err(StoreError::CreditNotActive("c1".into()))
        );
        assert_eq!(
            store
                .redeem_credits("R1", "B2", &[used("c9", dec!(1))], now())
                .await,
            Err(StoreError::CreditNotFound("c9".into()))
        );
        assert!(store.get_credits("R2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_with_a_spent_credit_redeems_nothing() {
        let store = InMemoryCreditStore::new();
        store.extend("R1", [credit("c1"), credit("c2")]).await;
        store
            .redeem_credits("R1", "B1", &[used("c2", dec!(100))], now())
            .await
            .unwrap();

        let batch = [used("c1", dec!(100)), used("c2", dec!(50))];
        assert_eq!(
            store.redeem_credits("R1", "B2", &batch, now()).await,
            Err(StoreError::CreditNotActive("c2".into()))
        );
        let docs = store.get_credits("R1").await.unwrap();
        assert_eq!(docs[0]["status"], "active");
    }

    #[tokio::test]
    async fn test_credit_ids_are_scoped_to_the_resident() {
        let store = InMemoryCreditStore::new();
        store.insert("R1", credit("shared")).await;
        store.insert("R2", credit("shared")).await;

        store
            .redeem_credits("R2", "B9", &[used("shared", dec!(10))], now())
            .await
            .unwrap();

        assert_eq!(store.get_credits("R1").await.unwrap()[0]["status"], "active");
        assert_eq!(store.get_credits("R2").await.unwrap()[0]["status"], "redeemed");
        assert_eq!(
            store
                .redeem_credits("R3", "B9", &[used("shared", dec!(10))], now())
                .await,
            Err(StoreError::CreditNotFound("shared".into()))
        );
    }
}
