use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::allocation::{calculate_automatic_application, check_bill, check_custom_amount};
use super::ledger::CreditLedger;
use crate::config::EngineConfig;
use crate::domain::credit::{CreditRecord, CreditValidator};
use crate::domain::ids::IdGenerator;
use crate::domain::ports::{BillStoreRef, ClockRef, CreditStoreRef, PaymentGatewayRef};
use crate::domain::session::{
    FailureRecord, GatewayErrorCode, GatewayOutcome, PaymentMethod, PaymentRecord, PaymentSession,
    SessionStatus,
};
use crate::error::{SessionError, StoreError};

/// Answer to "can this session still be used?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidity {
    Valid { session: PaymentSession },
    Invalid { message: String },
}

impl SessionValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditApplication {
    /// Amount applied by this call.
    pub applied: Decimal,
    /// Total applied during the session so far.
    pub total_applied: Decimal,
    pub new_final_amount: Decimal,
}

/// Owns every live payment session and drives it from creation to its
/// terminal record.
///
/// Sessions are discarded once recorded; the returned record is the only
/// durable artifact. Operations on one session are expected to come from a
/// single caller in sequence.
pub struct PaymentSessions {
    bills: BillStoreRef,
    credits: CreditStoreRef,
    gateway: PaymentGatewayRef,
    clock: ClockRef,
    ids: Arc<IdGenerator>,
    ledger: CreditLedger,
    ttl: Duration,
    heavily_overdue_days: i64,
    sessions: RwLock<HashMap<String, PaymentSession>>,
}

impl PaymentSessions {
    pub fn new(
        bills: BillStoreRef,
        credits: CreditStoreRef,
        gateway: PaymentGatewayRef,
        clock: ClockRef,
        ids: Arc<IdGenerator>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            bills,
            credits,
            gateway,
            clock,
            ids,
            ledger: CreditLedger::new(
                CreditValidator::new(config.self_heal_expired),
                config.expiring_soon_days,
            ),
            ttl: Duration::minutes(config.session_ttl_minutes),
            heavily_overdue_days: config.heavily_overdue_days,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a session for paying `bill_id`.
    pub async fn initiate(
        &self,
        resident_id: &str,
        bill_id: &str,
    ) -> Result<PaymentSession, SessionError> {
        if resident_id.trim().is_empty() {
            return Err(SessionError::ResidentIdRequired);
        }
        if bill_id.trim().is_empty() {
            return Err(SessionError::BillIdRequired);
        }
        let bill = self
            .bills
            .get_bill_by_id(bill_id)
            .await?
            .ok_or(SessionError::BillNotFound)?;
        if bill.is_paid() {
            return Err(SessionError::BillAlreadyPaid);
        }

        let now = self.clock.now();
        let check = check_bill(Some(&bill), now, self.heavily_overdue_days)?;
        for warning in check.warnings {
            tracing::warn!(bill_id, code = warning.code(), "{}", warning.message());
        }

        let session = PaymentSession {
            session_id: self.ids.session_id(),
            resident_id: resident_id.to_string(),
            bill_id: bill.id.clone(),
            bill_amount: bill.amount,
            applied_credits: Decimal::ZERO,
            final_amount: bill.final_amount(),
            credit_allocation: Vec::new(),
            created_at: now,
            expires_at: now + self.ttl,
            status: SessionStatus::Active,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.is_usable(now));
        sessions.insert(session.session_id.clone(), session.clone());
        tracing::info!(
            session_id = %session.session_id,
            resident_id,
            bill_id,
            amount = %session.final_amount,
            "payment session started"
        );
        Ok(session)
    }

    /// Unknown and expired sessions are reported as invalid, not as errors.
    pub async fn validate(&self, session_id: &str) -> Result<SessionValidity, SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::SessionIdRequired);
        }
        let now = self.clock.now();
        let sessions = self.sessions.read().await;
        let validity = match sessions.get(session_id) {
            None => SessionValidity::Invalid {
                message: SessionError::SessionNotFound.to_string(),
            },
            Some(session) => match session.effective_status(now) {
                SessionStatus::Active => SessionValidity::Valid {
                    session: session.clone(),
                },
                SessionStatus::Expired => SessionValidity::Invalid {
                    message: SessionError::SessionExpired.to_string(),
                },
                SessionStatus::Completed | SessionStatus::Failed => SessionValidity::Invalid {
                    message: SessionError::SessionFinalized.to_string(),
                },
            },
        };
        Ok(validity)
    }

    pub async fn session(&self, session_id: &str) -> Option<PaymentSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Spendable credits for `resident_id` as of now.
    pub async fn spendable_credits(
        &self,
        resident_id: &str,
    ) -> Result<Vec<CreditRecord>, SessionError> {
        let raw = self.credits.get_credits(resident_id).await?;
        Ok(self.ledger.spendable_credits(&raw, self.clock.now()))
    }

    /// Lowers the session's final amount by `credit_amount`.
    ///
    /// The amount is bounded by the credits the resident has not yet applied
    /// in this session and by what is still owed. The credits backing the
    /// running total are re-picked soonest-expiring first on every call.
    pub async fn apply_credits(
        &self,
        session_id: &str,
        credit_amount: Decimal,
    ) -> Result<CreditApplication, SessionError> {
        let now = self.clock.now();
        let resident_id = self.usable(session_id, now).await?.resident_id;
        let pool = self.spendable_credits(&resident_id).await?;
        let pool_total: Decimal = pool.iter().map(CreditRecord::value).sum();

        let mut sessions = self.sessions.write().await;
        let session = usable_mut(&mut sessions, session_id, now)?;
        let available = pool_total - session.applied_credits;
        let applied = check_custom_amount(credit_amount, available, session.final_amount)?;

        session.applied_credits += applied;
        session.final_amount -= applied;
        session.credit_allocation =
            calculate_automatic_application(&pool, session.applied_credits, now).credits_used;

        tracing::info!(
            session_id,
            %applied,
            final_amount = %session.final_amount,
            "credits applied to session"
        );
        Ok(CreditApplication {
            applied,
            total_applied: session.applied_credits,
            new_final_amount: session.final_amount,
        })
    }

    /// Charges the session's final amount.
    ///
    /// An invalid payment method, or a credit in the session's allocation
    /// that is no longer spendable, fails before the gateway is contacted. A
    /// session with nothing left to pay is approved without a charge. The
    /// session itself is left untouched; record the outcome separately.
    pub async fn process_payment(
        &self,
        session_id: &str,
        method: &PaymentMethod,
    ) -> Result<GatewayOutcome, SessionError> {
        let now = self.clock.now();
        let session = self.usable(session_id, now).await?;
        method
            .validate(now.date_naive())
            .map_err(SessionError::InvalidPaymentMethod)?;
        self.check_allocation(&session).await?;

        if session.final_amount.is_zero() {
            tracing::info!(session_id, "nothing left to charge, skipping gateway");
            return Ok(GatewayOutcome::Approved {
                transaction_id: self.ids.transaction_id(now),
                amount: Decimal::ZERO,
                completed_at: now,
            });
        }

        tracing::info!(
            session_id,
            method = method.kind(),
            amount = %session.final_amount,
            "charging payment method"
        );
        Ok(self.gateway.charge(method, session.final_amount).await)
    }

    /// Completes the session: commits its credits, settles the bill and
    /// issues a receipt.
    ///
    /// If any allocated credit was spent elsewhere in the meantime nothing is
    /// redeemed, the bill stays unpaid and the session stays open.
    pub async fn record_success(
        &self,
        session_id: &str,
        transaction_id: &str,
        amount: Decimal,
    ) -> Result<PaymentRecord, SessionError> {
        let now = self.clock.now();
        let mut session = self.claim(session_id, now).await?;

        let settled = match self.settle(&session, now).await {
            Ok(settled) => settled,
            Err(e) => {
                tracing::error!(session_id, error = %e, "failed to settle bill");
                self.sessions
                    .write()
                    .await
                    .insert(session.session_id.clone(), session);
                return Err(e);
            }
        };

        session.status = SessionStatus::Completed;
        let record = PaymentRecord {
            receipt_id: self.ids.receipt_id(),
            transaction_id: transaction_id.to_string(),
            session_id: session.session_id,
            resident_id: session.resident_id,
            bill_id: session.bill_id,
            amount,
            credits_applied: session.applied_credits,
            redeemed_credit_ids: settled,
            completed_at: now,
        };
        tracing::info!(
            session_id = %record.session_id,
            receipt_id = %record.receipt_id,
            transaction_id,
            %amount,
            "payment recorded"
        );
        Ok(record)
    }

    /// Fails the session. The bill is left as it was.
    pub async fn record_failure(
        &self,
        session_id: &str,
        code: GatewayErrorCode,
        message: &str,
    ) -> Result<FailureRecord, SessionError> {
        let now = self.clock.now();
        let mut session = self.claim(session_id, now).await?;
        session.status = SessionStatus::Failed;

        let record = FailureRecord {
            failure_id: self.ids.failure_id(now),
            session_id: session.session_id,
            resident_id: session.resident_id,
            bill_id: session.bill_id,
            retryable: code.retryable(),
            code,
            message: message.to_string(),
            failed_at: now,
        };
        tracing::warn!(
            session_id = %record.session_id,
            failure_id = %record.failure_id,
            code = record.code.code(),
            retryable = record.retryable,
            "payment failed"
        );
        Ok(record)
    }

    async fn usable(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentSession, SessionError> {
        let mut sessions = self.sessions.write().await;
        usable_mut(&mut sessions, session_id, now).cloned()
    }

    /// Removes a usable session so that only one caller can finalize it.
    async fn claim(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentSession, SessionError> {
        let mut sessions = self.sessions.write().await;
        usable_mut(&mut sessions, session_id, now)?;
        sessions
            .remove(session_id)
            .ok_or(SessionError::SessionNotFound)
    }

    /// Fails with `CREDIT_NOT_ACTIVE` unless every allocated credit can still
    /// cover its share.
    async fn check_allocation(&self, session: &PaymentSession) -> Result<(), SessionError> {
        if session.credit_allocation.is_empty() {
            return Ok(());
        }
        let pool = self.spendable_credits(&session.resident_id).await?;
        for used in &session.credit_allocation {
            let covered = pool
                .iter()
                .any(|c| c.id == used.credit_id && c.value() >= used.amount_applied);
            if !covered {
                tracing::warn!(
                    session_id = %session.session_id,
                    credit_id = %used.credit_id,
                    "allocated credit is no longer spendable"
                );
                return Err(StoreError::CreditNotActive(used.credit_id.clone()).into());
            }
        }
        Ok(())
    }

    /// Redeems the allocated credits as one batch and marks the bill paid.
    /// Returns the ids of the redeemed credits.
    async fn settle(
        &self,
        session: &PaymentSession,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, SessionError> {
        let bill = self
            .bills
            .get_bill_by_id(&session.bill_id)
            .await?
            .ok_or(SessionError::BillNotFound)?;

        if !session.credit_allocation.is_empty() {
            self.credits
                .redeem_credits(
                    &session.resident_id,
                    &session.bill_id,
                    &session.credit_allocation,
                    now,
                )
                .await?;
        }

        self.bills
            .mark_bill_paid(&bill.id, bill.applied_credits + session.applied_credits)
            .await?;
        Ok(session
            .credit_allocation
            .iter()
            .map(|used| used.credit_id.clone())
            .collect())
    }
}

/// Looks up a session that may still be acted on.
fn usable_mut<'a>(
    sessions: &'a mut HashMap<String, PaymentSession>,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<&'a mut PaymentSession, SessionError> {
    if session_id.trim().is_empty() {
        return Err(SessionError::SessionIdRequired);
    }
    let session = sessions
        .get_mut(session_id)
        .ok_or(SessionError::SessionNotFound)?;
    match session.effective_status(now) {
        SessionStatus::Active => Ok(session),
        SessionStatus::Expired => Err(SessionError::SessionExpired),
        SessionStatus::Completed | SessionStatus::Failed => Err(SessionError::SessionFinalized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bill::{Bill, BillStatus};
    use crate::domain::credit::CreditUse;
    use crate::domain::ports::{BillStore, CreditStore, PaymentGateway};
    use crate::domain::session::CardDetails;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::in_memory::{InMemoryBillStore, InMemoryCreditStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    /// Approves everything and counts how often it was asked.
    #[derive(Default)]
    struct CountingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn charge(&self, _method: &PaymentMethod, amount: Decimal) -> GatewayOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            GatewayOutcome::Approved {
                transaction_id: "TXN-TEST".into(),
                amount,
                completed_at: now(),
            }
        }
    }

    struct Fixture {
        sessions: PaymentSessions,
        bills: InMemoryBillStore,
        credits: InMemoryCreditStore,
        gateway: Arc<CountingGateway>,
        clock: Arc<FixedClock>,
    }

    async fn fixture() -> Fixture {
        let bills = InMemoryBillStore::new();
        bills
            .insert(Bill::new("B1", "R1", dec!(100), now() - Duration::days(3)))
            .await;
        let mut paid = Bill::new("B2", "R1", dec!(40), now());
        paid.mark_paid(Decimal::ZERO);
        bills.insert(paid).await;

        let credits = InMemoryCreditStore::new();
        credits
            .extend(
                "R1",
                [
                    credit("C-late", "30", Some("2026-06-01T00:00:00Z")),
                    credit("C-soon", "25", Some("2026-03-05T00:00:00Z")),
                    credit("C-none", "50", None),
                ],
            )
            .await;

        let gateway = Arc::new(CountingGateway::default());
        let clock = Arc::new(FixedClock::new(now()));
        let sessions = PaymentSessions::new(
            Arc::new(bills.clone()),
            Arc::new(credits.clone()),
            gateway.clone(),
            clock.clone(),
            Arc::new(IdGenerator::seeded(7)),
            &EngineConfig::default(),
        );
        Fixture {
            sessions,
            bills,
            credits,
            gateway,
            clock,
        }
    }

    fn credit(id: &str, amount: &str, expires: Option<&str>) -> serde_json::Value {
        let mut doc = json!({
            "id": id,
            "amount": amount,
            "currency": "USD",
            "source": "recyclable",
            "status": "active",
            "earnedDate": "2026-01-01T00:00:00Z",
        });
        if let Some(exp) = expires {
            doc["expirationDate"] = json!(exp);
        }
        doc
    }

    fn card() -> PaymentMethod {
        PaymentMethod::Card(CardDetails {
            number: "4242 4242 4242 4242".into(),
            cvv: "123".into(),
            expiry_month: "12".into(),
            expiry_year: "30".into(),
            holder_name: "Dana Cruz".into(),
        })
    }

    #[tokio::test]
    async fn test_initiate_requires_ids() {
        let f = fixture().await;
        let err = f.sessions.initiate("", "B1").await.unwrap_err();
        assert_eq!(err.code(), "RESIDENT_ID_REQUIRED");
        let err = f.sessions.initiate("R1", " ").await.unwrap_err();
        assert_eq!(err.code(), "BILL_ID_REQUIRED");
    }

    #[tokio::test]
    async fn test_initiate_unknown_or_paid_bill() {
        let f = fixture().await;
        let err = f.sessions.initiate("R1", "nope").await.unwrap_err();
        assert_eq!(err.code(), "BILL_NOT_FOUND");
        let err = f.sessions.initiate("R1", "B2").await.unwrap_err();
        assert_eq!(err.code(), "BILL_ALREADY_PAID");
    }

    #[tokio::test]
    async fn test_initiate_opens_active_session() {
        let f = fixture().await;
        let session = f.sessions.initiate("R1", "B1").await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.final_amount, dec!(100));
        assert_eq!(session.expires_at, now() + Duration::minutes(15));
        assert!(crate::domain::ids::is_session_id(&session.session_id));

        let validity = f.sessions.validate(&session.session_id).await.unwrap();
        assert!(validity.is_valid());
    }

    #[tokio::test]
    async fn test_validate_reports_unknown_and_expired_as_invalid() {
        let f = fixture().await;
        assert_eq!(
            f.sessions.validate("").await.unwrap_err().code(),
            "SESSION_ID_REQUIRED"
        );
        let unknown = f.sessions.validate("missing").await.unwrap();
        assert_eq!(
            unknown,
            SessionValidity::Invalid {
                message: "Payment session not found".into()
            }
        );

        let session = f.sessions.initiate("R1", "B1").await.unwrap();
        f.clock.advance(Duration::minutes(15));
        let expired = f.sessions.validate(&session.session_id).await.unwrap();
        assert!(!expired.is_valid());
    }

    #[tokio::test]
    async fn test_expired_session_rejects_every_operation() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        f.clock.advance(Duration::minutes(16));

        let err = f.sessions.apply_credits(&id, dec!(10)).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_EXPIRED");
        let err = f.sessions.process_payment(&id, &card()).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_EXPIRED");
        let err = f
            .sessions
            .record_success(&id, "TXN-1", dec!(100))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SESSION_EXPIRED");
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_apply_credits_lowers_final_amount() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;

        let first = f.sessions.apply_credits(&id, dec!(40)).await.unwrap();
        assert_eq!(first.applied, dec!(40));
        assert_eq!(first.new_final_amount, dec!(60));

        let second = f.sessions.apply_credits(&id, dec!(10.50)).await.unwrap();
        assert_eq!(second.total_applied, dec!(50.50));
        assert_eq!(second.new_final_amount, dec!(49.50));

        let session = f.sessions.session(&id).await.unwrap();
        let picked: Vec<(&str, Decimal)> = session
            .credit_allocation
            .iter()
            .map(|u| (u.credit_id.as_str(), u.amount_applied))
            .collect();
        assert_eq!(picked, vec![("C-soon", dec!(25)), ("C-late", dec!(25.50))]);
    }

    #[tokio::test]
    async fn test_apply_credits_bounds() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;

        let err = f.sessions.apply_credits(&id, dec!(0)).await.unwrap_err();
        assert_eq!(err.code(), "ZERO_AMOUNT");
        let err = f.sessions.apply_credits(&id, dec!(-5)).await.unwrap_err();
        assert_eq!(err.code(), "NEGATIVE_AMOUNT");
        let err = f.sessions.apply_credits(&id, dec!(10.555)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PRECISION");

        // 105 available, 100 owed
        let err = f.sessions.apply_credits(&id, dec!(101)).await.unwrap_err();
        assert_eq!(err.code(), "EXCEEDS_BILL");

        f.sessions.apply_credits(&id, dec!(90)).await.unwrap();
        let err = f.sessions.apply_credits(&id, dec!(16)).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_CREDITS");
    }

    #[tokio::test]
    async fn test_invalid_method_never_reaches_gateway() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        let bad = PaymentMethod::Card(CardDetails {
            number: "4242 4242 4242 4241".into(),
            cvv: "123".into(),
            expiry_month: "12".into(),
            expiry_year: "30".into(),
            holder_name: "Dana Cruz".into(),
        });
        let err = f.sessions.process_payment(&id, &bad).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYMENT_METHOD");
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_payment_leaves_session_active() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        let outcome = f.sessions.process_payment(&id, &card()).await.unwrap();
        assert!(outcome.is_approved());
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 1);
        let session = f.sessions.session(&id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_fully_covered_bill_skips_gateway() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        f.sessions.apply_credits(&id, dec!(100)).await.unwrap();

        let outcome = f.sessions.process_payment(&id, &card()).await.unwrap();
        let GatewayOutcome::Approved {
            amount,
            transaction_id,
            ..
        } = outcome
        else {
            panic!("zero balance should be approved");
        };
        assert_eq!(amount, Decimal::ZERO);
        assert!(transaction_id.starts_with("TXN-"));
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_record_success_settles_bill_and_credits() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        f.sessions.apply_credits(&id, dec!(30)).await.unwrap();

        let record = f
            .sessions
            .record_success(&id, "TXN-1", dec!(70))
            .await
            .unwrap();
        assert!(record.receipt_id.starts_with("RCP-"));
        assert_eq!(record.credits_applied, dec!(30));
        assert_eq!(record.redeemed_credit_ids, vec!["C-soon", "C-late"]);

        let bill = f.bills.get_bill_by_id("B1").await.unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Paid);
        assert_eq!(bill.applied_credits, dec!(30));

        let raw = f.credits.get_credits("R1").await.unwrap();
        let soon = raw.iter().find(|c| c["id"] == "C-soon").unwrap();
        assert_eq!(soon["status"], "redeemed");

        // discarded after recording
        assert!(f.sessions.session(&id).await.is_none());
        let err = f
            .sessions
            .record_success(&id, "TXN-1", dec!(70))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    async fn spend_elsewhere(f: &Fixture, credit_id: &str) {
        let raw = f.credits.get_credits("R1").await.unwrap();
        let doc = raw.iter().find(|c| c["id"] == credit_id).unwrap();
        let record = CreditValidator::default().validate(doc, now()).unwrap().credit;
        f.credits
            .redeem_credits("R1", "OTHER", &[CreditUse::new(&record, record.value())], now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_credit_spent_elsewhere_blocks_the_charge() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        f.sessions.apply_credits(&id, dec!(20)).await.unwrap();
        spend_elsewhere(&f, "C-soon").await;

        let err = f.sessions.process_payment(&id, &card()).await.unwrap_err();
        assert_eq!(err.code(), "CREDIT_NOT_ACTIVE");
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_credit_spent_after_charge_refuses_to_settle() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;
        f.sessions.apply_credits(&id, dec!(40)).await.unwrap();
        let outcome = f.sessions.process_payment(&id, &card()).await.unwrap();
        assert!(outcome.is_approved());
        spend_elsewhere(&f, "C-soon").await;

        let err = f
            .sessions
            .record_success(&id, "TXN-1", dec!(60))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CREDIT_NOT_ACTIVE");

        let bill = f.bills.get_bill_by_id("B1").await.unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Unpaid);
        assert_eq!(bill.applied_credits, Decimal::ZERO);
        let raw = f.credits.get_credits("R1").await.unwrap();
        let late = raw.iter().find(|c| c["id"] == "C-late").unwrap();
        assert_eq!(late["status"], "active");
        assert!(f.sessions.validate(&id).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_initiate_rejects_non_positive_bill() {
        let f = fixture().await;
        f.bills
            .insert(Bill::new("B0", "R1", Decimal::ZERO, now()))
            .await;
        f.bills
            .insert(Bill::new("B-neg", "R1", dec!(-15), now()))
            .await;

        for bill_id in ["B0", "B-neg"] {
            let err = f.sessions.initiate("R1", bill_id).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_BILL_AMOUNT");
        }
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_record_failure_leaves_bill_unpaid() {
        let f = fixture().await;
        let id = f.sessions.initiate("R1", "B1").await.unwrap().session_id;

        let failure = f
            .sessions
            .record_failure(&id, GatewayErrorCode::NetworkError, "Network error")
            .await
            .unwrap();
        assert!(failure.retryable);
        assert!(failure.failure_id.starts_with("FAIL-"));

        let bill = f.bills.get_bill_by_id("B1").await.unwrap().unwrap();
        assert_eq!(bill.status, BillStatus::Unpaid);
        assert!(!f.sessions.validate(&id).await.unwrap().is_valid());

        let second = f.sessions.initiate("R1", "B1").await.unwrap();
        let declined = f
            .sessions
            .record_failure(
                &second.session_id,
                GatewayErrorCode::CardDeclined,
                "Your card was declined",
            )
            .await
            .unwrap();
        assert!(!declined.retryable);
    }
}
