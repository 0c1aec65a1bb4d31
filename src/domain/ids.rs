use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Mutex;
use uuid::Uuid;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Source of transaction, receipt, session and failure identifiers.
///
/// Owns its random number generator so callers decide how it is seeded;
/// nothing else in the crate draws randomness for identifiers. Uniqueness is
/// probabilistic.
pub struct IdGenerator {
    rng: Mutex<StdRng>,
}

impl IdGenerator {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Deterministic generator, used by tests and seeded simulations.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// `TXN-<epoch millis>-<6 base36 chars>`
    pub fn transaction_id(&self, now: DateTime<Utc>) -> String {
        format!("TXN-{}-{}", now.timestamp_millis(), self.base36(6))
    }

    /// `RCP-<5 zero padded digits>`
    pub fn receipt_id(&self) -> String {
        let n: u32 = self.with_rng(|rng| rng.gen_range(0..100_000));
        format!("RCP-{n:05}")
    }

    /// A UUID v4 shaped session identifier.
    pub fn session_id(&self) -> String {
        let mut bytes = [0u8; 16];
        self.with_rng(|rng| rng.fill_bytes(&mut bytes));
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string()
    }

    /// `FAIL-<epoch millis>-<4 base36 chars>`
    pub fn failure_id(&self, now: DateTime<Utc>) -> String {
        format!("FAIL-{}-{}", now.timestamp_millis(), self.base36(4))
    }

    fn base36(&self, len: usize) -> String {
        self.with_rng(|rng| {
            (0..len)
                .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
                .collect()
        })
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A poisoned lock only means another caller panicked mid-draw; the rng is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

/// Checks the canonical hyphenated UUID v4 layout.
pub fn is_session_id(candidate: &str) -> bool {
    Uuid::try_parse(candidate)
        .map(|id| id.get_version_num() == 4 && candidate.len() == 36)
        .unwrap_or(false)
}
