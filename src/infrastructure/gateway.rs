use crate::config::GatewayConfig;
use crate::domain::ids::IdGenerator;
use crate::domain::ports::{ClockRef, PaymentGateway};
use crate::domain::session::{GatewayErrorCode, GatewayOutcome, PaymentMethod};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::time::Duration;

static DECLINES: [(GatewayErrorCode, &str); 5] = [
    (GatewayErrorCode::CardDeclined, "Your card was declined"),
    (GatewayErrorCode::InsufficientFunds, "Insufficient funds"),
    (GatewayErrorCode::NetworkError, "Network error, please try again"),
    (GatewayErrorCode::GatewayTimeout, "The payment provider timed out"),
    (GatewayErrorCode::ProcessingError, "The payment could not be processed"),
];

/// Stand-in for a real payment provider.
///
/// Every charge waits a random latency and fails with the configured
/// probability. All randomness comes from one seedable generator, so a
/// fixed seed replays the same sequence of outcomes.
pub struct SimulatedGateway {
    config: GatewayConfig,
    rng: Mutex<StdRng>,
    ids: IdGenerator,
    clock: ClockRef,
}

impl SimulatedGateway {
    pub fn new(config: GatewayConfig, clock: ClockRef) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ids = IdGenerator::new(
            StdRng::from_rng(&mut rng).unwrap_or_else(|_| StdRng::seed_from_u64(0)),
        );
        Self {
            config,
            rng: Mutex::new(rng),
            ids,
            clock,
        }
    }

    /// Draws latency and outcome together so the lock is not held across the sleep.
    fn roll(&self) -> (Duration, Option<usize>) {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let latency = rng.gen_range(self.config.min_latency_ms..=self.config.max_latency_ms);
        let declined = rng.gen_bool(self.config.failure_rate.clamp(0.0, 1.0));
        let reason = declined.then(|| rng.gen_range(0..DECLINES.len()));
        (Duration::from_millis(latency), reason)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, method: &PaymentMethod, amount: Decimal) -> GatewayOutcome {
        let (latency, decline) = self.roll();
        tokio::time::sleep(latency).await;

        match decline {
            Some(index) => {
                let (code, message) = &DECLINES[index];
                tracing::info!(method = method.kind(), code = code.code(), "gateway declined charge");
                GatewayOutcome::declined(code.clone(), *message)
            }
            None => {
                let completed_at = self.clock.now();
                let transaction_id = self.ids.transaction_id(completed_at);
                tracing::info!(method = method.kind(), %amount, %transaction_id, "gateway approved charge");
                GatewayOutcome::Approved {
                    transaction_id,
                    amount,
                    completed_at,
                }
            }
        }
    }
}
