//! Engine configuration.
//!
//! Built-in defaults, overridden by an optional TOML file, overridden by
//! `ECOPAY_*` environment variables (`__` separates nested keys, e.g.
//! `ECOPAY_GATEWAY__FAILURE_RATE=0.2`).

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// How long a payment session stays usable.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,

    /// Active credits with this many days left or fewer count as expiring soon.
    #[serde(default = "default_expiring_soon")]
    pub expiring_soon_days: i64,

    /// Bills overdue by more days than this carry a warning.
    #[serde(default = "default_heavily_overdue")]
    pub heavily_overdue_days: i64,

    /// Treat active credits past their expiration as expired rather than invalid.
    #[serde(default = "default_true")]
    pub self_heal_expired: bool,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: default_session_ttl(),
            expiring_soon_days: default_expiring_soon(),
            heavily_overdue_days: default_heavily_overdue(),
            self_heal_expired: true,
            gateway: GatewayConfig::default(),
        }
    }
}

/// Behaviour of the simulated payment gateway.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_min_latency")]
    pub min_latency_ms: u64,
    #[serde(default = "default_max_latency")]
    pub max_latency_ms: u64,
    /// Probability in `[0, 1]` that a charge is declined.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: default_min_latency(),
            max_latency_ms: default_max_latency(),
            failure_rate: default_failure_rate(),
            seed: None,
        }
    }
}

fn default_session_ttl() -> i64 {
    15
}
fn default_expiring_soon() -> i64 {
    7
}
fn default_heavily_overdue() -> i64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_min_latency() -> u64 {
    500
}
fn default_max_latency() -> u64 {
    2000
}
fn default_failure_rate() -> f64 {
    0.05
}

impl EngineConfig {
    /// Loads defaults ← `path` (if given and present) ← environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("ECOPAY_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_minutes <= 0 {
            return Err(invalid("session_ttl_minutes", "must be greater than zero"));
        }
        if self.expiring_soon_days < 0 {
            return Err(invalid("expiring_soon_days", "cannot be negative"));
        }
        if self.heavily_overdue_days < 0 {
            return Err(invalid("heavily_overdue_days", "cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.gateway.failure_rate) {
            return Err(invalid("gateway.failure_rate", "must be between 0 and 1"));
        }
        if self.gateway.min_latency_ms > self.gateway.max_latency_ms {
            return Err(invalid(
                "gateway.min_latency_ms",
                "cannot be greater than gateway.max_latency_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
