//! Proof resolution configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Deadline handling and verifier key source.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    /// Grace after the deadline during which a late proof is still
    /// accepted (milliseconds).
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Fraction withheld from payouts when the proof is late.
    #[serde(default = "default_late_penalty")]
    pub late_penalty: f64,
    /// Hex-encoded compressed Groth16 verifying key.
    #[serde(default)]
    pub verifying_key_path: Option<PathBuf>,
    /// Seed for the deterministic key setup used when no key path is set.
    #[serde(default = "default_development_seed")]
    pub development_seed: u64,
}

const fn default_grace_period_ms() -> u64 {
    5_000
}

const fn default_late_penalty() -> f64 {
    0.02
}

const fn default_development_seed() -> u64 {
    42
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            late_penalty: default_late_penalty(),
            verifying_key_path: None,
            development_seed: default_development_seed(),
        }
    }
}

impl ResolutionConfig {
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.late_penalty) {
            return Err(ConfigError::InvalidValue {
                field: "late_penalty",
                reason: "must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }
}
