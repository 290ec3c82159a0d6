//! Provider aggregation and circuit breaker configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Provider aggregation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Active providers required for a valid aggregate.
    #[serde(default = "default_quorum_min")]
    pub quorum_min: usize,
    /// Max-minus-min across providers above which the aggregate is
    /// flagged as high dispersion.
    #[serde(default = "default_spread_threshold")]
    pub spread_threshold: f64,
    /// Consecutive failures that open a provider's breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Open-breaker cooldown before a half-open probe (milliseconds).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Staleness window for a one-minute market (milliseconds).
    #[serde(default = "default_base_staleness_ms")]
    pub base_staleness_ms: u64,
    #[serde(default = "default_max_staleness_ms")]
    pub max_staleness_ms: u64,
    /// Confidence-weighted share of providers that must back the consensus
    /// outcome.
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,
}

const fn default_quorum_min() -> usize {
    3
}

const fn default_spread_threshold() -> f64 {
    0.05
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown_ms() -> u64 {
    30_000
}

const fn default_base_staleness_ms() -> u64 {
    5_000
}

const fn default_max_staleness_ms() -> u64 {
    60_000
}

const fn default_consensus_threshold() -> f64 {
    0.66
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            quorum_min: default_quorum_min(),
            spread_threshold: default_spread_threshold(),
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            base_staleness_ms: default_base_staleness_ms(),
            max_staleness_ms: default_max_staleness_ms(),
            consensus_threshold: default_consensus_threshold(),
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Staleness window for a market of the given duration.
    ///
    /// Scales linearly from the base window at one minute, never below the
    /// base and never above the maximum.
    #[must_use]
    pub fn staleness_window(&self, market_duration: Duration) -> Duration {
        let scaled = self.base_staleness_ms as f64 * market_duration.as_secs_f64() / 60.0;
        let ms = (scaled as u64).clamp(self.base_staleness_ms, self.max_staleness_ms);
        Duration::from_millis(ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.quorum_min == 0 {
            return Err(ConfigError::InvalidValue {
                field: "quorum_min",
                reason: "must be greater than 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.spread_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "spread_threshold",
                reason: "must be between 0 and 1".to_string(),
            });
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "failure_threshold",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cooldown_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.base_staleness_ms == 0 || self.max_staleness_ms < self.base_staleness_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_staleness_ms",
                reason: "must be >= base_staleness_ms > 0".to_string(),
            });
        }
        if !(self.consensus_threshold > 0.0 && self.consensus_threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "consensus_threshold",
                reason: "must be in (0, 1]".to_string(),
            });
        }
        Ok(())
    }
}
