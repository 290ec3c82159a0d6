//! Market creation bounds.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::market::MarketLimits;
use crate::error::ConfigError;

/// Bounds applied to every new market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Shortest allowed market (milliseconds).
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,
    /// Longest allowed market (milliseconds).
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    #[serde(default = "default_max_outcomes")]
    pub max_outcomes: usize,
}

const fn default_min_duration_ms() -> u64 {
    5_000
}

const fn default_max_duration_ms() -> u64 {
    14_400_000 // 4 hours
}

const fn default_max_outcomes() -> usize {
    10
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: default_min_duration_ms(),
            max_duration_ms: default_max_duration_ms(),
            max_outcomes: default_max_outcomes(),
        }
    }
}

impl MarketConfig {
    #[must_use]
    pub fn limits(&self) -> MarketLimits {
        MarketLimits {
            min_duration: Duration::from_millis(self.min_duration_ms),
            max_duration: Duration::from_millis(self.max_duration_ms),
            max_outcomes: self.max_outcomes,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.min_duration_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_duration_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.max_duration_ms < self.min_duration_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_duration_ms",
                reason: "must be >= min_duration_ms".to_string(),
            });
        }
        if self.max_outcomes < 2 {
            return Err(ConfigError::InvalidValue {
                field: "max_outcomes",
                reason: "must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}
