//! Leverage tier and chain configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::position::ChainStepKind;
use crate::error::ConfigError;

/// One row of the duration-tier table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LeverageTier {
    /// Markets up to this duration (inclusive) get `ceiling`.
    pub up_to_secs: u64,
    pub ceiling: f64,
}

/// One chain step kind and its activation rule.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ChainStepConfig {
    pub kind: ChainStepKind,
    /// Step runs only when the target leverage is strictly above this.
    pub activation_threshold: f64,
    /// Largest multiplier the step may contribute.
    pub max_multiplier: f64,
}

/// Leverage policy.
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageConfig {
    /// Hard cap applied after all multipliers.
    #[serde(default = "default_absolute_ceiling")]
    pub absolute_ceiling: f64,
    /// Tiers ordered by `up_to_secs`.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<LeverageTier>,
    /// Ceiling for markets longer than every tier.
    #[serde(default = "default_fallback_ceiling")]
    pub fallback_ceiling: f64,
    /// `k'` in the tau efficiency bonus `1 + k' * tau`.
    #[serde(default = "default_tau_bonus_coefficient")]
    pub tau_bonus_coefficient: f64,
    #[serde(default = "default_max_chain_steps")]
    pub max_chain_steps: usize,
    /// Retries per step after the first attempt.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Timeout for one venue call (milliseconds).
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Step kinds in priority order.
    #[serde(default = "default_steps")]
    pub steps: Vec<ChainStepConfig>,
}

const fn default_absolute_ceiling() -> f64 {
    500.0
}

fn default_tiers() -> Vec<LeverageTier> {
    vec![
        LeverageTier { up_to_secs: 60, ceiling: 500.0 },
        LeverageTier { up_to_secs: 600, ceiling: 250.0 },
        LeverageTier { up_to_secs: 1800, ceiling: 150.0 },
        LeverageTier { up_to_secs: 3600, ceiling: 100.0 },
    ]
}

const fn default_fallback_ceiling() -> f64 {
    75.0
}

const fn default_tau_bonus_coefficient() -> f64 {
    1500.0
}

const fn default_max_chain_steps() -> usize {
    5
}

const fn default_retry_budget() -> u32 {
    1
}

const fn default_step_timeout_ms() -> u64 {
    200
}

const fn default_backoff_initial_ms() -> u64 {
    50
}

const fn default_backoff_max_ms() -> u64 {
    250
}

fn default_steps() -> Vec<ChainStepConfig> {
    vec![
        ChainStepConfig {
            kind: ChainStepKind::Borrow,
            activation_threshold: 20.0,
            max_multiplier: 1.5,
        },
        ChainStepConfig {
            kind: ChainStepKind::LiquidationBonus,
            activation_threshold: 50.0,
            max_multiplier: 1.2,
        },
        ChainStepConfig {
            kind: ChainStepKind::StakeBoost,
            activation_threshold: 75.0,
            max_multiplier: 1.1,
        },
    ]
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            absolute_ceiling: default_absolute_ceiling(),
            tiers: default_tiers(),
            fallback_ceiling: default_fallback_ceiling(),
            tau_bonus_coefficient: default_tau_bonus_coefficient(),
            max_chain_steps: default_max_chain_steps(),
            retry_budget: default_retry_budget(),
            step_timeout_ms: default_step_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            steps: default_steps(),
        }
    }
}

impl LeverageConfig {
    /// Ceiling of the first tier whose bound covers `duration`.
    #[must_use]
    pub fn tier_ceiling(&self, duration: Duration) -> f64 {
        self.tiers
            .iter()
            .find(|tier| duration <= Duration::from_secs(tier.up_to_secs))
            .map_or(self.fallback_ceiling, |tier| tier.ceiling)
    }

    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based): doubles from the
    /// initial delay, capped at the maximum.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let ms = self.backoff_initial_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.backoff_max_ms))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.absolute_ceiling.is_finite() && self.absolute_ceiling >= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "absolute_ceiling",
                reason: "must be >= 1".to_string(),
            });
        }
        if !self.tiers.windows(2).all(|w| w[0].up_to_secs < w[1].up_to_secs) {
            return Err(ConfigError::InvalidValue {
                field: "tiers",
                reason: "up_to_secs must be strictly increasing".to_string(),
            });
        }
        let ceilings = self
            .tiers
            .iter()
            .map(|t| t.ceiling)
            .chain(std::iter::once(self.fallback_ceiling));
        for ceiling in ceilings {
            if !(ceiling >= 1.0 && ceiling <= self.absolute_ceiling) {
                return Err(ConfigError::InvalidValue {
                    field: "tiers",
                    reason: format!("ceiling {ceiling} must be within [1, absolute_ceiling]"),
                });
            }
        }
        if !(self.tau_bonus_coefficient.is_finite() && self.tau_bonus_coefficient >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "tau_bonus_coefficient",
                reason: "must be >= 0".to_string(),
            });
        }
        if self.step_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "step_timeout_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "backoff_max_ms",
                reason: "must be >= backoff_initial_ms".to_string(),
            });
        }
        if self.steps.len() > self.max_chain_steps {
            return Err(ConfigError::InvalidValue {
                field: "steps",
                reason: format!("at most {} steps allowed", self.max_chain_steps),
            });
        }
        for (i, step) in self.steps.iter().enumerate() {
            if !(step.max_multiplier.is_finite() && step.max_multiplier >= 1.0) {
                return Err(ConfigError::InvalidValue {
                    field: "steps",
                    reason: format!("{} max_multiplier must be >= 1", step.kind),
                });
            }
            if self.steps[..i].iter().any(|s| s.kind == step.kind) {
                return Err(ConfigError::InvalidValue {
                    field: "steps",
                    reason: format!("{} listed twice", step.kind),
                });
            }
        }
        Ok(())
    }
}
