//! Pricing curve configuration.

use serde::Deserialize;

use crate::error::ConfigError;

/// Parameters of the tau-scaled pricing curve.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// `k` in `tau = k * seconds_remaining / 60`.
    #[serde(default = "default_tau_constant")]
    pub tau_constant: f64,
    /// Curve depth per unit of tau (`L = liquidity_per_tau * tau`).
    #[serde(default = "default_liquidity_per_tau")]
    pub liquidity_per_tau: f64,
    /// Absolute residual the solver must reach.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,
    #[serde(default = "default_max_probability")]
    pub max_probability: f64,
    /// Largest probability move a single trade may cause.
    #[serde(default = "default_max_price_impact")]
    pub max_price_impact: f64,
}

const fn default_tau_constant() -> f64 {
    1e-4
}

const fn default_liquidity_per_tau() -> f64 {
    2e8
}

const fn default_tolerance() -> f64 {
    1e-9
}

const fn default_max_iterations() -> u32 {
    64
}

const fn default_min_probability() -> f64 {
    0.01
}

const fn default_max_probability() -> f64 {
    0.99
}

const fn default_max_price_impact() -> f64 {
    0.25
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tau_constant: default_tau_constant(),
            liquidity_per_tau: default_liquidity_per_tau(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            min_probability: default_min_probability(),
            max_probability: default_max_probability(),
            max_price_impact: default_max_price_impact(),
        }
    }
}

impl PricingConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("tau_constant", self.tau_constant),
            ("liquidity_per_tau", self.liquidity_per_tau),
            ("tolerance", self.tolerance),
            ("max_price_impact", self.max_price_impact),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a positive number".to_string(),
                });
            }
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_iterations",
                reason: "must be greater than 0".to_string(),
            });
        }
        if !(0.0 < self.min_probability
            && self.min_probability < 0.5
            && 0.5 < self.max_probability
            && self.max_probability < 1.0)
        {
            return Err(ConfigError::InvalidValue {
                field: "min_probability",
                reason: "must satisfy 0 < min < 0.5 < max < 1".to_string(),
            });
        }
        Ok(())
    }
}
