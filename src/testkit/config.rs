//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use crate::infrastructure::config::leverage::LeverageConfig;
use crate::infrastructure::config::provider::ProviderConfig;
use crate::infrastructure::config::settings::Config;

/// Leverage config with millisecond backoff and a short step timeout.
pub fn leverage() -> LeverageConfig {
    LeverageConfig {
        step_timeout_ms: 50,
        backoff_initial_ms: 1,
        backoff_max_ms: 2,
        ..LeverageConfig::default()
    }
}

/// Provider config with a short breaker cooldown.
pub fn providers() -> ProviderConfig {
    ProviderConfig {
        cooldown_ms: 250,
        ..ProviderConfig::default()
    }
}

/// Full engine config for markets lasting a few hundred milliseconds.
///
/// Markets may be as short as 50ms and proofs get a 300ms grace period.
pub fn engine() -> Config {
    let mut config = Config::default();
    config.market.min_duration_ms = 50;
    config.leverage = leverage();
    config.providers = providers();
    config.resolution.grace_period_ms = 300;
    config.engine.work_queue_capacity = 64;
    config
}
