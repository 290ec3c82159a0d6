//! Builders for domain primitives used across tests.

use std::time::Duration;

use crate::domain::market::MarketSpec;

/// Binary yes/no market lasting `duration_ms`.
pub fn binary_spec(id: &str, duration_ms: u64) -> MarketSpec {
    outcomes_spec(id, &["yes", "no"], duration_ms)
}

/// Market with the given outcome labels.
pub fn outcomes_spec(id: &str, labels: &[&str], duration_ms: u64) -> MarketSpec {
    MarketSpec::new(
        id,
        labels.iter().map(|l| (*l).to_string()).collect(),
        Duration::from_millis(duration_ms),
    )
}
