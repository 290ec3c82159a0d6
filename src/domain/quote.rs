//! Provider quote type.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MarketId, ProviderId};

/// Outcome signal from one data provider for one market.
///
/// Ephemeral: only the latest quote per provider is kept, and only while it
/// is inside the staleness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderQuote {
    pub provider: ProviderId,
    pub market_id: MarketId,
    /// Observed probability per outcome.
    pub probabilities: Vec<f64>,
    /// Provider's self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
}

impl ProviderQuote {
    pub fn new(
        provider: impl Into<ProviderId>,
        market_id: impl Into<MarketId>,
        probabilities: Vec<f64>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider: provider.into(),
            market_id: market_id.into(),
            probabilities,
            confidence: 1.0,
            observed_at,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Observed within `window` of `now`. Quotes from the future count as
    /// fresh.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let age = now - self.observed_at;
        age.num_milliseconds() <= i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
    }

    /// Index of the highest probability; lowest index wins ties.
    #[must_use]
    pub fn leading_outcome(&self) -> Option<usize> {
        leading_index(&self.probabilities)
    }
}

/// Index of the largest finite value; lowest index wins ties.
#[must_use]
pub fn leading_index(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
