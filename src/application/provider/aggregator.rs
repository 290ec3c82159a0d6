//! Provider aggregation with per-provider circuit breaking.
//!
//! Provider state lives in a [`ProviderBoard`] that is injected into the
//! aggregator. Each provider's slot is only mutated through its map entry,
//! which gives one writer per provider while other providers proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::breaker::{BreakerState, CircuitBreaker};
use crate::domain::id::{MarketId, ProviderId};
use crate::domain::quote::{leading_index, ProviderQuote};
use crate::error::{ExternalError, ProviderError};
use crate::infrastructure::config::provider::ProviderConfig;
use crate::port::outbound::feed::ProviderFeed;

/// Breaker plus latest quote per market for one provider.
#[derive(Debug, Clone)]
pub struct ProviderSlot {
    breaker: CircuitBreaker,
    quotes: HashMap<MarketId, ProviderQuote>,
}

impl ProviderSlot {
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// Breaker status of one provider, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub state: BreakerState,
    pub consecutive_failures: u32,
}

/// Shared provider state: one slot per provider.
#[derive(Debug, Default)]
pub struct ProviderBoard {
    slots: DashMap<ProviderId, ProviderSlot>,
}

impl ProviderBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker state of a provider, if known.
    #[must_use]
    pub fn breaker_state(&self, provider: &ProviderId) -> Option<BreakerState> {
        self.slots.get(provider).map(|slot| slot.breaker.state())
    }

    /// Breaker status of every provider, sorted by id.
    #[must_use]
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        let mut out: Vec<ProviderStatus> = self
            .slots
            .iter()
            .map(|entry| ProviderStatus {
                provider: entry.key().clone(),
                state: entry.breaker.state(),
                consecutive_failures: entry.breaker.consecutive_failures(),
            })
            .collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }
}

/// Consensus view of one market across active providers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub market_id: MarketId,
    /// Mean probability per outcome over active providers.
    pub probabilities: Vec<f64>,
    /// Largest max-minus-min across providers over all outcomes.
    pub spread: f64,
    pub active_count: usize,
    pub high_dispersion: bool,
    /// Outcome with the highest mean probability.
    pub leader: usize,
    /// Confidence-weighted share of providers whose own leading outcome is
    /// `leader`.
    pub agreement: f64,
}

impl Aggregate {
    /// Mean probability of the leading outcome.
    #[must_use]
    pub fn average_probability(&self) -> f64 {
        self.probabilities[self.leader]
    }
}

/// Aggregates provider quotes and isolates failing providers.
pub struct ProviderAggregator {
    config: ProviderConfig,
    board: Arc<ProviderBoard>,
    feeds: Vec<Arc<dyn ProviderFeed>>,
}

impl ProviderAggregator {
    /// Create an aggregator over `board` and register every feed.
    #[must_use]
    pub fn new(
        config: ProviderConfig,
        board: Arc<ProviderBoard>,
        feeds: Vec<Arc<dyn ProviderFeed>>,
    ) -> Self {
        let aggregator = Self {
            config,
            board,
            feeds,
        };
        for feed in &aggregator.feeds {
            aggregator.register(feed.provider().clone());
        }
        aggregator
    }

    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn board(&self) -> &Arc<ProviderBoard> {
        &self.board
    }

    /// Staleness window for a market of the given duration.
    #[must_use]
    pub fn staleness_window(&self, market_duration: Duration) -> Duration {
        self.config.staleness_window(market_duration)
    }

    /// Ensure a slot exists for `provider`.
    pub fn register(&self, provider: ProviderId) {
        self.board.slots.entry(provider).or_insert_with(|| ProviderSlot {
            breaker: CircuitBreaker::new(self.config.failure_threshold, self.config.cooldown()),
            quotes: HashMap::new(),
        });
    }

    /// Accept a pushed quote as the provider's latest for its market.
    ///
    /// A well-formed quote counts as a success for the provider's breaker;
    /// a malformed one counts as a failure and is dropped.
    ///
    /// # Errors
    ///
    /// [`ExternalError::Malformed`] when probabilities are empty, negative,
    /// non-finite or all zero.
    pub fn ingest(&self, mut quote: ProviderQuote) -> Result<(), ExternalError> {
        self.register(quote.provider.clone());
        let Some(mut slot) = self.board.slots.get_mut(&quote.provider) else {
            return Err(ExternalError::Unavailable(quote.provider.to_string()));
        };
        let provider = quote.provider.clone();
        let before = slot.breaker.state();

        let result = normalize(&mut quote.probabilities);
        match result {
            Ok(()) => {
                quote.confidence = quote.confidence.clamp(0.0, 1.0);
                if slot.breaker.allows_request() {
                    slot.breaker.record_success();
                }
                slot.quotes.insert(quote.market_id.clone(), quote);
            }
            Err(_) => slot.breaker.record_failure(),
        }
        let after = slot.breaker.state();
        let failures = slot.breaker.consecutive_failures();
        drop(slot);

        log_transition(&provider, before, after, failures);
        result
    }

    /// Record a failed interaction with `provider`.
    pub fn record_failure(&self, provider: &ProviderId) {
        self.register(provider.clone());
        let Some(mut slot) = self.board.slots.get_mut(provider) else {
            return;
        };
        let before = slot.breaker.state();
        slot.breaker.record_failure();
        let after = slot.breaker.state();
        let failures = slot.breaker.consecutive_failures();
        drop(slot);
        log_transition(provider, before, after, failures);
    }

    /// Fetch fresh quotes from every feed whose breaker allows a request.
    ///
    /// Fetches run concurrently, each bounded by `window`. Returns the
    /// number of providers that answered with a usable quote.
    pub async fn poll(
        &self,
        market_id: &MarketId,
        outcome_count: usize,
        window: Duration,
    ) -> usize {
        let allowed: Vec<&Arc<dyn ProviderFeed>> = self
            .feeds
            .iter()
            .filter(|feed| {
                self.board
                    .slots
                    .get_mut(feed.provider())
                    .map_or(true, |mut slot| slot.breaker.allows_request())
            })
            .collect();

        let fetches = allowed.iter().map(|feed| async move {
            let result = match timeout(window, feed.fetch(market_id, outcome_count)).await {
                Ok(result) => result,
                Err(_) => Err(ExternalError::Timeout {
                    after_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
                }),
            };
            (feed.provider().clone(), result)
        });

        let mut answered = 0;
        for (provider, result) in join_all(fetches).await {
            match result {
                Ok(quote) if quote.provider == provider && &quote.market_id == market_id => {
                    if self.ingest(quote).is_ok() {
                        answered += 1;
                    }
                }
                Ok(_) => {
                    warn!(
                        provider = %provider,
                        market_id = %market_id,
                        "Provider returned quote for wrong source or market"
                    );
                    self.record_failure(&provider);
                }
                Err(e) => {
                    debug!(
                        provider = %provider,
                        market_id = %market_id,
                        error = %e,
                        "Provider fetch failed"
                    );
                    self.record_failure(&provider);
                }
            }
        }
        answered
    }

    /// Aggregate the fresh quotes for `market_id`.
    ///
    /// A provider is active when its breaker is not open and its latest
    /// quote for the market is within `window` of `now` and covers
    /// `outcome_count` outcomes.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InsufficientQuorum`] when fewer than `quorum_min`
    /// providers are active; no average is computed in that case.
    pub fn aggregate(
        &self,
        market_id: &MarketId,
        outcome_count: usize,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Aggregate, ProviderError> {
        let quotes: Vec<ProviderQuote> = self
            .board
            .slots
            .iter()
            .filter(|slot| slot.breaker.is_available())
            .filter_map(|slot| slot.quotes.get(market_id).cloned())
            .filter(|q| q.probabilities.len() == outcome_count && q.is_fresh(now, window))
            .collect();

        let active = quotes.len();
        if active < self.config.quorum_min {
            warn!(
                market_id = %market_id,
                active,
                required = self.config.quorum_min,
                "Insufficient provider quorum"
            );
            return Err(ProviderError::InsufficientQuorum {
                active,
                required: self.config.quorum_min,
            });
        }

        let mut probabilities = vec![0.0; outcome_count];
        let mut spread: f64 = 0.0;
        for (i, mean) in probabilities.iter_mut().enumerate() {
            let (lo, hi, sum) = quotes.iter().map(|q| q.probabilities[i]).fold(
                (f64::INFINITY, f64::NEG_INFINITY, 0.0),
                |(lo, hi, sum), p| (lo.min(p), hi.max(p), sum + p),
            );
            *mean = sum / active as f64;
            spread = spread.max(hi - lo);
        }
        let leader = leading_index(&probabilities).unwrap_or(0);

        let total_weight: f64 = quotes.iter().map(|q| q.confidence).sum();
        let backing: f64 = quotes
            .iter()
            .filter(|q| q.leading_outcome() == Some(leader))
            .map(|q| q.confidence)
            .sum();
        let agreement = if total_weight > 0.0 {
            backing / total_weight
        } else {
            let count = quotes.iter().filter(|q| q.leading_outcome() == Some(leader)).count();
            count as f64 / active as f64
        };

        let high_dispersion = spread > self.config.spread_threshold;
        if high_dispersion {
            warn!(
                market_id = %market_id,
                spread,
                threshold = self.config.spread_threshold,
                "High provider dispersion"
            );
        }
        debug!(market_id = %market_id, active, leader, spread, agreement, "Providers aggregated");

        Ok(Aggregate {
            market_id: market_id.clone(),
            probabilities,
            spread,
            active_count: active,
            high_dispersion,
            leader,
            agreement,
        })
    }

    /// Drop every stored quote for `market_id`.
    pub fn forget(&self, market_id: &MarketId) {
        for mut slot in self.board.slots.iter_mut() {
            slot.quotes.remove(market_id);
        }
    }
}

/// Scale to sum one; rejects vectors that cannot be.
fn normalize(probabilities: &mut [f64]) -> Result<(), ExternalError> {
    if probabilities.is_empty() || probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(ExternalError::Malformed(
            "probabilities must be finite and non-negative".into(),
        ));
    }
    let sum: f64 = probabilities.iter().sum();
    if sum <= 0.0 {
        return Err(ExternalError::Malformed("probabilities sum to zero".into()));
    }
    for p in probabilities.iter_mut() {
        *p /= sum;
    }
    Ok(())
}

fn log_transition(provider: &ProviderId, before: BreakerState, after: BreakerState, failures: u32) {
    if before == after {
        return;
    }
    match after {
        BreakerState::Open => error!(
            provider = %provider,
            failures,
            "Circuit breaker tripped, provider isolated"
        ),
        BreakerState::HalfOpen => info!(provider = %provider, "Circuit breaker half-open"),
        BreakerState::Closed => info!(provider = %provider, "Circuit breaker closed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::feed::ScriptedFeed;

    fn config() -> ProviderConfig {
        crate::testkit::config::providers()
    }

    fn aggregator(feeds: Vec<Arc<dyn ProviderFeed>>) -> ProviderAggregator {
        ProviderAggregator::new(config(), Arc::new(ProviderBoard::new()), feeds)
    }

    fn quote(provider: &str, probabilities: Vec<f64>) -> ProviderQuote {
        ProviderQuote::new(provider, "m-1", probabilities, Utc::now())
    }

    const WINDOW: Duration = Duration::from_secs(5);

    #[test]
    fn averages_active_providers() {
        let agg = aggregator(vec![]);
        agg.ingest(quote("a", vec![0.60, 0.40])).unwrap();
        agg.ingest(quote("b", vec![0.62, 0.38])).unwrap();
        agg.ingest(quote("c", vec![0.64, 0.36])).unwrap();

        let result = agg.aggregate(&"m-1".into(), 2, WINDOW, Utc::now()).unwrap();
        assert_eq!(result.active_count, 3);
        assert_eq!(result.leader, 0);
        assert!((result.probabilities[0] - 0.62).abs() < 1e-9);
        assert!((result.spread - 0.04).abs() < 1e-9);
        assert!(!result.high_dispersion);
        assert!((result.agreement - 1.0).abs() < 1e-12);
    }

    #[test]
    fn two_of_five_is_insufficient() {
        let agg = aggregator(vec![]);
        for p in ["a", "b", "c", "d", "e"] {
            agg.register(p.into());
        }
        agg.ingest(quote("a", vec![0.7, 0.3])).unwrap();
        agg.ingest(quote("b", vec![0.7, 0.3])).unwrap();

        let err = agg.aggregate(&"m-1".into(), 2, WINDOW, Utc::now()).unwrap_err();
        assert_eq!(err, ProviderError::InsufficientQuorum { active: 2, required: 3 });
    }

    #[test]
    fn stale_and_open_providers_are_inactive() {
        let agg = aggregator(vec![]);
        let old = Utc::now() - chrono::Duration::seconds(30);
        agg.ingest(quote("a", vec![0.5, 0.5])).unwrap();
        agg.ingest(quote("b", vec![0.5, 0.5])).unwrap();
        agg.ingest(ProviderQuote::new("c", "m-1", vec![0.5, 0.5], old)).unwrap();
        agg.ingest(quote("d", vec![0.5, 0.5])).unwrap();
        for _ in 0..config().failure_threshold {
            agg.record_failure(&"d".into());
        }
        assert_eq!(agg.board().breaker_state(&"d".into()), Some(BreakerState::Open));

        let err = agg.aggregate(&"m-1".into(), 2, WINDOW, Utc::now()).unwrap_err();
        assert_eq!(err, ProviderError::InsufficientQuorum { active: 2, required: 3 });
    }

    #[test]
    fn wide_spread_is_flagged() {
        let agg = aggregator(vec![]);
        agg.ingest(quote("a", vec![0.55, 0.45])).unwrap();
        agg.ingest(quote("b", vec![0.70, 0.30])).unwrap();
        agg.ingest(quote("c", vec![0.60, 0.40])).unwrap();
        let result = agg.aggregate(&"m-1".into(), 2, WINDOW, Utc::now()).unwrap();
        assert!(result.high_dispersion);
        assert!((result.spread - 0.15).abs() < 1e-9);
    }

    #[test]
    fn agreement_is_confidence_weighted() {
        let agg = aggregator(vec![]);
        agg.ingest(quote("a", vec![0.9, 0.1]).with_confidence(1.0)).unwrap();
        agg.ingest(quote("b", vec![0.9, 0.1]).with_confidence(1.0)).unwrap();
        agg.ingest(quote("c", vec![0.4, 0.6]).with_confidence(2.0 / 3.0)).unwrap();
        agg.ingest(quote("d", vec![0.4, 0.6]).with_confidence(2.0 / 3.0)).unwrap();
        let result = agg.aggregate(&"m-1".into(), 2, WINDOW, Utc::now()).unwrap();
        assert_eq!(result.leader, 0);
        assert!((result.agreement - 0.6).abs() < 1e-9);
    }

    #[test]
    fn malformed_quote_counts_as_failure() {
        let agg = aggregator(vec![]);
        let err = agg.ingest(quote("a", vec![f64::NAN, 0.5])).unwrap_err();
        assert!(matches!(err, ExternalError::Malformed(_)));
        assert_eq!(agg.board().statuses()[0].consecutive_failures, 1);
    }

    #[tokio::test]
    async fn poll_skips_open_breakers_and_records_failures() {
        let good: Vec<Arc<ScriptedFeed>> = ["a", "b", "c"]
            .iter()
            .map(|p| Arc::new(ScriptedFeed::fixed(*p, vec![0.8, 0.2])))
            .collect();
        let bad = Arc::new(ScriptedFeed::failing("x"));
        let mut feeds: Vec<Arc<dyn ProviderFeed>> = good
            .iter()
            .map(|f| f.clone() as Arc<dyn ProviderFeed>)
            .collect();
        feeds.push(bad.clone());
        let agg = aggregator(feeds);
        let market: MarketId = "m-1".into();

        for _ in 0..config().failure_threshold {
            assert_eq!(agg.poll(&market, 2, WINDOW).await, 3);
        }
        assert_eq!(agg.board().breaker_state(&"x".into()), Some(BreakerState::Open));
        let calls = bad.call_count();

        agg.poll(&market, 2, WINDOW).await;
        assert_eq!(bad.call_count(), calls);

        let result = agg.aggregate(&market, 2, WINDOW, Utc::now()).unwrap();
        assert_eq!(result.active_count, 3);
    }

    #[tokio::test]
    async fn poll_times_out_slow_providers() {
        let slow = Arc::new(
            ScriptedFeed::fixed("slow", vec![0.5, 0.5]).with_delay(Duration::from_millis(200)),
        );
        let agg = aggregator(vec![slow as Arc<dyn ProviderFeed>]);
        let answered = agg.poll(&"m-1".into(), 2, Duration::from_millis(20)).await;
        assert_eq!(answered, 0);
        assert_eq!(agg.board().statuses()[0].consecutive_failures, 1);
    }
}
