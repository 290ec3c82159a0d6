mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use flashsettle::application::provider::{BreakerState, ProviderAggregator, ProviderBoard};
use flashsettle::domain::id::{MarketId, ProviderId};
use flashsettle::domain::quote::ProviderQuote;
use flashsettle::error::{ExternalError, ProviderError};
use flashsettle::port::outbound::feed::ProviderFeed;
use flashsettle::testkit::config;
use flashsettle::testkit::feed::ScriptedFeed;

const WINDOW: Duration = Duration::from_secs(5);

fn aggregator(feeds: &[Arc<ScriptedFeed>]) -> ProviderAggregator {
    ProviderAggregator::new(
        config::providers(),
        Arc::new(ProviderBoard::new()),
        feeds
            .iter()
            .map(|f| Arc::clone(f) as Arc<dyn ProviderFeed>)
            .collect(),
    )
}

fn fixed(count: usize, probabilities: &[f64]) -> Vec<Arc<ScriptedFeed>> {
    (0..count)
        .map(|i| Arc::new(ScriptedFeed::fixed(&format!("p{i}"), probabilities.to_vec())))
        .collect()
}

#[tokio::test]
async fn agreeing_providers_produce_consensus() {
    let feeds = fixed(5, &[0.8, 0.2]);
    let agg = aggregator(&feeds);
    let market: MarketId = "flash-1".into();

    assert_eq!(agg.poll(&market, 2, WINDOW).await, 5);
    let aggregate = agg.aggregate(&market, 2, WINDOW, Utc::now()).expect("quorum");

    assert_eq!(aggregate.active_count, 5);
    assert_eq!(aggregate.leader, 0);
    assert!((aggregate.average_probability() - 0.8).abs() < 1e-12);
    assert!(aggregate.spread.abs() < 1e-12);
    assert!(!aggregate.high_dispersion);
    assert!((aggregate.agreement - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn failing_providers_reduce_quorum() {
    let mut feeds = fixed(3, &[0.3, 0.7]);
    feeds.push(Arc::new(ScriptedFeed::failing("down-1")));
    feeds.push(Arc::new(ScriptedFeed::failing("down-2")));
    let agg = aggregator(&feeds);
    let market: MarketId = "flash-2".into();

    assert_eq!(agg.poll(&market, 2, WINDOW).await, 3);
    let aggregate = agg.aggregate(&market, 2, WINDOW, Utc::now()).expect("quorum");
    assert_eq!(aggregate.active_count, 3);
    assert_eq!(aggregate.leader, 1);
}

#[tokio::test]
async fn two_of_five_is_insufficient_quorum() {
    let mut feeds = fixed(2, &[0.6, 0.4]);
    for i in 0..3 {
        feeds.push(Arc::new(ScriptedFeed::failing(&format!("down-{i}"))));
    }
    let agg = aggregator(&feeds);
    let market: MarketId = "flash-3".into();

    agg.poll(&market, 2, WINDOW).await;
    let err = agg.aggregate(&market, 2, WINDOW, Utc::now()).unwrap_err();
    assert_eq!(
        err,
        ProviderError::InsufficientQuorum {
            active: 2,
            required: 3
        }
    );
}

#[tokio::test]
async fn wide_spread_is_flagged() {
    let feeds = vec![
        Arc::new(ScriptedFeed::fixed("a", vec![0.60, 0.40])),
        Arc::new(ScriptedFeed::fixed("b", vec![0.65, 0.35])),
        Arc::new(ScriptedFeed::fixed("c", vec![0.70, 0.30])),
    ];
    let agg = aggregator(&feeds);
    let market: MarketId = "flash-4".into();

    agg.poll(&market, 2, WINDOW).await;
    let aggregate = agg.aggregate(&market, 2, WINDOW, Utc::now()).expect("quorum");
    assert!(aggregate.high_dispersion);
    assert!((aggregate.spread - 0.10).abs() < 1e-9);
}

#[tokio::test]
async fn breaker_isolates_provider_and_recovers_after_cooldown() {
    let flaky = Arc::new(ScriptedFeed::failing("flaky"));
    let agg = aggregator(&[Arc::clone(&flaky)]);
    let market: MarketId = "flash-5".into();
    let provider: ProviderId = "flaky".into();
    let threshold = config::providers().failure_threshold;

    for _ in 0..threshold {
        agg.poll(&market, 2, WINDOW).await;
    }
    assert_eq!(agg.board().breaker_state(&provider), Some(BreakerState::Open));

    // Open breaker: no request reaches the provider.
    agg.poll(&market, 2, WINDOW).await;
    assert_eq!(flaky.call_count(), threshold);

    flaky.set(Some(vec![0.5, 0.5]));
    tokio::time::sleep(config::providers().cooldown() + Duration::from_millis(50)).await;
    assert_eq!(agg.poll(&market, 2, WINDOW).await, 1);
    assert_eq!(agg.board().breaker_state(&provider), Some(BreakerState::Closed));
    assert_eq!(flaky.call_count(), threshold + 1);
}

#[tokio::test]
async fn half_open_failure_reopens_breaker() {
    let flaky = Arc::new(ScriptedFeed::failing("flaky"));
    let agg = aggregator(&[Arc::clone(&flaky)]);
    let market: MarketId = "flash-6".into();
    let provider: ProviderId = "flaky".into();

    for _ in 0..config::providers().failure_threshold {
        agg.poll(&market, 2, WINDOW).await;
    }
    tokio::time::sleep(config::providers().cooldown() + Duration::from_millis(50)).await;
    agg.poll(&market, 2, WINDOW).await;
    assert_eq!(agg.board().breaker_state(&provider), Some(BreakerState::Open));
}

#[tokio::test]
async fn slow_provider_counts_as_failure() {
    let slow = Arc::new(
        ScriptedFeed::fixed("slow", vec![0.5, 0.5]).with_delay(Duration::from_millis(200)),
    );
    let agg = aggregator(&[Arc::clone(&slow)]);
    let market: MarketId = "flash-7".into();

    assert_eq!(agg.poll(&market, 2, Duration::from_millis(20)).await, 0);
    let status = &agg.board().statuses()[0];
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.state, BreakerState::Closed);
}

#[test]
fn stale_quotes_are_not_active() {
    let agg = aggregator(&[]);
    let market: MarketId = "flash-8".into();
    let now = Utc::now();
    for i in 0..3 {
        agg.ingest(ProviderQuote::new(
            format!("stale-{i}").as_str(),
            market.clone(),
            vec![0.5, 0.5],
            now - chrono::Duration::seconds(30),
        ))
        .expect("well-formed");
    }

    let err = agg.aggregate(&market, 2, WINDOW, now).unwrap_err();
    assert_eq!(
        err,
        ProviderError::InsufficientQuorum {
            active: 0,
            required: 3
        }
    );
}

#[test]
fn pushed_quotes_are_normalized_and_malformed_ones_dropped() {
    let agg = aggregator(&[]);
    let market: MarketId = "flash-9".into();
    let now = Utc::now();
    for provider in ["a", "b", "c"] {
        agg.ingest(ProviderQuote::new(provider, market.clone(), vec![3.0, 1.0], now))
            .expect("well-formed");
    }
    let err = agg
        .ingest(ProviderQuote::new("d", market.clone(), vec![-1.0, 2.0], now))
        .unwrap_err();
    assert!(matches!(err, ExternalError::Malformed(_)));

    let aggregate = agg.aggregate(&market, 2, WINDOW, now).expect("quorum");
    assert_eq!(aggregate.active_count, 3);
    assert!((aggregate.probabilities[0] - 0.75).abs() < 1e-12);

    let d = agg
        .board()
        .statuses()
        .into_iter()
        .find(|s| s.provider.as_str() == "d")
        .expect("registered");
    assert_eq!(d.consecutive_failures, 1);
}

#[test]
fn quotes_with_wrong_outcome_count_are_ignored() {
    let agg = aggregator(&[]);
    let market: MarketId = "flash-10".into();
    let now = Utc::now();
    for provider in ["a", "b", "c"] {
        agg.ingest(ProviderQuote::new(provider, market.clone(), vec![0.2, 0.3, 0.5], now))
            .expect("well-formed");
    }
    assert!(agg.aggregate(&market, 2, WINDOW, now).is_err());
    assert!(agg.aggregate(&market, 3, WINDOW, now).is_ok());
}
