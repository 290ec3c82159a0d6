mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use flashsettle::application::leverage::{ChainComposer, ChainRequest};
use flashsettle::domain::position::{ChainStepKind, StepOutcome};
use flashsettle::error::{ExternalError, LeverageError};
use flashsettle::infrastructure::config::leverage::LeverageConfig;
use flashsettle::port::outbound::venue::LeverageVenue;
use flashsettle::testkit::config;
use flashsettle::testkit::venue::ScriptedVenue;

fn request(target: f64, secs: u64) -> ChainRequest {
    // tau as recorded at open: k * seconds / 60
    let tau = 1e-4 * secs as f64 / 60.0;
    ChainRequest {
        market_id: "flash-1".into(),
        request_id: "req-1".into(),
        base_stake: dec!(100),
        target_leverage: target,
        market_duration: Duration::from_secs(secs),
        tau,
    }
}

fn full_chain() -> (Arc<ScriptedVenue>, Arc<ScriptedVenue>, Arc<ScriptedVenue>) {
    (
        Arc::new(ScriptedVenue::always(ChainStepKind::Borrow, 1.5)),
        Arc::new(ScriptedVenue::always(ChainStepKind::LiquidationBonus, 1.2)),
        Arc::new(ScriptedVenue::always(ChainStepKind::StakeBoost, 1.1)),
    )
}

fn as_venues(venues: &[Arc<ScriptedVenue>]) -> Vec<Arc<dyn LeverageVenue>> {
    venues
        .iter()
        .map(|v| Arc::clone(v) as Arc<dyn LeverageVenue>)
        .collect()
}

#[tokio::test]
async fn max_leverage_on_thirty_second_market_clamps_to_ceiling() {
    let composer = ChainComposer::new(config::leverage());
    let (borrow, bonus, boost) = full_chain();
    let chain = composer
        .compose(&request(500.0, 30), &as_venues(&[borrow, bonus, boost]))
        .await
        .expect("compose");

    assert!((chain.tau_bonus() - 1.075).abs() < 1e-9);
    assert!(chain.uncapped() > 500.0);
    assert_eq!(chain.effective(), 500.0);
    assert!(chain.clamped());
    assert_eq!(chain.tier_ceiling(), 500.0);
    assert!(chain.steps().iter().all(|s| s.succeeded()));
}

#[tokio::test]
async fn request_above_tier_fails_before_any_venue_call() {
    let composer = ChainComposer::new(config::leverage());
    let (borrow, bonus, boost) = full_chain();
    let venues = as_venues(&[Arc::clone(&borrow), Arc::clone(&bonus), Arc::clone(&boost)]);

    let err = composer
        .compose(&request(300.0, 600), &venues)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LeverageError::LeverageCeilingExceeded {
            requested: 300.0,
            ceiling: 250.0
        }
    );
    assert_eq!(borrow.call_count() + bonus.call_count() + boost.call_count(), 0);
}

#[tokio::test]
async fn steps_below_activation_threshold_are_not_attempted() {
    let composer = ChainComposer::new(config::leverage());
    let (borrow, bonus, boost) = full_chain();
    let venues = as_venues(&[Arc::clone(&borrow), Arc::clone(&bonus), Arc::clone(&boost)]);

    let chain = composer.compose(&request(30.0, 30), &venues).await.expect("compose");

    assert_eq!(chain.steps().len(), 1);
    assert_eq!(chain.steps()[0].kind(), ChainStepKind::Borrow);
    assert!((chain.chained() - 45.0).abs() < 1e-9);
    assert_eq!(borrow.call_count(), 1);
    assert_eq!(bonus.call_count(), 0);
    assert_eq!(boost.call_count(), 0);
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let composer = ChainComposer::new(config::leverage());
    let borrow = Arc::new(
        ScriptedVenue::always(ChainStepKind::Borrow, 1.4)
            .with_results(vec![Err(ExternalError::Unavailable("lender".into()))]),
    );

    let chain = composer
        .compose(&request(25.0, 30), &as_venues(&[Arc::clone(&borrow)]))
        .await
        .expect("compose");

    let step = &chain.steps()[0];
    assert!(step.succeeded());
    assert_eq!(step.attempts(), 2);
    assert_eq!(step.multiplier(), 1.4);
    assert_eq!(borrow.call_count(), 2);
}

#[tokio::test]
async fn failed_step_is_recorded_and_chain_continues() {
    let composer = ChainComposer::new(config::leverage());
    let borrow = Arc::new(ScriptedVenue::new(ChainStepKind::Borrow));
    let bonus = Arc::new(ScriptedVenue::always(ChainStepKind::LiquidationBonus, 1.2));

    let chain = composer
        .compose(&request(60.0, 30), &as_venues(&[Arc::clone(&borrow), bonus]))
        .await
        .expect("compose");

    assert_eq!(chain.steps().len(), 2);
    let failed = &chain.steps()[0];
    assert!(!failed.succeeded());
    assert_eq!(failed.attempts(), 1 + LeverageConfig::default().retry_budget);
    assert!(matches!(failed.outcome(), StepOutcome::Failed(f) if f.kind == ChainStepKind::Borrow));
    assert!((chain.chained() - 72.0).abs() < 1e-9);
}

#[tokio::test]
async fn slow_venue_times_out() {
    let composer = ChainComposer::new(config::leverage());
    let borrow = Arc::new(
        ScriptedVenue::always(ChainStepKind::Borrow, 1.5).with_delay(Duration::from_millis(200)),
    );

    let chain = composer
        .compose(&request(25.0, 30), &as_venues(&[borrow]))
        .await
        .expect("compose");

    match chain.steps()[0].outcome() {
        StepOutcome::Failed(failure) => assert!(failure.reason.contains("timed out"), "{failure}"),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!((chain.chained() - 25.0).abs() < 1e-9);
}

#[tokio::test]
async fn venue_multiplier_is_capped_per_step() {
    let composer = ChainComposer::new(config::leverage());
    let borrow = Arc::new(ScriptedVenue::always(ChainStepKind::Borrow, 3.0));

    let chain = composer
        .compose(&request(40.0, 30), &as_venues(&[borrow]))
        .await
        .expect("compose");

    assert_eq!(
        chain.steps()[0].outcome(),
        &StepOutcome::Applied {
            multiplier: 1.5,
            capped: true
        }
    );
}

#[tokio::test]
async fn too_many_venues_are_refused() {
    let composer = ChainComposer::new(config::leverage());
    let venues: Vec<Arc<dyn LeverageVenue>> = (0..6)
        .map(|_| {
            let venue = ScriptedVenue::always(ChainStepKind::StakeBoost, 1.0);
            Arc::new(venue) as Arc<dyn LeverageVenue>
        })
        .collect();

    let err = composer.compose(&request(10.0, 30), &venues).await.unwrap_err();
    assert_eq!(err, LeverageError::TooManyChainSteps { count: 6, max: 5 });
}

#[tokio::test]
async fn leverage_below_one_is_rejected() {
    let composer = ChainComposer::new(config::leverage());
    let err = composer.compose(&request(0.5, 30), &[]).await.unwrap_err();
    assert_eq!(err, LeverageError::BelowMinimum { requested: 0.5 });
}
