use std::sync::Arc;
use std::time::Duration;

use flashsettle::application::lifecycle::{Collaborators, MarketController};
use flashsettle::domain::id::MarketId;
use flashsettle::domain::market::MarketState;
use flashsettle::port::outbound::feed::ProviderFeed;
use flashsettle::port::outbound::verifier::ProofVerifier;
use flashsettle::testkit::config;
use flashsettle::testkit::feed::ScriptedFeed;

pub const COLLAPSE_SEED: u64 = 7;

/// Controller on the fast test config with a fixed collapse seed.
pub fn controller(
    verifier: Arc<dyn ProofVerifier>,
    feeds: Vec<Arc<dyn ProviderFeed>>,
) -> MarketController {
    MarketController::start(
        &config::engine(),
        Collaborators::new(verifier)
            .with_feeds(feeds)
            .with_collapse_seed(COLLAPSE_SEED),
    )
}

/// `count` feeds all answering `probabilities`.
pub fn agreeing_feeds(count: usize, probabilities: &[f64]) -> Vec<Arc<dyn ProviderFeed>> {
    (0..count)
        .map(|i| {
            let feed = ScriptedFeed::fixed(&format!("provider-{i}"), probabilities.to_vec());
            Arc::new(feed) as Arc<dyn ProviderFeed>
        })
        .collect()
}

/// Poll until the market reaches `state`, panicking after `limit`.
pub async fn wait_for_state(
    controller: &MarketController,
    market_id: &MarketId,
    state: MarketState,
    limit: Duration,
) {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if controller.state(market_id) == Some(state) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "market {market_id} stuck in {:?}, expected {state}",
            controller.state(market_id)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
