//! Scripted provider feed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::id::{MarketId, ProviderId};
use crate::domain::quote::ProviderQuote;
use crate::error::ExternalError;
use crate::port::outbound::feed::ProviderFeed;

/// A feed that answers every fetch with the same probabilities, or fails.
pub struct ScriptedFeed {
    provider: ProviderId,
    probabilities: Mutex<Option<Vec<f64>>>,
    confidence: f64,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedFeed {
    /// Feed answering `probabilities` for any market.
    pub fn fixed(provider: &str, probabilities: Vec<f64>) -> Self {
        Self {
            provider: provider.into(),
            probabilities: Mutex::new(Some(probabilities)),
            confidence: 1.0,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Feed whose every fetch fails.
    pub fn failing(provider: &str) -> Self {
        let feed = Self::fixed(provider, Vec::new());
        *feed.probabilities.lock() = None;
        feed
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Change the answer; `None` makes the feed fail.
    pub fn set(&self, probabilities: Option<Vec<f64>>) {
        *self.probabilities.lock() = probabilities;
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderFeed for ScriptedFeed {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    async fn fetch(
        &self,
        market_id: &MarketId,
        _outcome_count: usize,
    ) -> Result<ProviderQuote, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let probabilities = self.probabilities.lock().clone();
        match probabilities {
            Some(p) => Ok(
                ProviderQuote::new(self.provider.clone(), market_id.clone(), p, Utc::now())
                    .with_confidence(self.confidence),
            ),
            None => Err(ExternalError::Unavailable(self.provider.to_string())),
        }
    }
}
