//! Leverage chain composition.
//!
//! A requested leverage is first bounded by the market's duration tier.
//! Chain steps then run in the configured priority order, each only when
//! the requested leverage is above its activation threshold. A failed step
//! is recorded and skipped. The tau efficiency bonus is applied once and
//! the result is clamped to the absolute ceiling.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::domain::id::{MarketId, RequestId};
use crate::domain::position::{ChainStepRecord, LeverageChain};
use crate::error::{ChainStepFailed, ExternalError, LeverageError};
use crate::infrastructure::config::leverage::{ChainStepConfig, LeverageConfig};
use crate::port::outbound::venue::{LeverageVenue, StepRequest};

/// Input to [`ChainComposer::compose`].
#[derive(Debug, Clone)]
pub struct ChainRequest {
    pub market_id: MarketId,
    pub request_id: RequestId,
    pub base_stake: Decimal,
    pub target_leverage: f64,
    pub market_duration: Duration,
    /// Tau at the time of composition.
    pub tau: f64,
}

/// Composes leverage chains against external venues.
#[derive(Debug, Clone)]
pub struct ChainComposer {
    config: LeverageConfig,
}

impl ChainComposer {
    #[must_use]
    pub const fn new(config: LeverageConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &LeverageConfig {
        &self.config
    }

    /// Base ceiling for a market of this duration.
    #[must_use]
    pub fn tier_ceiling(&self, duration: Duration) -> f64 {
        self.config.tier_ceiling(duration)
    }

    /// `1 + k' * tau`.
    #[must_use]
    pub fn tau_bonus(&self, tau: f64) -> f64 {
        1.0 + self.config.tau_bonus_coefficient * tau.max(0.0)
    }

    /// Check a requested leverage against the duration tier.
    ///
    /// # Errors
    ///
    /// [`LeverageError::BelowMinimum`] under 1x,
    /// [`LeverageError::LeverageCeilingExceeded`] above the tier ceiling.
    pub fn check_target(&self, requested: f64, duration: Duration) -> Result<f64, LeverageError> {
        if !requested.is_finite() || requested < 1.0 {
            return Err(LeverageError::BelowMinimum { requested });
        }
        let ceiling = self.tier_ceiling(duration);
        if requested > ceiling {
            return Err(LeverageError::LeverageCeilingExceeded { requested, ceiling });
        }
        Ok(ceiling)
    }

    /// Compose a chain for `request` using the available venues.
    ///
    /// Venues are matched to configured step kinds; a kind with no venue is
    /// not attempted.
    ///
    /// # Errors
    ///
    /// Fails before any venue is called if the target is out of tier or
    /// more venues are offered than the chain allows.
    pub async fn compose(
        &self,
        request: &ChainRequest,
        venues: &[Arc<dyn LeverageVenue>],
    ) -> Result<LeverageChain, LeverageError> {
        let ceiling = self.check_target(request.target_leverage, request.market_duration)?;
        if venues.len() > self.config.max_chain_steps {
            return Err(LeverageError::TooManyChainSteps {
                count: venues.len(),
                max: self.config.max_chain_steps,
            });
        }

        let mut records = Vec::new();
        let mut so_far = request.target_leverage;
        for step in &self.config.steps {
            if request.target_leverage <= step.activation_threshold {
                continue;
            }
            let Some(venue) = venues.iter().find(|v| v.kind() == step.kind) else {
                debug!(
                    market_id = %request.market_id,
                    step = %step.kind,
                    "No venue for chain step"
                );
                continue;
            };
            let record = self.run_step(venue.as_ref(), step, request, so_far).await;
            so_far *= record.multiplier();
            records.push(record);
        }

        let chain = LeverageChain::compose(
            request.target_leverage,
            ceiling,
            records,
            self.tau_bonus(request.tau),
            self.config.absolute_ceiling,
        );
        if chain.clamped() {
            warn!(
                market_id = %request.market_id,
                request_id = %request.request_id,
                uncapped = chain.uncapped(),
                ceiling = self.config.absolute_ceiling,
                "Composed leverage clamped to absolute ceiling"
            );
        }
        info!(
            market_id = %request.market_id,
            request_id = %request.request_id,
            requested = request.target_leverage,
            effective = chain.effective(),
            steps = chain.steps().len(),
            "Leverage chain composed"
        );
        Ok(chain)
    }

    /// Call one venue with the retry budget; never fails, records instead.
    async fn run_step(
        &self,
        venue: &dyn LeverageVenue,
        step: &ChainStepConfig,
        request: &ChainRequest,
        so_far: f64,
    ) -> ChainStepRecord {
        let call = StepRequest {
            market_id: request.market_id.clone(),
            request_id: request.request_id.clone(),
            kind: step.kind,
            base_stake: request.base_stake,
            leverage_so_far: so_far,
        };
        let max_attempts = 1 + self.config.retry_budget;
        let mut attempts = 0;
        let mut reason = String::new();

        while attempts < max_attempts {
            if attempts > 0 {
                sleep(self.config.backoff_delay(attempts)).await;
            }
            attempts += 1;

            let result = match timeout(self.config.step_timeout(), venue.multiplier(&call)).await {
                Ok(result) => result,
                Err(_) => Err(ExternalError::Timeout {
                    after_ms: self.config.step_timeout_ms,
                }),
            };
            match result {
                Ok(m) if m.is_finite() && m >= 1.0 => {
                    let capped = m > step.max_multiplier;
                    let multiplier = m.min(step.max_multiplier);
                    debug!(
                        market_id = %request.market_id,
                        step = %step.kind,
                        venue = venue.name(),
                        multiplier,
                        capped,
                        attempts,
                        "Chain step applied"
                    );
                    return ChainStepRecord::applied(
                        step.kind,
                        venue.name(),
                        attempts,
                        multiplier,
                        capped,
                    );
                }
                Ok(m) => {
                    // The venue answered; asking again would not change it.
                    reason = format!("invalid multiplier {m}");
                    break;
                }
                Err(e) => {
                    warn!(
                        market_id = %request.market_id,
                        step = %step.kind,
                        venue = venue.name(),
                        attempt = attempts,
                        error = %e,
                        "Chain step attempt failed"
                    );
                    reason = e.to_string();
                }
            }
        }

        let failure = ChainStepFailed {
            kind: step.kind,
            attempts,
            reason,
        };
        warn!(market_id = %request.market_id, error = %failure, "Chain step skipped");
        ChainStepRecord::failed(venue.name(), failure)
    }
}
