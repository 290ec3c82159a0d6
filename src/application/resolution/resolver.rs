//! Proof-first market resolution with consensus fallback.
//!
//! ```text
//! AwaitingProof -> ProofReceived -> Verified -> Resolved
//! AwaitingProof -> ProofTimeout -> ConsensusFallback -> Resolved | Disputed
//! AwaitingProof -> ProofReceived -> ConsensusFallback -> Resolved | Disputed
//! ```
//!
//! Every call for a market after the first returns the stored record,
//! until [`ProofResolver::release`] drops the market's state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::application::provider::ProviderAggregator;
use crate::domain::id::MarketId;
use crate::domain::proof::{odds_bps, SettlementProof};
use crate::domain::resolution::{DisputeReason, Resolution, ResolutionPhase, ResolutionRecord};
use crate::error::{ExternalError, ProviderError, ResolutionError};
use crate::infrastructure::config::resolution::ResolutionConfig;
use crate::port::outbound::verifier::ProofVerifier;

/// What the resolver needs to know about a locked market.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub market_id: MarketId,
    pub outcome_count: usize,
    pub market_duration: Duration,
    /// Probabilities at lock, used to check the proof's declared odds.
    pub locked_probabilities: Vec<f64>,
}

/// Resolves markets from proofs, falling back to provider consensus.
pub struct ProofResolver {
    config: ResolutionConfig,
    verifier: Arc<dyn ProofVerifier>,
    aggregator: Arc<ProviderAggregator>,
    records: DashMap<MarketId, ResolutionRecord>,
    /// Per market, fingerprints of proofs that failed verification and why.
    rejected: DashMap<MarketId, HashMap<String, String>>,
}

impl ProofResolver {
    #[must_use]
    pub fn new(
        config: ResolutionConfig,
        verifier: Arc<dyn ProofVerifier>,
        aggregator: Arc<ProviderAggregator>,
    ) -> Self {
        Self {
            config,
            verifier,
            aggregator,
            records: DashMap::new(),
            rejected: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    #[must_use]
    pub fn aggregator(&self) -> &Arc<ProviderAggregator> {
        &self.aggregator
    }

    /// Stored record for a market, if resolved.
    #[must_use]
    pub fn record(&self, market_id: &MarketId) -> Option<ResolutionRecord> {
        self.records.get(market_id).map(|r| r.clone())
    }

    /// Whether a proof with this fingerprint was already rejected for the market.
    #[must_use]
    pub fn is_rejected(&self, market_id: &MarketId, fingerprint: &str) -> bool {
        self.rejected
            .get(market_id)
            .is_some_and(|fingerprints| fingerprints.contains_key(fingerprint))
    }

    /// Drop the stored record and rejected fingerprints of a settled market.
    pub fn release(&self, market_id: &MarketId) {
        self.records.remove(market_id);
        self.rejected.remove(market_id);
    }

    /// Resolve a market.
    ///
    /// A proof received after `deadline` plus the grace period is treated
    /// as missing. One received after `deadline` but within grace is
    /// accepted with the late penalty.
    pub async fn resolve(
        &self,
        ctx: &ResolutionContext,
        proof: Option<SettlementProof>,
        deadline: DateTime<Utc>,
    ) -> ResolutionRecord {
        if let Some(stored) = self.record(&ctx.market_id) {
            return stored;
        }

        let mut path = vec![ResolutionPhase::AwaitingProof];
        let grace = self.config.grace_period();
        let cutoff = deadline
            + chrono::Duration::milliseconds(i64::try_from(grace.as_millis()).unwrap_or(i64::MAX));

        let proof = proof.filter(|p| p.received_at <= cutoff);
        let fallback_cause = match proof {
            None => {
                warn!(
                    market_id = %ctx.market_id,
                    grace_ms = self.config.grace_period_ms,
                    "No proof within grace period"
                );
                path.push(ResolutionPhase::ProofTimeout);
                ResolutionError::ProofTimeout {
                    grace_ms: self.config.grace_period_ms,
                }
            }
            Some(proof) => {
                path.push(ResolutionPhase::ProofReceived);
                match self.verify(ctx, &proof, deadline).await {
                    Ok(()) => {
                        let late = proof.received_at > deadline;
                        let resolution = Resolution::Verified {
                            outcome_index: proof.inputs.outcome_index as usize,
                            proof_hash: proof.fingerprint(),
                            late,
                            penalty: if late { self.config.late_penalty } else { 0.0 },
                        };
                        info!(
                            market_id = %ctx.market_id,
                            outcome_index = proof.inputs.outcome_index,
                            late,
                            "Market resolved by verified proof"
                        );
                        path.push(ResolutionPhase::Verified);
                        path.push(ResolutionPhase::Resolved);
                        return self.store(ctx, resolution, path, None);
                    }
                    Err(cause) => {
                        warn!(
                            market_id = %ctx.market_id,
                            error = %cause,
                            "Proof rejected, falling back to consensus"
                        );
                        cause
                    }
                }
            }
        };

        path.push(ResolutionPhase::ConsensusFallback);
        let resolution = self.consensus(ctx).await;
        path.push(if resolution.is_disputed() {
            ResolutionPhase::Disputed
        } else {
            ResolutionPhase::Resolved
        });
        self.store(ctx, resolution, path, Some(fallback_cause))
    }

    async fn verify(
        &self,
        ctx: &ResolutionContext,
        proof: &SettlementProof,
        deadline: DateTime<Utc>,
    ) -> Result<(), ResolutionError> {
        let fingerprint = proof.fingerprint();
        let previous = self
            .rejected
            .get(&ctx.market_id)
            .and_then(|fingerprints| fingerprints.get(&fingerprint).cloned());
        if let Some(reason) = previous {
            return Err(ResolutionError::ProofVerificationFailed {
                reason: format!("previously rejected: {reason}"),
            });
        }

        let verdict = match check_inputs(ctx, proof, deadline) {
            Err(reason) => Err(reason),
            Ok(()) => {
                let verifier = Arc::clone(&self.verifier);
                let bytes = proof.bytes.clone();
                let inputs = proof.inputs;
                tokio::task::spawn_blocking(move || verifier.verify(&bytes, &inputs))
                    .await
                    .unwrap_or_else(|e| {
                        Err(ExternalError::Unavailable(format!("verifier task: {e}")))
                    })
                    .map_err(|e| e.to_string())
            }
        };

        verdict.map_err(|reason| {
            self.rejected
                .entry(ctx.market_id.clone())
                .or_default()
                .insert(fingerprint, reason.clone());
            ResolutionError::ProofVerificationFailed { reason }
        })
    }

    async fn consensus(&self, ctx: &ResolutionContext) -> Resolution {
        let window = self.aggregator.staleness_window(ctx.market_duration);
        self.aggregator.poll(&ctx.market_id, ctx.outcome_count, window).await;
        let provider_config = self.aggregator.config();

        let resolution = match self
            .aggregator
            .aggregate(&ctx.market_id, ctx.outcome_count, window, Utc::now())
        {
            Err(ProviderError::InsufficientQuorum { active, required }) => Resolution::Disputed {
                reason: DisputeReason::InsufficientQuorum { active, required },
            },
            Ok(agg) if agg.high_dispersion => Resolution::Disputed {
                reason: DisputeReason::HighDispersion {
                    spread: agg.spread,
                    threshold: provider_config.spread_threshold,
                },
            },
            Ok(agg) if agg.agreement < provider_config.consensus_threshold => Resolution::Disputed {
                reason: DisputeReason::NoMajority {
                    agreement: agg.agreement,
                    threshold: provider_config.consensus_threshold,
                },
            },
            Ok(agg) => Resolution::ConsensusResolved {
                outcome_index: agg.leader,
                probabilities: agg.probabilities,
                spread: agg.spread,
                active_count: agg.active_count,
                agreement: agg.agreement,
            },
        };

        match &resolution {
            Resolution::Disputed { reason } => {
                error!(
                    market_id = %ctx.market_id,
                    reason = %reason,
                    "Market disputed, stakes held for refund"
                );
            }
            Resolution::ConsensusResolved {
                outcome_index,
                active_count,
                ..
            } => info!(
                market_id = %ctx.market_id,
                outcome_index,
                active_count,
                "Market resolved by provider consensus"
            ),
            Resolution::Verified { .. } => {}
        }
        resolution
    }

    fn store(
        &self,
        ctx: &ResolutionContext,
        resolution: Resolution,
        path: Vec<ResolutionPhase>,
        fallback_cause: Option<ResolutionError>,
    ) -> ResolutionRecord {
        let record = ResolutionRecord {
            market_id: ctx.market_id.clone(),
            resolution,
            path,
            fallback_cause,
            resolved_at: Utc::now(),
        };
        self.records
            .entry(ctx.market_id.clone())
            .or_insert(record)
            .clone()
    }
}

/// Declared inputs must match the market being resolved.
fn check_inputs(
    ctx: &ResolutionContext,
    proof: &SettlementProof,
    deadline: DateTime<Utc>,
) -> Result<(), String> {
    let inputs = &proof.inputs;
    if proof.market_id != ctx.market_id || inputs.market_commitment != ctx.market_id.commitment() {
        return Err("proof is for a different market".into());
    }
    let index = inputs.outcome_index as usize;
    let Some(locked) = ctx
        .locked_probabilities
        .get(index)
        .filter(|_| index < ctx.outcome_count)
    else {
        return Err(format!(
            "outcome index {index} out of range for {} outcomes",
            ctx.outcome_count
        ));
    };
    if inputs.settled_at < deadline.timestamp() {
        return Err(format!(
            "settlement timestamp {} precedes deadline {}",
            inputs.settled_at,
            deadline.timestamp()
        ));
    }
    let expected = odds_bps(*locked);
    if inputs.odds_bps != expected {
        return Err(format!("declared odds {} bps, locked odds {expected} bps", inputs.odds_bps));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::provider::ProviderBoard;
    use crate::domain::quote::ProviderQuote;
    use crate::testkit::verifier::{stub_proof, StaticVerifier};

    const LOCKED: [f64; 2] = [0.7, 0.3];

    fn ctx() -> ResolutionContext {
        ResolutionContext {
            market_id: "m-1".into(),
            outcome_count: 2,
            market_duration: Duration::from_secs(10),
            locked_probabilities: LOCKED.to_vec(),
        }
    }

    fn resolver(verifier: Arc<StaticVerifier>) -> ProofResolver {
        let aggregator = ProviderAggregator::new(
            crate::testkit::config::providers(),
            Arc::new(ProviderBoard::new()),
            Vec::new(),
        );
        ProofResolver::new(ResolutionConfig::default(), verifier, Arc::new(aggregator))
    }

    fn seed_quotes(resolver: &ProofResolver, quotes: &[(&str, [f64; 2])]) {
        for (provider, probs) in quotes {
            resolver
                .aggregator()
                .ingest(ProviderQuote::new(*provider, "m-1", probs.to_vec(), Utc::now()))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn on_time_proof_verifies_without_penalty() {
        let verifier = Arc::new(StaticVerifier::accepting());
        let resolver = resolver(verifier.clone());
        let deadline = Utc::now();
        let proof = stub_proof(
            &"m-1".into(),
            0,
            LOCKED[0],
            deadline,
            deadline - chrono::Duration::seconds(1),
        );

        let record = resolver.resolve(&ctx(), Some(proof), deadline).await;
        assert!(matches!(
            record.resolution,
            Resolution::Verified { outcome_index: 0, late: false, penalty, .. } if penalty == 0.0
        ));
        assert_eq!(
            record.path,
            vec![
                ResolutionPhase::AwaitingProof,
                ResolutionPhase::ProofReceived,
                ResolutionPhase::Verified,
                ResolutionPhase::Resolved
            ]
        );
        assert_eq!(verifier.call_count(), 1);
    }

    #[tokio::test]
    async fn late_proof_within_grace_carries_penalty() {
        let resolver = resolver(Arc::new(StaticVerifier::accepting()));
        let deadline = Utc::now() - chrono::Duration::seconds(2);
        let proof = stub_proof(
            &"m-1".into(),
            1,
            LOCKED[1],
            deadline,
            deadline + chrono::Duration::seconds(2),
        );

        let record = resolver.resolve(&ctx(), Some(proof), deadline).await;
        assert!(matches!(record.resolution, Resolution::Verified { late: true, .. }));
        assert!((record.resolution.penalty() - 0.02).abs() < 1e-12);
    }

    #[tokio::test]
    async fn proof_after_grace_is_a_timeout() {
        let verifier = Arc::new(StaticVerifier::accepting());
        let resolver = resolver(verifier.clone());
        seed_quotes(&resolver, &[("a", [0.9, 0.1]), ("b", [0.9, 0.1]), ("c", [0.88, 0.12])]);
        let deadline = Utc::now() - chrono::Duration::seconds(10);
        let proof = stub_proof(
            &"m-1".into(),
            1,
            LOCKED[1],
            deadline,
            deadline + chrono::Duration::seconds(6),
        );

        let record = resolver.resolve(&ctx(), Some(proof), deadline).await;
        assert_eq!(verifier.call_count(), 0);
        assert_eq!(record.fallback_cause, Some(ResolutionError::ProofTimeout { grace_ms: 5_000 }));
        assert!(matches!(
            record.resolution,
            Resolution::ConsensusResolved { outcome_index: 0, .. }
        ));
        assert_eq!(record.path[1], ResolutionPhase::ProofTimeout);
    }

    #[tokio::test]
    async fn rejected_proof_falls_back_and_is_never_reverified() {
        let verifier = Arc::new(StaticVerifier::rejecting());
        let resolver = resolver(verifier.clone());
        seed_quotes(&resolver, &[("a", [0.2, 0.8]), ("b", [0.2, 0.8]), ("c", [0.22, 0.78])]);
        let deadline = Utc::now();
        let proof = stub_proof(&"m-1".into(), 0, LOCKED[0], deadline, deadline);

        let record = resolver.resolve(&ctx(), Some(proof.clone()), deadline).await;
        assert!(matches!(
            record.fallback_cause,
            Some(ResolutionError::ProofVerificationFailed { .. })
        ));
        assert_eq!(record.outcome(), crate::domain::resolution::SettledOutcome::Winner(1));
        assert!(resolver.is_rejected(&"m-1".into(), &proof.fingerprint()));

        let mut other = ctx();
        other.market_id = "m-2".into();
        let mut replay = proof;
        replay.market_id = "m-2".into();
        let again = resolver.resolve(&other, Some(replay), deadline).await;
        assert_eq!(verifier.call_count(), 1);
        assert!(matches!(again.resolution, Resolution::Disputed { .. }));
    }

    #[tokio::test]
    async fn release_drops_record_and_rejections() {
        let resolver = resolver(Arc::new(StaticVerifier::rejecting()));
        let deadline = Utc::now();
        let proof = stub_proof(&"m-1".into(), 0, LOCKED[0], deadline, deadline);

        resolver.resolve(&ctx(), Some(proof.clone()), deadline).await;
        assert!(resolver.record(&"m-1".into()).is_some());
        assert!(resolver.is_rejected(&"m-1".into(), &proof.fingerprint()));

        resolver.release(&"m-1".into());
        assert!(resolver.record(&"m-1".into()).is_none());
        assert!(!resolver.is_rejected(&"m-1".into(), &proof.fingerprint()));
    }

    #[tokio::test]
    async fn mismatched_odds_never_reach_the_verifier() {
        let verifier = Arc::new(StaticVerifier::accepting());
        let resolver = resolver(verifier.clone());
        let deadline = Utc::now();
        let proof = stub_proof(&"m-1".into(), 0, 0.55, deadline, deadline);

        let record = resolver.resolve(&ctx(), Some(proof), deadline).await;
        assert_eq!(verifier.call_count(), 0);
        assert!(record.resolution.is_disputed());
    }

    #[tokio::test]
    async fn two_of_five_providers_is_disputed() {
        let resolver = resolver(Arc::new(StaticVerifier::accepting()));
        for p in ["a", "b", "c", "d", "e"] {
            resolver.aggregator().register(p.into());
        }
        seed_quotes(&resolver, &[("a", [0.9, 0.1]), ("b", [0.9, 0.1])]);

        let record = resolver.resolve(&ctx(), None, Utc::now()).await;
        assert_eq!(
            record.resolution,
            Resolution::Disputed {
                reason: DisputeReason::InsufficientQuorum { active: 2, required: 3 }
            }
        );
        assert_eq!(record.terminal_phase(), Some(ResolutionPhase::Disputed));
    }

    #[tokio::test]
    async fn dispersed_or_split_consensus_is_disputed() {
        let resolver = resolver(Arc::new(StaticVerifier::accepting()));
        seed_quotes(&resolver, &[("a", [0.9, 0.1]), ("b", [0.7, 0.3]), ("c", [0.8, 0.2])]);
        let record = resolver.resolve(&ctx(), None, Utc::now()).await;
        assert!(matches!(
            record.resolution,
            Resolution::Disputed { reason: DisputeReason::HighDispersion { .. } }
        ));

        let mut split = ctx();
        split.market_id = "m-2".into();
        for (p, probs) in [
            ("a", [0.52, 0.48]),
            ("b", [0.52, 0.48]),
            ("c", [0.49, 0.51]),
            ("d", [0.49, 0.51]),
        ] {
            resolver
                .aggregator()
                .ingest(ProviderQuote::new(p, "m-2", probs.to_vec(), Utc::now()))
                .unwrap();
        }
        let record = resolver.resolve(&split, None, Utc::now()).await;
        assert!(matches!(
            record.resolution,
            Resolution::Disputed { reason: DisputeReason::NoMajority { .. } }
        ));
    }

    #[tokio::test]
    async fn second_resolve_returns_stored_record() {
        let verifier = Arc::new(StaticVerifier::accepting());
        let resolver = resolver(verifier.clone());
        let deadline = Utc::now();
        let proof = stub_proof(&"m-1".into(), 0, LOCKED[0], deadline, deadline);

        let first = resolver.resolve(&ctx(), Some(proof), deadline).await;
        let second = resolver.resolve(&ctx(), None, deadline).await;
        assert_eq!(first, second);
        assert_eq!(verifier.call_count(), 1);
    }
}
