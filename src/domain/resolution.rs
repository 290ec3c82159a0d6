//! Resolution outcomes.
//!
//! A market resolves through either a verified proof or provider consensus,
//! and ends with exactly one [`Resolution`]. Anything that would require
//! guessing is [`Resolution::Disputed`].

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::id::MarketId;
use super::market::Market;
use super::position::{Position, QuantumPosition};
use crate::error::ResolutionError;

/// Phases a resolution passes through, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    AwaitingProof,
    ProofReceived,
    Verified,
    ProofTimeout,
    ConsensusFallback,
    Resolved,
    Disputed,
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingProof => "awaiting_proof",
            Self::ProofReceived => "proof_received",
            Self::Verified => "verified",
            Self::ProofTimeout => "proof_timeout",
            Self::ConsensusFallback => "consensus_fallback",
            Self::Resolved => "resolved",
            Self::Disputed => "disputed",
        };
        f.write_str(s)
    }
}

/// Why no safe outcome could be determined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisputeReason {
    InsufficientQuorum { active: usize, required: usize },
    HighDispersion { spread: f64, threshold: f64 },
    NoMajority { agreement: f64, threshold: f64 },
}

impl fmt::Display for DisputeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientQuorum { active, required } => {
                write!(f, "insufficient quorum ({active}/{required})")
            }
            Self::HighDispersion { spread, threshold } => {
                write!(f, "spread {spread:.4} above {threshold:.4}")
            }
            Self::NoMajority {
                agreement,
                threshold,
            } => write!(f, "agreement {agreement:.2} below {threshold:.2}"),
        }
    }
}

/// Terminal result of resolving a market.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Settled by a verified proof.
    Verified {
        outcome_index: usize,
        proof_hash: String,
        late: bool,
        /// Fraction withheld from payouts; zero for on-time proofs.
        penalty: f64,
    },
    /// Settled by provider consensus.
    ConsensusResolved {
        outcome_index: usize,
        probabilities: Vec<f64>,
        spread: f64,
        active_count: usize,
        agreement: f64,
    },
    /// No safe resolution; stakes are refunded.
    Disputed { reason: DisputeReason },
}

impl Resolution {
    #[must_use]
    pub const fn winning_outcome(&self) -> Option<usize> {
        match self {
            Self::Verified { outcome_index, .. }
            | Self::ConsensusResolved { outcome_index, .. } => Some(*outcome_index),
            Self::Disputed { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_disputed(&self) -> bool {
        matches!(self, Self::Disputed { .. })
    }

    #[must_use]
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Verified { penalty, .. } => *penalty,
            _ => 0.0,
        }
    }

    #[must_use]
    pub const fn outcome(&self) -> SettledOutcome {
        match self.winning_outcome() {
            Some(i) => SettledOutcome::Winner(i),
            None => SettledOutcome::Voided,
        }
    }
}

/// What the payout layer sees: a winner or a void.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettledOutcome {
    Winner(usize),
    Voided,
}

/// Stored result of one market's resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionRecord {
    pub market_id: MarketId,
    pub resolution: Resolution,
    /// Phases visited, in order.
    pub path: Vec<ResolutionPhase>,
    /// Why the proof path was abandoned, when it was.
    pub fallback_cause: Option<ResolutionError>,
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionRecord {
    #[must_use]
    pub const fn outcome(&self) -> SettledOutcome {
        self.resolution.outcome()
    }

    /// Final phase on the path.
    #[must_use]
    pub fn terminal_phase(&self) -> Option<ResolutionPhase> {
        self.path.last().copied()
    }
}

/// Everything the payout layer needs after a market is archived.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementRecord {
    pub market: Market,
    pub resolution: ResolutionRecord,
    pub positions: Vec<Position>,
    pub quantum_positions: Vec<QuantumPosition>,
    /// Share of winnings paid out; zero marks a refund of stakes.
    pub payout_factor: Decimal,
    pub archived_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disputed_has_no_winner() {
        let r = Resolution::Disputed {
            reason: DisputeReason::InsufficientQuorum {
                active: 2,
                required: 3,
            },
        };
        assert_eq!(r.outcome(), SettledOutcome::Voided);
        assert!(r.is_disputed());
        assert_eq!(r.penalty(), 0.0);
    }

    #[test]
    fn late_verified_carries_penalty() {
        let r = Resolution::Verified {
            outcome_index: 1,
            proof_hash: "ab".into(),
            late: true,
            penalty: 0.02,
        };
        assert_eq!(r.outcome(), SettledOutcome::Winner(1));
        assert_eq!(r.penalty(), 0.02);
    }
}
