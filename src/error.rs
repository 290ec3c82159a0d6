use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::id::{MarketId, RequestId};
use crate::domain::market::MarketState;
use crate::domain::position::ChainStepKind;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Pricing curve failures. A failed quote never mutates market state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("curve solver did not converge after {iterations} iterations (residual {residual:e})")]
    PricingDivergence { iterations: u32, residual: f64 },

    #[error("price impact {impact:.4} exceeds maximum {max:.4}")]
    ExcessiveSlippage { impact: f64, max: f64 },
}

/// Leverage request failures raised before any chain step runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeverageError {
    #[error("requested leverage {requested}x exceeds ceiling {ceiling}x")]
    LeverageCeilingExceeded { requested: f64, ceiling: f64 },

    #[error("leverage must be at least 1x, got {requested}")]
    BelowMinimum { requested: f64 },

    #[error("too many chain steps: {count} > {max}")]
    TooManyChainSteps { count: usize, max: usize },
}

/// A chain step that could not be applied.
///
/// Recorded on the position's chain; composition continues with the
/// remaining steps.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("chain step {kind} failed after {attempts} attempt(s): {reason}")]
pub struct ChainStepFailed {
    pub kind: ChainStepKind,
    pub attempts: u32,
    pub reason: String,
}

/// Provider aggregation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("insufficient quorum: {active} active provider(s), {required} required")]
    InsufficientQuorum { active: usize, required: usize },
}

/// Reasons the proof path was abandoned in favour of consensus.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("proof verification failed: {reason}")]
    ProofVerificationFailed { reason: String },

    #[error("no proof within deadline plus {grace_ms}ms grace")]
    ProofTimeout { grace_ms: u64 },
}

/// Market-scoped failures surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("market not found")]
    UnknownMarket,

    #[error("market already exists with different parameters")]
    DuplicateMarket,

    #[error("market is {state}, not accepting trades")]
    NotTrading { state: MarketState },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: MarketState, to: MarketState },

    #[error("market is {state}, not yet settled")]
    NotSettled { state: MarketState },

    #[error("trading closed at {deadline}")]
    TradingClosed { deadline: DateTime<Utc> },

    #[error("deadline {deadline} not reached")]
    DeadlineNotReached { deadline: DateTime<Utc> },

    #[error("outcome index {index} out of range for {count} outcomes")]
    InvalidOutcome { index: usize, count: usize },

    #[error("stake must be positive")]
    NonPositiveStake,

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Leverage(#[from] LeverageError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl MarketError {
    /// Attach the market identifier for caller-visible reporting.
    pub fn at(self, market_id: &MarketId) -> Error {
        Error::Market {
            market_id: market_id.clone(),
            source: self,
        }
    }

    /// Attach market and request identifiers for a rejected trade.
    pub fn on_request(self, market_id: &MarketId, request_id: &RequestId) -> Error {
        Error::Trade {
            market_id: market_id.clone(),
            request_id: request_id.clone(),
            source: self,
        }
    }
}

/// Errors reported by external collaborators behind the outbound ports.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExternalError {
    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("market {market_id}: {source}")]
    Market {
        market_id: MarketId,
        #[source]
        source: MarketError,
    },

    #[error("market {market_id}, request {request_id}: {source}")]
    Trade {
        market_id: MarketId,
        request_id: RequestId,
        #[source]
        source: MarketError,
    },

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("work queue full")]
    QueueFull,

    #[error("work queue closed")]
    QueueClosed,

    #[error("proof verifier setup failed: {0}")]
    Verifier(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The market-scoped cause, if this error carries one.
    #[must_use]
    pub fn market_error(&self) -> Option<&MarketError> {
        match self {
            Self::Market { source, .. } | Self::Trade { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
