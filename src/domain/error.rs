//! Domain validation errors for core domain types.
//!
//! This module defines errors that occur when domain invariants are violated.
//! These errors are returned by `try_new` constructors that validate inputs.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use flashsettle::domain::error::DomainError;
//! use flashsettle::domain::market::{MarketLimits, MarketSpec};
//!
//! // A single outcome is not a market
//! let spec = MarketSpec::new("m-1", vec!["Yes".into()], Duration::from_secs(30));
//! let result = spec.validate(&MarketLimits::default());
//!
//! assert!(matches!(result, Err(DomainError::TooFewOutcomes { count: 1 })));
//! ```

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Markets need at least two outcomes.
    #[error("market needs at least 2 outcomes, got {count}")]
    TooFewOutcomes {
        /// Number of outcomes supplied.
        count: usize,
    },

    /// Markets are capped at a configured number of outcomes.
    #[error("market allows at most {max} outcomes, got {count}")]
    TooManyOutcomes {
        /// Number of outcomes supplied.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Outcome labels must be non-empty and unique.
    #[error("invalid outcome label '{label}'")]
    InvalidOutcomeLabel {
        /// The offending label.
        label: String,
    },

    /// Duration outside the flash window.
    #[error("duration {duration_ms}ms outside [{min_ms}ms, {max_ms}ms]")]
    DurationOutOfRange {
        /// Requested duration in milliseconds.
        duration_ms: u128,
        /// Minimum allowed.
        min_ms: u64,
        /// Maximum allowed.
        max_ms: u64,
    },

    /// A market cannot be its own parent.
    #[error("market cannot reference itself as parent")]
    SelfParent,

    /// Probability vectors must sum to one.
    #[error("probabilities sum to {sum}, expected 1")]
    ProbabilitiesNotNormalized {
        /// The observed sum.
        sum: f64,
    },

    /// Stakes must be positive.
    #[error("stake must be positive, got {stake}")]
    NonPositiveStake {
        /// The invalid stake.
        stake: rust_decimal::Decimal,
    },
}
