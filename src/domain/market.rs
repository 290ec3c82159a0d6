//! Market-related domain types.
//!
//! - [`MarketState`] - Lifecycle states, strictly forward
//! - [`MarketSpec`] - Creation request for a flash market
//! - [`MarketLimits`] - Bounds applied when a spec is validated
//! - [`Market`] - A live market with its probability vector and stakes

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::DomainError;
use super::id::MarketId;
use crate::error::MarketError;

/// Tolerance for probability vectors summing to one.
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Lifecycle state of a market.
///
/// Transitions only move forward; no state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    Created,
    Trading,
    Locked,
    AwaitingResolution,
    Resolved,
    Disputed,
    Archived,
}

impl MarketState {
    /// All states in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Trading,
        Self::Locked,
        Self::AwaitingResolution,
        Self::Resolved,
        Self::Disputed,
        Self::Archived,
    ];

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Trading)
                | (Self::Trading, Self::Locked)
                | (Self::Locked, Self::AwaitingResolution)
                | (Self::AwaitingResolution, Self::Resolved)
                | (Self::AwaitingResolution, Self::Disputed)
                | (Self::Resolved, Self::Archived)
                | (Self::Disputed, Self::Archived)
        )
    }

    /// Stable name used in logs and the status file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Trading => "trading",
            Self::Locked => "locked",
            Self::AwaitingResolution => "awaiting_resolution",
            Self::Resolved => "resolved",
            Self::Disputed => "disputed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds a [`MarketSpec`] must satisfy.
#[derive(Debug, Clone)]
pub struct MarketLimits {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub max_outcomes: usize,
}

impl Default for MarketLimits {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(5),
            max_duration: Duration::from_secs(4 * 60 * 60),
            max_outcomes: 10,
        }
    }
}

/// Request to open a flash market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSpec {
    pub id: MarketId,
    /// Back-reference only; the parent never owns its children.
    pub parent: Option<MarketId>,
    pub outcomes: Vec<String>,
    pub duration: Duration,
}

impl MarketSpec {
    pub fn new(id: impl Into<MarketId>, outcomes: Vec<String>, duration: Duration) -> Self {
        Self {
            id: id.into(),
            parent: None,
            outcomes,
            duration,
        }
    }

    /// Attach a parent market reference.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<MarketId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Check outcome count, labels, duration window and parent reference.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound as a [`DomainError`].
    pub fn validate(&self, limits: &MarketLimits) -> Result<(), DomainError> {
        let count = self.outcomes.len();
        if count < 2 {
            return Err(DomainError::TooFewOutcomes { count });
        }
        if count > limits.max_outcomes {
            return Err(DomainError::TooManyOutcomes {
                count,
                max: limits.max_outcomes,
            });
        }
        for (i, label) in self.outcomes.iter().enumerate() {
            if label.trim().is_empty() || self.outcomes[..i].contains(label) {
                return Err(DomainError::InvalidOutcomeLabel {
                    label: label.clone(),
                });
            }
        }
        if self.duration < limits.min_duration || self.duration > limits.max_duration {
            return Err(DomainError::DurationOutOfRange {
                duration_ms: self.duration.as_millis(),
                min_ms: duration_ms(limits.min_duration),
                max_ms: duration_ms(limits.max_duration),
            });
        }
        if self.parent.as_ref() == Some(&self.id) {
            return Err(DomainError::SelfParent);
        }
        Ok(())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A live flash market.
///
/// Probabilities change only through [`Market::record_fill`]; state only
/// through [`Market::transition`].
#[derive(Debug, Clone, Serialize)]
pub struct Market {
    id: MarketId,
    parent: Option<MarketId>,
    outcomes: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    duration: Duration,
    deadline: DateTime<Utc>,
    tau: f64,
    leverage_ceiling: f64,
    state: MarketState,
    probabilities: Vec<f64>,
    staked: Vec<Decimal>,
}

impl Market {
    /// Open a market from a spec, starting in [`MarketState::Created`].
    ///
    /// Probabilities start uniform. `tau` is recorded at open from the full
    /// duration.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if the spec violates `limits`.
    pub fn try_new(
        spec: MarketSpec,
        limits: &MarketLimits,
        created_at: DateTime<Utc>,
        tau_constant: f64,
        leverage_ceiling: f64,
    ) -> Result<Self, DomainError> {
        spec.validate(limits)?;
        let span = chrono::Duration::from_std(spec.duration).map_err(|_| {
            DomainError::DurationOutOfRange {
                duration_ms: spec.duration.as_millis(),
                min_ms: duration_ms(limits.min_duration),
                max_ms: duration_ms(limits.max_duration),
            }
        })?;
        let n = spec.outcomes.len();
        Ok(Self {
            tau: tau_constant * spec.duration.as_secs_f64() / 60.0,
            deadline: created_at + span,
            id: spec.id,
            parent: spec.parent,
            created_at,
            duration: spec.duration,
            leverage_ceiling,
            state: MarketState::Created,
            probabilities: vec![1.0 / n as f64; n],
            staked: vec![Decimal::ZERO; n],
            outcomes: spec.outcomes,
        })
    }

    #[must_use]
    pub const fn id(&self) -> &MarketId {
        &self.id
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&MarketId> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    #[must_use]
    pub fn outcome_count(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Instant at which trading locks.
    #[must_use]
    pub const fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Tau recorded at open.
    #[must_use]
    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Duration-tier leverage ceiling assigned at open.
    #[must_use]
    pub fn leverage_ceiling(&self) -> f64 {
        self.leverage_ceiling
    }

    #[must_use]
    pub const fn state(&self) -> MarketState {
        self.state
    }

    #[must_use]
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    #[must_use]
    pub fn staked(&self) -> &[Decimal] {
        &self.staked
    }

    /// Seconds until the deadline, never negative.
    #[must_use]
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> f64 {
        let ms = (self.deadline - now).num_milliseconds().max(0);
        ms as f64 / 1000.0
    }

    /// Tau at `now` for the given constant.
    #[must_use]
    pub fn tau_at(&self, now: DateTime<Utc>, tau_constant: f64) -> f64 {
        tau_constant * self.seconds_remaining(now) / 60.0
    }

    /// Same creation parameters as `spec`.
    #[must_use]
    pub fn matches_spec(&self, spec: &MarketSpec) -> bool {
        self.id == spec.id
            && self.parent == spec.parent
            && self.outcomes == spec.outcomes
            && self.duration == spec.duration
    }

    /// Move to `next` if it is a legal successor.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::InvalidTransition`] otherwise; the state is
    /// left unchanged.
    pub fn transition(&mut self, next: MarketState) -> Result<MarketState, MarketError> {
        if !self.state.can_transition_to(next) {
            return Err(MarketError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let previous = self.state;
        self.state = next;
        Ok(previous)
    }

    /// Apply a priced fill: replace the probability vector and add the stake.
    pub(crate) fn record_fill(
        &mut self,
        outcome_index: usize,
        probabilities: Vec<f64>,
        stake: Decimal,
    ) {
        debug_assert_eq!(probabilities.len(), self.probabilities.len());
        self.probabilities = probabilities;
        if let Some(total) = self.staked.get_mut(outcome_index) {
            *total += stake;
        }
    }

    /// Add stake without moving prices (quantum positions).
    pub(crate) fn record_stake(&mut self, outcome_index: usize, stake: Decimal) {
        if let Some(total) = self.staked.get_mut(outcome_index) {
            *total += stake;
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
