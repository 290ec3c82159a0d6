//! Position types.
//!
//! A [`Position`] is a directional stake on one outcome, optionally
//! leveraged through a [`LeverageChain`]. A [`QuantumPosition`] spreads its
//! stake across all outcomes and collapses to exactly one at resolution.
//! Both live inside a market as a [`Holding`].

use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::{MarketId, PositionId, StakerId};
use super::market::PROBABILITY_EPSILON;
use crate::error::ChainStepFailed;

/// External operation that can multiply a position's leverage.
///
/// Declaration order is the fixed priority order in which steps run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStepKind {
    Borrow,
    LiquidationBonus,
    StakeBoost,
}

impl ChainStepKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::LiquidationBonus => "liquidation_bonus",
            Self::StakeBoost => "stake_boost",
        }
    }
}

impl fmt::Display for ChainStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one chain step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied {
        multiplier: f64,
        /// The venue quoted more than the step allows.
        capped: bool,
    },
    Failed(ChainStepFailed),
}

/// One recorded chain step. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStepRecord {
    kind: ChainStepKind,
    source: String,
    attempts: u32,
    outcome: StepOutcome,
}

impl ChainStepRecord {
    pub fn applied(
        kind: ChainStepKind,
        source: impl Into<String>,
        attempts: u32,
        multiplier: f64,
        capped: bool,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            attempts,
            outcome: StepOutcome::Applied { multiplier, capped },
        }
    }

    pub fn failed(source: impl Into<String>, failure: ChainStepFailed) -> Self {
        Self {
            kind: failure.kind,
            source: source.into(),
            attempts: failure.attempts,
            outcome: StepOutcome::Failed(failure),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ChainStepKind {
        self.kind
    }

    /// Venue that served (or failed) the step.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn outcome(&self) -> &StepOutcome {
        &self.outcome
    }

    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.outcome, StepOutcome::Applied { .. })
    }

    /// Multiplier contributed to the chain; 1 for failed steps.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        match self.outcome {
            StepOutcome::Applied { multiplier, .. } => multiplier,
            StepOutcome::Failed(_) => 1.0,
        }
    }
}

/// Composed leverage for a position.
///
/// Built once by the chain composer; the step list cannot be modified
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeverageChain {
    requested: f64,
    tier_ceiling: f64,
    steps: Vec<ChainStepRecord>,
    tau_bonus: f64,
    uncapped: f64,
    effective: f64,
    clamped: bool,
}

impl LeverageChain {
    /// Compose `requested` with every recorded step and the tau bonus,
    /// then clamp to `absolute_ceiling`.
    #[must_use]
    pub fn compose(
        requested: f64,
        tier_ceiling: f64,
        steps: Vec<ChainStepRecord>,
        tau_bonus: f64,
        absolute_ceiling: f64,
    ) -> Self {
        let uncapped = steps
            .iter()
            .fold(requested, |acc, step| acc * step.multiplier())
            * tau_bonus;
        let clamped = uncapped > absolute_ceiling;
        Self {
            requested,
            tier_ceiling,
            steps,
            tau_bonus,
            uncapped,
            effective: uncapped.min(absolute_ceiling),
            clamped,
        }
    }

    /// Plain leverage with no chain and no bonus.
    #[must_use]
    pub fn flat(leverage: f64, tier_ceiling: f64) -> Self {
        Self::compose(leverage, tier_ceiling, Vec::new(), 1.0, tier_ceiling)
    }

    #[must_use]
    pub fn requested(&self) -> f64 {
        self.requested
    }

    #[must_use]
    pub fn tier_ceiling(&self) -> f64 {
        self.tier_ceiling
    }

    #[must_use]
    pub fn steps(&self) -> &[ChainStepRecord] {
        &self.steps
    }

    #[must_use]
    pub fn tau_bonus(&self) -> f64 {
        self.tau_bonus
    }

    /// Leverage after steps, before the tau bonus.
    #[must_use]
    pub fn chained(&self) -> f64 {
        self.steps
            .iter()
            .fold(self.requested, |acc, step| acc * step.multiplier())
    }

    /// Composed leverage before the final clamp.
    #[must_use]
    pub fn uncapped(&self) -> f64 {
        self.uncapped
    }

    #[must_use]
    pub fn effective(&self) -> f64 {
        self.effective
    }

    /// The final clamp reduced the composed leverage.
    #[must_use]
    pub const fn clamped(&self) -> bool {
        self.clamped
    }
}

/// Settlement state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Won,
    Lost,
    Voided,
}

impl SettlementStatus {
    /// Settle against a winning outcome, or void when there is none.
    fn against(own: usize, winner: Option<usize>) -> Self {
        match winner {
            Some(w) if w == own => Self::Won,
            Some(_) => Self::Lost,
            None => Self::Voided,
        }
    }
}

/// Directional stake on a single outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    id: PositionId,
    market_id: MarketId,
    staker: StakerId,
    outcome_index: usize,
    stake: Decimal,
    chain: LeverageChain,
    entry_probability: f64,
    fill_price: f64,
    shares: f64,
    entered_at: DateTime<Utc>,
    status: SettlementStatus,
}

/// Fill details a position is opened with.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub outcome_index: usize,
    pub probability: f64,
    pub fill_price: f64,
    pub shares: f64,
    pub at: DateTime<Utc>,
}

impl Position {
    /// Open a pending position.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NonPositiveStake`] if `stake <= 0`.
    pub fn try_new(
        market_id: MarketId,
        staker: StakerId,
        stake: Decimal,
        chain: LeverageChain,
        entry: Entry,
    ) -> Result<Self, DomainError> {
        if stake <= Decimal::ZERO {
            return Err(DomainError::NonPositiveStake { stake });
        }
        Ok(Self {
            id: PositionId::new(),
            market_id,
            staker,
            outcome_index: entry.outcome_index,
            stake,
            chain,
            entry_probability: entry.probability,
            fill_price: entry.fill_price,
            shares: entry.shares,
            entered_at: entry.at,
            status: SettlementStatus::Pending,
        })
    }

    #[must_use]
    pub const fn id(&self) -> &PositionId {
        &self.id
    }

    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    #[must_use]
    pub const fn staker(&self) -> &StakerId {
        &self.staker
    }

    #[must_use]
    pub const fn outcome_index(&self) -> usize {
        self.outcome_index
    }

    #[must_use]
    pub const fn stake(&self) -> Decimal {
        self.stake
    }

    #[must_use]
    pub const fn chain(&self) -> &LeverageChain {
        &self.chain
    }

    #[must_use]
    pub fn requested_leverage(&self) -> f64 {
        self.chain.requested()
    }

    #[must_use]
    pub fn effective_leverage(&self) -> f64 {
        self.chain.effective()
    }

    /// Implied probability of the outcome before the fill.
    #[must_use]
    pub fn entry_probability(&self) -> f64 {
        self.entry_probability
    }

    #[must_use]
    pub fn fill_price(&self) -> f64 {
        self.fill_price
    }

    #[must_use]
    pub fn shares(&self) -> f64 {
        self.shares
    }

    #[must_use]
    pub const fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    #[must_use]
    pub const fn status(&self) -> SettlementStatus {
        self.status
    }

    /// Settle once; later calls keep the first result.
    pub fn settle(&mut self, winner: Option<usize>) -> SettlementStatus {
        if self.status == SettlementStatus::Pending {
            self.status = SettlementStatus::against(self.outcome_index, winner);
        }
        self.status
    }
}

/// One branch of a quantum position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantumState {
    pub outcome_index: usize,
    pub amplitude: f64,
    pub probability: f64,
}

/// Stake spread over every outcome, collapsing to one at resolution.
#[derive(Debug, Clone, Serialize)]
pub struct QuantumPosition {
    id: PositionId,
    market_id: MarketId,
    staker: StakerId,
    stake: Decimal,
    leverage: f64,
    states: Vec<QuantumState>,
    opened_at: DateTime<Utc>,
    collapsed: Option<usize>,
    status: SettlementStatus,
}

impl QuantumPosition {
    /// Build states from a probability vector, amplitude `sqrt(p)`.
    ///
    /// # Errors
    ///
    /// Fails if the stake is not positive or the probabilities do not sum
    /// to one.
    pub fn try_new(
        market_id: MarketId,
        staker: StakerId,
        stake: Decimal,
        leverage: f64,
        probabilities: &[f64],
        opened_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if stake <= Decimal::ZERO {
            return Err(DomainError::NonPositiveStake { stake });
        }
        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_EPSILON * 1e3
            || probabilities.iter().any(|p| !p.is_finite() || *p < 0.0)
        {
            return Err(DomainError::ProbabilitiesNotNormalized { sum });
        }
        let states = probabilities
            .iter()
            .enumerate()
            .map(|(outcome_index, &probability)| QuantumState {
                outcome_index,
                amplitude: probability.sqrt(),
                probability,
            })
            .collect();
        Ok(Self {
            id: PositionId::new(),
            market_id,
            staker,
            stake,
            leverage,
            states,
            opened_at,
            collapsed: None,
            status: SettlementStatus::Pending,
        })
    }

    #[must_use]
    pub const fn id(&self) -> &PositionId {
        &self.id
    }

    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    #[must_use]
    pub const fn staker(&self) -> &StakerId {
        &self.staker
    }

    #[must_use]
    pub const fn stake(&self) -> Decimal {
        self.stake
    }

    #[must_use]
    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    #[must_use]
    pub fn states(&self) -> &[QuantumState] {
        &self.states
    }

    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Outcome chosen at collapse, if it has happened.
    #[must_use]
    pub const fn collapsed(&self) -> Option<usize> {
        self.collapsed
    }

    #[must_use]
    pub const fn status(&self) -> SettlementStatus {
        self.status
    }

    /// Collapse to one outcome by weighted selection over the state
    /// probabilities. The first collapse is irrevocable.
    ///
    /// The weights are the market probabilities captured when the position
    /// opened, not those at lock or resolution. Trades booked afterwards do
    /// not shift the odds of a position already held.
    pub fn collapse<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.collapsed.is_none() {
            let weights: Vec<f64> = self.states.iter().map(|s| s.probability).collect();
            self.collapsed =
                weighted_select(&weights, rng).map(|i| self.states[i].outcome_index);
        }
        self.collapsed
    }

    /// Settle once against the winning outcome. An uncollapsed position
    /// is voided.
    pub fn settle(&mut self, winner: Option<usize>) -> SettlementStatus {
        if self.status == SettlementStatus::Pending {
            self.status = match self.collapsed {
                Some(own) => SettlementStatus::against(own, winner),
                None => SettlementStatus::Voided,
            };
        }
        self.status
    }
}

/// Any position held by a market.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Holding {
    Directional(Position),
    Quantum(QuantumPosition),
}

impl Holding {
    #[must_use]
    pub const fn id(&self) -> &PositionId {
        match self {
            Self::Directional(p) => p.id(),
            Self::Quantum(q) => q.id(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> SettlementStatus {
        match self {
            Self::Directional(p) => p.status(),
            Self::Quantum(q) => q.status(),
        }
    }
}

/// Pick an index with probability proportional to its weight.
///
/// Returns `None` when the weights are empty, negative or all zero.
pub fn weighted_select<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let dist = WeightedIndex::new(weights).ok()?;
    Some(dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    use super::*;

    fn failed(kind: ChainStepKind) -> ChainStepRecord {
        ChainStepRecord::failed(
            "venue",
            ChainStepFailed {
                kind,
                attempts: 2,
                reason: "down".into(),
            },
        )
    }

    #[test]
    fn chain_multiplies_applied_steps_only() {
        let steps = vec![
            ChainStepRecord::applied(ChainStepKind::Borrow, "venue", 1, 1.5, false),
            failed(ChainStepKind::LiquidationBonus),
            ChainStepRecord::applied(ChainStepKind::StakeBoost, "venue", 1, 1.1, false),
        ];
        let chain = LeverageChain::compose(100.0, 100.0, steps, 1.0, 500.0);
        assert!((chain.effective() - 165.0).abs() < 1e-9);
        assert!(!chain.clamped());
        assert_eq!(chain.steps()[1].multiplier(), 1.0);
        assert!(!chain.steps()[1].succeeded());
    }

    #[test]
    fn chain_clamps_at_absolute_ceiling() {
        let steps = vec![ChainStepRecord::applied(ChainStepKind::Borrow, "v", 1, 1.5, false)];
        let chain = LeverageChain::compose(500.0, 500.0, steps, 1.075, 500.0);
        assert_eq!(chain.effective(), 500.0);
        assert!(chain.clamped());
        assert!(chain.uncapped() > 500.0);
    }

    #[test]
    fn position_settles_once() {
        let entry = Entry {
            outcome_index: 1,
            probability: 0.5,
            fill_price: 0.55,
            shares: 18.0,
            at: Utc::now(),
        };
        let mut p = Position::try_new(
            "m".into(),
            "alice".into(),
            dec!(10),
            LeverageChain::flat(1.0, 500.0),
            entry,
        )
        .unwrap();
        assert_eq!(p.settle(Some(1)), SettlementStatus::Won);
        assert_eq!(p.settle(None), SettlementStatus::Won);
    }

    #[test]
    fn position_rejects_zero_stake() {
        let entry = Entry {
            outcome_index: 0,
            probability: 0.5,
            fill_price: 0.5,
            shares: 0.0,
            at: Utc::now(),
        };
        let chain = LeverageChain::flat(1.0, 1.0);
        let err = Position::try_new("m".into(), "a".into(), dec!(0), chain, entry).unwrap_err();
        assert!(matches!(err, DomainError::NonPositiveStake { .. }));
    }

    fn quantum(leverage: f64, probabilities: &[f64]) -> Result<QuantumPosition, DomainError> {
        let now = Utc::now();
        QuantumPosition::try_new("m".into(), "a".into(), dec!(5), leverage, probabilities, now)
    }

    #[test]
    fn quantum_amplitudes_and_validation() {
        let q = quantum(10.0, &[0.25, 0.75]).unwrap();
        assert_eq!(q.states()[0].amplitude, 0.5);
        let err = quantum(10.0, &[0.3, 0.3]).unwrap_err();
        assert!(matches!(err, DomainError::ProbabilitiesNotNormalized { .. }));
    }

    #[test]
    fn collapse_is_irrevocable() {
        let mut q = quantum(1.0, &[0.2, 0.3, 0.5]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let first = q.collapse(&mut rng);
        assert!(first.is_some());
        for _ in 0..20 {
            assert_eq!(q.collapse(&mut rng), first);
        }
    }

    #[test]
    fn weighted_select_follows_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut hits = [0usize; 2];
        for _ in 0..10_000 {
            hits[weighted_select(&[0.9, 0.1], &mut rng).unwrap()] += 1;
        }
        assert!(hits[0] > 8_500 && hits[0] < 9_500);
        assert_eq!(weighted_select(&[0.0, 0.0], &mut rng), None);
        assert_eq!(weighted_select(&[1.0, 0.0], &mut rng), Some(0));
    }
}
