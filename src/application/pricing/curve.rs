//! Tau-scaled pricing curve.
//!
//! Each outcome is priced on a Gaussian-score curve whose depth shrinks
//! with remaining time: `L = liquidity_per_tau * tau`, with
//! `tau = k * seconds_remaining / 60`. With `z = Φ⁻¹(p)`, buying with amount
//! `A` moves the score by the `d > 0` solving
//!
//! ```text
//! ∫ Φ(x) dx over [z, z + d] = A / L
//! ```
//!
//! which has no closed form and is solved by Newton-Raphson. The fill price
//! is the pre-trade probability plus the mean rise of Φ over `[z, z + d]`,
//! so it always exceeds the pre-trade probability and stays below the
//! post-trade one. Other outcomes are rescaled to absorb the move.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::normal;
use super::solver::{NewtonSolver, Root};
use crate::domain::market::{Market, MarketState};
use crate::error::{MarketError, PricingError};
use crate::infrastructure::config::pricing::PricingConfig;

/// Liquidity never thins below one second remaining.
const MIN_SECONDS_REMAINING: f64 = 1.0;

/// Result of pricing a trade. Applying it is the caller's decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeQuote {
    pub outcome_index: usize,
    /// Probability of the traded outcome before the trade.
    pub entry_probability: f64,
    /// Post-trade probability vector.
    pub probabilities: Vec<f64>,
    /// Average price paid per share.
    pub fill_price: f64,
    pub shares: f64,
    /// Unclamped probability move of the traded outcome.
    pub price_impact: f64,
    pub tau: f64,
    pub iterations: u32,
}

/// Prices trades against a market's current probability vector.
#[derive(Debug, Clone)]
pub struct PricingCurve {
    config: PricingConfig,
    solver: NewtonSolver,
}

impl PricingCurve {
    #[must_use]
    pub fn new(config: PricingConfig) -> Self {
        let solver = NewtonSolver::new(config.tolerance, config.max_iterations);
        Self { config, solver }
    }

    #[must_use]
    pub const fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// `tau = k * seconds_remaining / 60`.
    #[must_use]
    pub fn tau(&self, seconds_remaining: f64) -> f64 {
        self.config.tau_constant * seconds_remaining / 60.0
    }

    /// Curve depth for a given tau.
    #[must_use]
    pub fn depth(&self, tau: f64) -> f64 {
        self.config.liquidity_per_tau * tau
    }

    /// Price buying `amount` of outcome `outcome_index` at `now`.
    ///
    /// Pure: the market is not modified.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NotTrading`] outside the trading window
    /// - [`MarketError::InvalidOutcome`] / [`MarketError::NonPositiveStake`]
    ///   for bad inputs
    /// - [`PricingError::ExcessiveSlippage`] when the move exceeds the
    ///   configured maximum
    /// - [`PricingError::PricingDivergence`] when the solver fails
    pub fn quote(
        &self,
        market: &Market,
        outcome_index: usize,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<TradeQuote, MarketError> {
        if market.state() != MarketState::Trading {
            return Err(MarketError::NotTrading {
                state: market.state(),
            });
        }
        let count = market.outcome_count();
        if outcome_index >= count {
            return Err(MarketError::InvalidOutcome {
                index: outcome_index,
                count,
            });
        }
        let amount = amount
            .to_f64()
            .filter(|a| a.is_finite() && *a > 0.0)
            .ok_or(MarketError::NonPositiveStake)?;

        let tau = self.tau(market.seconds_remaining(now).max(MIN_SECONDS_REMAINING));
        let depth = self.depth(tau);
        let current = market.probabilities();
        let entry = current[outcome_index];

        let z = self.score(entry)?;
        let base = normal::cdf(z.value);
        let increment = amount / depth;
        let moved = self.solver.solve_scaled(
            increment / base.max(f64::EPSILON),
            increment,
            |d| d * (base + normal::mean_lift(z.value, d)) - increment,
            |d| normal::cdf(z.value + d),
        )?;
        let dz = moved.value;
        if !dz.is_finite() || dz <= 0.0 {
            return Err(PricingError::PricingDivergence {
                iterations: z.iterations + moved.iterations,
                residual: dz,
            }
            .into());
        }

        let fill_price = entry + normal::mean_lift(z.value, dz).max(f64::EPSILON);
        let shares = amount / fill_price;
        let price_impact = normal::cdf(z.value + dz) - base;
        let raw = entry + price_impact;
        if price_impact > self.config.max_price_impact {
            return Err(PricingError::ExcessiveSlippage {
                impact: price_impact,
                max: self.config.max_price_impact,
            }
            .into());
        }

        let probabilities = self.redistribute(current, outcome_index, raw);
        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > self.config.tolerance {
            return Err(PricingError::PricingDivergence {
                iterations: z.iterations + moved.iterations,
                residual: sum - 1.0,
            }
            .into());
        }

        debug!(
            market_id = %market.id(),
            outcome = outcome_index,
            entry,
            new = probabilities[outcome_index],
            fill_price,
            tau,
            "Trade priced"
        );

        Ok(TradeQuote {
            outcome_index,
            entry_probability: entry,
            probabilities,
            fill_price,
            shares,
            price_impact,
            tau,
            iterations: z.iterations + moved.iterations,
        })
    }

    /// `Φ⁻¹(p)` by Newton on `Φ(z) - p`.
    fn score(&self, p: f64) -> Result<Root, PricingError> {
        self.solver.solve(0.0, |z| normal::cdf(z) - p, normal::pdf)
    }

    /// New vector with the traded outcome moved toward `raw`, clamped to
    /// the probability band and never below its old value. Other outcomes
    /// are scaled to absorb the difference and floored at the band minimum;
    /// the traded outcome takes the exact remainder.
    fn redistribute(&self, current: &[f64], index: usize, raw: f64) -> Vec<f64> {
        let min = self.config.min_probability;
        let old = current[index];
        let target = raw.clamp(min, self.config.max_probability).max(old);
        let scale = (1.0 - target) / (1.0 - old);

        let mut next: Vec<f64> = current
            .iter()
            .enumerate()
            .map(|(i, &q)| if i == index { 0.0 } else { (q * scale).max(min) })
            .collect();
        let others: f64 = next.iter().sum();
        next[index] = 1.0 - others;
        next
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::market::{MarketLimits, MarketSpec};

    fn trading_market(outcomes: usize, secs: u64, probabilities: Option<Vec<f64>>) -> Market {
        let labels = (0..outcomes).map(|i| format!("o{i}")).collect();
        let mut market = Market::try_new(
            MarketSpec::new("m-1", labels, Duration::from_secs(secs)),
            &MarketLimits::default(),
            Utc::now(),
            1e-4,
            500.0,
        )
        .unwrap();
        market.transition(MarketState::Trading).unwrap();
        if let Some(p) = probabilities {
            market.record_fill(0, p, Decimal::ZERO);
        }
        market
    }

    fn curve() -> PricingCurve {
        PricingCurve::new(PricingConfig::default())
    }

    #[test]
    fn thirty_second_market_thousand_dollar_trade() {
        let market = trading_market(2, 30, Some(vec![0.3, 0.7]));
        let quote = curve()
            .quote(&market, 0, dec!(1000), market.created_at())
            .unwrap();

        assert!((quote.tau - 0.00005).abs() < 1e-12);
        assert!(quote.probabilities[0] > 0.3);
        assert!(quote.fill_price > 0.3);
        assert!(quote.fill_price < quote.probabilities[0]);
        let sum: f64 = quote.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn small_trades_fill_above_entry() {
        let market = trading_market(3, 30, Some(vec![0.2, 0.3, 0.5]));
        let c = curve();
        for cents in [1u32, 7, 10, 50, 100, 199] {
            let amount = Decimal::from(cents) / Decimal::from(100);
            for outcome in 0..3 {
                let quote = c.quote(&market, outcome, amount, market.created_at()).unwrap();
                assert!(quote.fill_price > quote.entry_probability, "{outcome} {amount}");
                assert!(quote.fill_price < quote.entry_probability + quote.price_impact);
            }
        }
    }

    #[test]
    fn fill_is_midway_for_a_small_even_trade() {
        // Over a short move Φ is nearly linear, so the fill sits halfway
        // between the old and new marginal price.
        let market = trading_market(2, 30, None);
        let quote = curve().quote(&market, 0, dec!(0.1), market.created_at()).unwrap();
        let midway = 0.5 + quote.price_impact / 2.0;
        assert!(quote.price_impact > 1e-6);
        assert!((quote.fill_price - midway).abs() < quote.price_impact * 1e-3);
        assert!((quote.shares * quote.fill_price - 0.1).abs() < 1e-12);
    }

    #[test]
    fn less_time_means_more_impact() {
        let market = trading_market(2, 60, None);
        let early = curve().quote(&market, 0, dec!(500), market.created_at()).unwrap();
        let late = curve()
            .quote(&market, 0, dec!(500), market.created_at() + chrono::Duration::seconds(50))
            .unwrap();
        assert!(late.price_impact > early.price_impact);
        assert!(late.tau < early.tau);
    }

    #[test]
    fn oversized_trade_is_rejected() {
        let market = trading_market(2, 30, None);
        let err = curve()
            .quote(&market, 1, dec!(1_000_000), market.created_at())
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Pricing(PricingError::ExcessiveSlippage { .. })
        ));
    }

    #[test]
    fn iteration_cap_rejects_with_divergence() {
        let market = trading_market(2, 30, Some(vec![0.3, 0.7]));
        let config = PricingConfig {
            max_iterations: 1,
            ..PricingConfig::default()
        };
        let err = PricingCurve::new(config)
            .quote(&market, 0, dec!(100), market.created_at())
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::Pricing(PricingError::PricingDivergence { .. })
        ));
    }

    #[test]
    fn multi_outcome_rescales_others_evenly() {
        let market = trading_market(4, 120, None);
        let quote = curve().quote(&market, 2, dec!(2000), market.created_at()).unwrap();
        let p = &quote.probabilities;
        assert!(p[2] > 0.25);
        assert!((p[0] - p[1]).abs() < 1e-12 && (p[1] - p[3]).abs() < 1e-12);
        assert!(p[0] < 0.25);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn probabilities_stay_in_band() {
        let market = trading_market(2, 30, Some(vec![0.98, 0.02]));
        let quote = curve().quote(&market, 0, dec!(2000), market.created_at()).unwrap();
        assert!(quote.probabilities[0] <= 0.99);
        assert!(quote.probabilities[1] >= 0.01 - 1e-12);
    }

    #[test]
    fn rejects_bad_inputs() {
        let market = trading_market(2, 30, None);
        let c = curve();
        assert_eq!(
            c.quote(&market, 2, dec!(1), market.created_at()).unwrap_err(),
            MarketError::InvalidOutcome { index: 2, count: 2 }
        );
        assert_eq!(
            c.quote(&market, 0, dec!(0), market.created_at()).unwrap_err(),
            MarketError::NonPositiveStake
        );

        let mut locked = market.clone();
        locked.transition(MarketState::Locked).unwrap();
        assert_eq!(
            c.quote(&locked, 0, dec!(1), locked.created_at()).unwrap_err(),
            MarketError::NotTrading {
                state: MarketState::Locked
            }
        );
    }
}
