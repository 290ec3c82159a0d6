//! Newton-Raphson root finder.

use crate::error::PricingError;

/// A converged root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Root {
    pub value: f64,
    pub iterations: u32,
}

/// Newton-Raphson with a residual tolerance and an iteration cap.
///
/// An iterate is also accepted once a step moves it by no more than
/// `tolerance * |x|`.
#[derive(Debug, Clone, Copy)]
pub struct NewtonSolver {
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl NewtonSolver {
    #[must_use]
    pub const fn new(tolerance: f64, max_iterations: u32) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Find `x` with `|f(x)| <= tolerance`, starting from `start`.
    ///
    /// # Errors
    ///
    /// [`PricingError::PricingDivergence`] when the iteration cap is hit,
    /// the slope vanishes, or an iterate stops being finite.
    pub fn solve<F, D>(&self, start: f64, f: F, df: D) -> Result<Root, PricingError>
    where
        F: Fn(f64) -> f64,
        D: Fn(f64) -> f64,
    {
        self.iterate(start, self.tolerance, f, df)
    }

    /// Like [`solve`](Self::solve), with the residual tolerance scaled by
    /// `scale`. Used when the root is an increment whose size tracks
    /// `scale`, so tiny targets are still solved to full relative accuracy.
    ///
    /// # Errors
    ///
    /// [`PricingError::PricingDivergence`], as for `solve`.
    pub fn solve_scaled<F, D>(
        &self,
        start: f64,
        scale: f64,
        f: F,
        df: D,
    ) -> Result<Root, PricingError>
    where
        F: Fn(f64) -> f64,
        D: Fn(f64) -> f64,
    {
        self.iterate(start, self.tolerance * scale.abs(), f, df)
    }

    fn iterate<F, D>(
        &self,
        start: f64,
        residual_tolerance: f64,
        f: F,
        df: D,
    ) -> Result<Root, PricingError>
    where
        F: Fn(f64) -> f64,
        D: Fn(f64) -> f64,
    {
        let mut x = start;
        let mut residual = f(x);
        let mut iterations = 0;

        while iterations < self.max_iterations {
            if !residual.is_finite() {
                break;
            }
            if residual.abs() <= residual_tolerance {
                return Ok(Root {
                    value: x,
                    iterations,
                });
            }
            let slope = df(x);
            if !slope.is_finite() || slope.abs() < f64::EPSILON {
                break;
            }
            let step = residual / slope;
            x -= step;
            residual = f(x);
            iterations += 1;
            if residual.is_finite() && step.abs() <= self.tolerance * x.abs() {
                return Ok(Root {
                    value: x,
                    iterations,
                });
            }
        }

        if residual.is_finite() && residual.abs() <= residual_tolerance {
            return Ok(Root {
                value: x,
                iterations,
            });
        }
        Err(PricingError::PricingDivergence {
            iterations,
            residual,
        })
    }
}
