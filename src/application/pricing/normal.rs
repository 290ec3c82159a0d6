//! Standard normal density and distribution functions.

use std::f64::consts::{PI, SQRT_2};

// Abramowitz & Stegun 7.1.26 coefficients for erf.
const A1: f64 = 0.254_829_592;
const A2: f64 = -0.284_496_736;
const A3: f64 = 1.421_413_741;
const A4: f64 = -1.453_152_027;
const A5: f64 = 1.061_405_429;
const P: f64 = 0.327_591_1;

/// Density φ(x).
#[must_use]
pub fn pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Distribution Φ(x). Absolute error below 1e-7.
#[must_use]
pub fn cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Five-point Gauss-Legendre nodes and weights on `[0, 1]`.
const GAUSS: [(f64, f64); 5] = [
    (0.046_910_077_030_668_0, 0.118_463_442_528_094_5),
    (0.230_765_344_947_158_5, 0.239_314_335_249_683_2),
    (0.5, 0.284_444_444_444_444_4),
    (0.769_234_655_052_841_5, 0.239_314_335_249_683_2),
    (0.953_089_922_969_332_0, 0.118_463_442_528_094_5),
];

/// Widest quadrature panel.
const PANEL_WIDTH: f64 = 0.25;
const MAX_PANELS: f64 = 256.0;

/// Mean of `Φ(z + s) - Φ(z)` over `s` in `[0, d]`.
///
/// Built from differences of Φ, so the result keeps its relative accuracy
/// when `d` is tiny. `d * (Φ(z) + mean_lift(z, d))` is `∫ Φ` over
/// `[z, z + d]`.
#[must_use]
pub fn mean_lift(z: f64, d: f64) -> f64 {
    let base = cdf(z);
    let panels = (d.abs() / PANEL_WIDTH).ceil().clamp(1.0, MAX_PANELS);
    let width = d / panels;
    let mut total = 0.0;
    for k in 0..panels as u32 {
        let start = z + width * f64::from(k);
        total += GAUSS
            .iter()
            .map(|(x, w)| w * (cdf(start + width * x) - base))
            .sum::<f64>();
    }
    total / panels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdf_reference_points() {
        assert!((cdf(0.0) - 0.5).abs() < 1e-9);
        assert!((cdf(1.0) - 0.841_344_746).abs() < 1e-6);
        assert!((cdf(-1.959_964) - 0.025).abs() < 1e-6);
        assert!((cdf(3.0) + cdf(-3.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pdf_peak() {
        assert!((pdf(0.0) - 0.398_942_280).abs() < 1e-9);
        assert_eq!(pdf(1.5), pdf(-1.5));
    }

    #[test]
    fn gauss_weights_sum_to_one() {
        let total: f64 = GAUSS.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-15);
    }

    #[test]
    fn mean_lift_matches_closed_form() {
        // ∫ Φ over [a, b] = [xΦ(x) + φ(x)] from a to b.
        let antiderivative = |x: f64| x * cdf(x) + pdf(x);
        for (z, d) in [(-1.2, 0.8), (0.0, 2.5), (0.4, 0.05)] {
            let integral = d * (cdf(z) + mean_lift(z, d));
            let exact = antiderivative(z + d) - antiderivative(z);
            assert!((integral - exact).abs() < 1e-6, "z={z} d={d}");
        }
    }

    #[test]
    fn mean_lift_is_positive_for_tiny_steps() {
        for z in [-2.0, -0.3, 0.0, 0.7, 2.1] {
            let lift = mean_lift(z, 1e-8);
            assert!(lift > 0.0, "z={z}");
            // Half the slope times the step, to first order.
            assert!((lift / (0.5 * pdf(z) * 1e-8) - 1.0).abs() < 1e-2, "z={z}");
        }
    }
}
