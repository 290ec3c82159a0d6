use rust_decimal::Decimal;

pub fn assert_decimal_near(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "expected {} ± {}, got {}",
        expected,
        tolerance,
        actual
    );
}

pub fn assert_normalized(probabilities: &[f64]) {
    let sum: f64 = probabilities.iter().sum();
    assert!(
        (sum - 1.0).abs() < 1e-9,
        "probabilities {probabilities:?} sum to {sum}"
    );
}

pub fn assert_in_band(probabilities: &[f64], min: f64, max: f64) {
    for (i, p) in probabilities.iter().enumerate() {
        assert!(
            *p >= min - 1e-12 && *p <= max + 1e-12,
            "outcome {i} probability {p} outside [{min}, {max}]"
        );
    }
}
