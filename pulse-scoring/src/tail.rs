// Pulse Scoring - Online anomaly scoring
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Deviation scores and Gaussian tail probabilities.

use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;

/// Absolute z-score of `value` against a baseline.
///
/// The spread is floored at `min_spread` so a flat baseline never divides
/// by zero.
pub fn deviation(value: f64, mean: f64, spread: f64, min_spread: f64) -> f64 {
    let spread = if spread.is_finite() {
        spread.max(min_spread)
    } else {
        f64::INFINITY
    };
    (value - mean).abs() / spread
}

/// Two-sided tail probability `P(|Z| >= z)` for a standard normal `Z`.
///
/// Decreasing in `z`; 1.0 at `z = 0`. A NaN score (baseline overflowed)
/// is treated as no evidence of deviation.
pub fn tail_probability(z: f64) -> f64 {
    if z.is_nan() {
        return 1.0;
    }
    if z == f64::INFINITY {
        return 0.0;
    }
    erfc(z.abs() / SQRT_2).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_deviation() {
        assert_relative_eq!(deviation(12.0, 10.0, 2.0, 1e-6), 1.0);
        assert_relative_eq!(deviation(8.0, 10.0, 2.0, 1e-6), 1.0);
    }

    #[test]
    fn test_deviation_zero_spread() {
        let z = deviation(10.5, 10.0, 0.0, 1e-3);
        assert_relative_eq!(z, 500.0);
        assert_eq!(deviation(10.0, 10.0, 0.0, 1e-3), 0.0);
    }

    #[test]
    fn test_known_tail_values() {
        assert_relative_eq!(tail_probability(0.0), 1.0);
        assert_relative_eq!(tail_probability(1.0), 0.317_310_507_862_914_1, epsilon = 1e-9);
        assert_relative_eq!(tail_probability(1.959_963_985), 0.05, epsilon = 1e-8);
        assert_relative_eq!(tail_probability(2.575_829_304), 0.01, epsilon = 1e-8);
        assert_relative_eq!(tail_probability(3.0), 0.002_699_796_063_260_2, epsilon = 1e-10);
    }

    #[test]
    fn test_tail_is_decreasing() {
        let mut last = tail_probability(0.0);
        for i in 1..=80 {
            let p = tail_probability(i as f64 * 0.1);
            assert!(p < last, "p({}) = {} not below {}", i as f64 * 0.1, p, last);
            last = p;
        }
    }

    #[test]
    fn test_tail_bounds() {
        assert_eq!(tail_probability(f64::INFINITY), 0.0);
        assert_eq!(tail_probability(f64::NAN), 1.0);
        assert_eq!(tail_probability(1e6), 0.0);
        for z in [0.0, 0.5, 5.0, 50.0] {
            let p = tail_probability(z);
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
