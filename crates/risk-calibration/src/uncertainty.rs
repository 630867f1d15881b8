//! Confidence intervals around the calibrated cascade probability.
//!
//! Two methods are exposed per §9: Wald intervals on the logit scale
//! (preferred — monotone in `s` because they ride the model's own slope)
//! and Wilson score intervals computed directly on raw bin counts (useful
//! as a model-free sanity check on a single bin).

use cascade_core::CalibrationParams;
use numeric_kit::sigmoid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
    pub point: f64,
}

/// Wald interval for `P(y=1|s)` at a given score, propagated through the
/// logistic link from the covariance of `(a, b)`.
///
/// `z_alpha` is the standard-normal critical value (1.96 for a 95% CI).
/// Degenerates to a point interval when the fit carries no covariance
/// (unconverged or near-singular Jacobian).
pub fn wald_interval(params: &CalibrationParams, s: f64, z_alpha: f64) -> Interval {
    let z = params.intercept + params.coefficient * s;
    let point = sigmoid(z);

    let Some([var_a, cov_ab, var_b]) = params.covariance else {
        return Interval {
            lower: point,
            upper: point,
            point,
        };
    };

    let var_z = var_a + 2.0 * s * cov_ab + s * s * var_b;
    if !var_z.is_finite() || var_z < 0.0 {
        return Interval {
            lower: point,
            upper: point,
            point,
        };
    }
    let half_width = z_alpha * var_z.sqrt();
    Interval {
        lower: sigmoid(z - half_width),
        upper: sigmoid(z + half_width),
        point,
    }
}

/// Wilson score interval directly on `(positives, total)` counts, with no
/// dependence on the fitted model. Returns the degenerate `[0, 0]` point
/// interval when `total == 0`.
pub fn wilson_interval(positives: u64, total: u64, z_alpha: f64) -> Interval {
    if total == 0 {
        return Interval {
            lower: 0.0,
            upper: 0.0,
            point: 0.0,
        };
    }
    let n = total as f64;
    let phat = positives as f64 / n;
    let z2 = z_alpha * z_alpha;

    let denom = 1.0 + z2 / n;
    let center = (phat + z2 / (2.0 * n)) / denom;
    let margin = (z_alpha / denom) * ((phat * (1.0 - phat) / n) + z2 / (4.0 * n * n)).sqrt();

    Interval {
        lower: (center - margin).max(0.0),
        upper: (center + margin).min(1.0),
        point: phat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wald_without_covariance_is_a_point() {
        let params = CalibrationParams::new(-5.0, 0.1);
        let interval = wald_interval(&params, 50.0, 1.96);
        assert_eq!(interval.lower, interval.upper);
        assert_eq!(interval.lower, interval.point);
    }

    #[test]
    fn wald_with_covariance_brackets_point() {
        let params = CalibrationParams {
            intercept: -5.0,
            coefficient: 0.1,
            covariance: Some([0.02, -0.0005, 0.00002]),
        };
        let interval = wald_interval(&params, 50.0, 1.96);
        assert!(interval.lower <= interval.point);
        assert!(interval.point <= interval.upper);
    }

    #[test]
    fn wilson_interval_zero_total_is_degenerate() {
        let interval = wilson_interval(0, 0, 1.96);
        assert_eq!(interval.lower, 0.0);
        assert_eq!(interval.upper, 0.0);
    }

    #[test]
    fn wilson_interval_brackets_point_estimate() {
        let interval = wilson_interval(30, 100, 1.96);
        assert!((interval.point - 0.3).abs() < 1e-9);
        assert!(interval.lower < interval.point);
        assert!(interval.upper > interval.point);
    }

    #[test]
    fn wilson_interval_narrows_with_more_data() {
        let narrow = wilson_interval(300, 1000, 1.96);
        let wide = wilson_interval(3, 10, 1.96);
        assert!((narrow.upper - narrow.lower) < (wide.upper - wide.lower));
    }
}
