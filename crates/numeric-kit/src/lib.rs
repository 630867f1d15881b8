//! Shared numeric helpers.
//!
//! Pure functions with no state and no I/O, used by every other crate in the
//! workspace: the logistic link used by calibration and predictions, safe
//! division for rate/ratio metrics, and the volatility annualization constant
//! shared by the stress engine and the cascade detector.

/// Minutes in a Gregorian year (365.25 days). Used to annualize per-minute
/// volatility and to de-annualize it back down to a window-sized threshold.
pub const MINUTES_PER_YEAR: f64 = 525_960.0;

/// Standard logistic function `σ(x) = 1 / (1 + e^-x)`.
///
/// Non-finite input maps to the limit a sufficiently large/small finite
/// input would produce, so callers never have to special-case NaN/Infinity
/// themselves.
pub fn sigmoid(x: f64) -> f64 {
    if x.is_nan() {
        return 0.5;
    }
    if x == f64::INFINITY {
        return 1.0;
    }
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    1.0 / (1.0 + (-x).exp())
}

/// Inverse of [`sigmoid`]: `logit(p) = ln(p / (1 - p))`.
///
/// `p` is clamped to `(1e-15, 1 - 1e-15)` before taking the log so that
/// `p = 0` or `p = 1` return a large finite value instead of infinity.
pub fn logit(p: f64) -> f64 {
    let clamped = p.clamp(1e-15, 1.0 - 1e-15);
    (clamped / (1.0 - clamped)).ln()
}

/// `num / den`, or `default` when `den` is zero or either operand is
/// non-finite. Every ratio metric in the backtest driver goes through this
/// so that an empty confusion-matrix cell never produces NaN.
pub fn safe_div(num: f64, den: f64, default: f64) -> f64 {
    if den == 0.0 || !num.is_finite() || !den.is_finite() {
        return default;
    }
    num / den
}

/// Replace a non-finite value with `fallback`.
pub fn finite_or(x: f64, fallback: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        fallback
    }
}

/// Linear interpolation between `(x0, y0)` and `(x1, y1)` at `x`.
///
/// Returns `y0` when `x1 == x0` (degenerate interval) rather than dividing
/// by zero.
pub fn lerp(x: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    let t = (x - x0) / (x1 - x0);
    y0 + t * (y1 - y0)
}

/// Round-half-up to the nearest integer, returned as `f64` so callers can
/// clamp before converting to the target integer type.
pub fn round_half_up(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    x.round()
}

/// Annualize a per-minute volatility (standard deviation of per-minute log
/// returns) assuming i.i.d. returns, via the square-root-of-time rule.
pub fn annualize_vol_per_minute(sigma_per_minute: f64) -> f64 {
    sigma_per_minute * MINUTES_PER_YEAR.sqrt()
}

/// De-annualize back down to a threshold appropriate for a window of
/// `window_minutes` minutes: `k * (sigma_ann / sqrt(minutes_per_year)) *
/// sqrt(window_minutes)`.
pub fn window_threshold(sigma_ann: f64, window_minutes: f64, k: f64) -> f64 {
    k * (sigma_ann / MINUTES_PER_YEAR.sqrt()) * window_minutes.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn sigmoid_extremes_are_finite() {
        assert!((sigmoid(f64::INFINITY) - 1.0).abs() < 1e-12);
        assert!(sigmoid(f64::NEG_INFINITY).abs() < 1e-12);
        assert_eq!(sigmoid(f64::NAN), 0.5);
    }

    #[test]
    fn logit_is_inverse_of_sigmoid() {
        for p in [0.01, 0.1, 0.5, 0.9, 0.99] {
            let recovered = sigmoid(logit(p));
            assert!((recovered - p).abs() < 1e-9);
        }
    }

    #[test]
    fn safe_div_zero_denominator() {
        assert_eq!(safe_div(5.0, 0.0, -1.0), -1.0);
        assert_eq!(safe_div(5.0, 2.0, -1.0), 2.5);
    }

    #[test]
    fn lerp_degenerate_interval() {
        assert_eq!(lerp(5.0, 3.0, 10.0, 3.0, 20.0), 10.0);
    }

    #[test]
    fn lerp_midpoint() {
        assert!((lerp(5.0, 0.0, 0.0, 10.0, 100.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn window_threshold_scales_with_sqrt_window() {
        let t1 = window_threshold(0.5, 5.0, 3.0);
        let t2 = window_threshold(0.5, 20.0, 3.0);
        assert!((t2 / t1 - 2.0).abs() < 1e-6);
    }
}
