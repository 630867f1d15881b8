//! IRLS fit of the logistic calibration model `P(y=1|s) = sigma(a + b*s)`
//! from binned empirical counts over the 101 integer risk scores.

use cascade_core::{CalibrationBin, CalibrationParams};
use numeric_kit::{logit, sigmoid};
use serde::{Deserialize, Serialize};

const NUM_BINS: usize = 101;
const LL_EPSILON: f64 = 1e-15;
const SINGULAR_DET: f64 = 1e-30;
const CONVERGENCE_TOL: f64 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub params: CalibrationParams,
    pub total: u64,
    pub positives: u64,
    pub base_rate: f64,
    pub iterations: usize,
    pub log_likelihood: f64,
    pub converged: bool,
    pub bins: Vec<CalibrationBin>,
}

/// Fit calibration parameters from 101 binned counts via IRLS (Newton's
/// method on the logistic log-likelihood with an L2 prior).
///
/// `prior` supplies both the fallback returned on degenerate input and the
/// L2 shrinkage target.
pub fn fit_calibration(
    bins: &[CalibrationBin],
    lambda: f64,
    max_iterations: usize,
    prior: CalibrationParams,
) -> CalibrationReport {
    let total: u64 = bins.iter().map(|b| b.total).sum();
    let positives: u64 = bins.iter().map(|b| b.positive).sum();
    let base_rate = if total > 0 {
        positives as f64 / total as f64
    } else {
        0.0
    };

    if total == 0 || base_rate == 0.0 || base_rate == 1.0 {
        tracing::warn!(total, base_rate, "degenerate calibration input, returning prior");
        return CalibrationReport {
            params: CalibrationParams::new(prior.intercept, prior.coefficient),
            total,
            positives,
            base_rate,
            iterations: 0,
            log_likelihood: f64::NAN,
            converged: false,
            bins: bins.to_vec(),
        };
    }

    let mut a = logit(base_rate);
    let mut b = 0.0_f64;
    let mut iterations = 0;
    let mut converged = false;
    let mut last_covariance: Option<[f64; 3]> = None;

    for iter in 0..max_iterations.max(1) {
        iterations = iter + 1;

        let mut sum_r = 0.0;
        let mut sum_rs = 0.0;
        let mut sum_w = 0.0;
        let mut sum_ws = 0.0;
        let mut sum_ws2 = 0.0;

        for (idx, bin) in bins.iter().enumerate() {
            if bin.total == 0 {
                continue;
            }
            let s = idx as f64;
            let n_s = bin.total as f64;
            let y_s = bin.positive as f64;
            let p_s = sigmoid(a + b * s);
            let r_s = y_s - n_s * p_s;
            let w_s = n_s * p_s * (1.0 - p_s);

            sum_r += r_s;
            sum_rs += r_s * s;
            sum_w += w_s;
            sum_ws += w_s * s;
            sum_ws2 += w_s * s * s;
        }

        let g0 = sum_r - lambda * a;
        let g1 = sum_rs - lambda * b;

        let j00 = sum_w + lambda;
        let j01 = sum_ws;
        let j11 = sum_ws2 + lambda;

        let det = j00 * j11 - j01 * j01;
        if det.abs() < SINGULAR_DET {
            last_covariance = None;
            break;
        }

        let inv_det = 1.0 / det;
        let delta_a = inv_det * (j11 * g0 - j01 * g1);
        let delta_b = inv_det * (-j01 * g0 + j00 * g1);

        a += delta_a;
        b += delta_b;

        last_covariance = Some([inv_det * j11, -inv_det * j01, inv_det * j00]);

        if delta_a.abs().max(delta_b.abs()) < CONVERGENCE_TOL {
            converged = true;
            break;
        }
    }

    let params = CalibrationParams {
        intercept: a,
        coefficient: b,
        covariance: last_covariance,
    };

    let log_likelihood = log_likelihood(bins, a, b);

    tracing::debug!(
        converged,
        iterations,
        total,
        positives,
        intercept = params.intercept,
        coefficient = params.coefficient,
        "calibration fit complete"
    );

    CalibrationReport {
        params,
        total,
        positives,
        base_rate,
        iterations,
        log_likelihood,
        converged,
        bins: bins.to_vec(),
    }
}

fn log_likelihood(bins: &[CalibrationBin], a: f64, b: f64) -> f64 {
    bins.iter()
        .enumerate()
        .filter(|(_, bin)| bin.total > 0)
        .map(|(idx, bin)| {
            let s = idx as f64;
            let p = sigmoid(a + b * s).clamp(LL_EPSILON, 1.0 - LL_EPSILON);
            let n_s = bin.total as f64;
            let y_s = bin.positive as f64;
            y_s * p.ln() + (n_s - y_s) * (1.0 - p).ln()
        })
        .sum()
}

/// Build the 101-bin histogram from raw `(score, was_cascade)` pairs.
pub fn bin_outcomes(pairs: impl IntoIterator<Item = (i32, bool)>) -> Vec<CalibrationBin> {
    let mut bins = vec![CalibrationBin::default(); NUM_BINS];
    for (score, positive) in pairs {
        let idx = score.clamp(0, 100) as usize;
        bins[idx].total += 1;
        if positive {
            bins[idx].positive += 1;
        }
    }
    bins
}
