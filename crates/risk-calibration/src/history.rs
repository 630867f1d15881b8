//! Persisted history of calibration fits, and reliability diagnostics
//! computed over a fit's bins (ECE, MCE, Brier score).

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use cascade_core::{CalibrationBin, CalibrationParams};

use crate::calibrator::CalibrationReport;

/// One historical calibration fit, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRun {
    pub id: Option<i64>,
    pub fitted_at: DateTime<Utc>,
    pub intercept: f64,
    pub coefficient: f64,
    pub total: i64,
    pub positives: i64,
    pub base_rate: f64,
    pub iterations: i64,
    pub converged: bool,
}

#[derive(Debug, FromRow)]
struct CalibrationRunRow {
    id: Option<i64>,
    fitted_at: String,
    intercept: f64,
    coefficient: f64,
    total: i64,
    positives: i64,
    base_rate: f64,
    iterations: i64,
    converged: bool,
}

impl CalibrationRunRow {
    fn into_run(self) -> CalibrationRun {
        CalibrationRun {
            id: self.id,
            fitted_at: self
                .fitted_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            intercept: self.intercept,
            coefficient: self.coefficient,
            total: self.total,
            positives: self.positives,
            base_rate: self.base_rate,
            iterations: self.iterations,
            converged: self.converged,
        }
    }
}

/// Store for the history of calibration fits, so drift in the risk-score
/// to cascade-probability relationship can be tracked over time.
pub struct SqliteCalibrationHistory {
    pool: sqlx::AnyPool,
}

impl SqliteCalibrationHistory {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calibration_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fitted_at TEXT NOT NULL,
                intercept REAL NOT NULL,
                coefficient REAL NOT NULL,
                total INTEGER NOT NULL,
                positives INTEGER NOT NULL,
                base_rate REAL NOT NULL,
                iterations INTEGER NOT NULL,
                converged BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record(&self, report: &CalibrationReport, fitted_at: DateTime<Utc>) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO calibration_runs (
                fitted_at, intercept, coefficient, total, positives, base_rate,
                iterations, converged
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(fitted_at.to_rfc3339())
        .bind(report.params.intercept)
        .bind(report.params.coefficient)
        .bind(report.total as i64)
        .bind(report.positives as i64)
        .bind(report.base_rate)
        .bind(report.iterations as i64)
        .bind(report.converged)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<CalibrationRun>> {
        let rows: Vec<CalibrationRunRow> = sqlx::query_as(
            r#"
            SELECT id, fitted_at, intercept, coefficient, total, positives,
                   base_rate, iterations, converged
            FROM calibration_runs
            ORDER BY fitted_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_run()).collect())
    }

    pub async fn latest_params(&self) -> Result<Option<CalibrationParams>> {
        let runs = self.recent(1).await?;
        Ok(runs.into_iter().next().map(|r| CalibrationParams {
            intercept: r.intercept,
            coefficient: r.coefficient,
            covariance: None,
        }))
    }
}

/// Reliability diagnostics computed over a calibration fit's bins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityDiagnostics {
    /// Expected Calibration Error: count-weighted mean |predicted - actual|.
    pub ece: f64,
    /// Maximum Calibration Error across bins with data.
    pub mce: f64,
    /// Brier score over every observation implied by the bins.
    pub brier_score: f64,
    pub bins_with_data: usize,
}

/// Compute ECE/MCE/Brier from a fitted model's bins, weighting each score
/// bin by its observation count.
pub fn reliability_diagnostics(bins: &[CalibrationBin], params: &CalibrationParams) -> ReliabilityDiagnostics {
    use numeric_kit::sigmoid;

    let total: u64 = bins.iter().map(|b| b.total).sum();
    if total == 0 {
        return ReliabilityDiagnostics {
            ece: 0.0,
            mce: 0.0,
            brier_score: 0.0,
            bins_with_data: 0,
        };
    }

    let n = total as f64;
    let mut ece = 0.0;
    let mut mce: f64 = 0.0;
    let mut brier_sum = 0.0;
    let mut bins_with_data = 0;

    for (idx, bin) in bins.iter().enumerate() {
        if bin.total == 0 {
            continue;
        }
        bins_with_data += 1;
        let predicted = sigmoid(params.intercept + params.coefficient * idx as f64);
        let actual = bin.positive as f64 / bin.total as f64;
        let gap = (predicted - actual).abs();

        ece += gap * bin.total as f64 / n;
        mce = mce.max(gap);

        // Brier contribution: positives count as (1 - predicted)^2, negatives
        // as predicted^2.
        let positives = bin.positive as f64;
        let negatives = (bin.total - bin.positive) as f64;
        brier_sum += positives * (1.0 - predicted).powi(2) + negatives * predicted.powi(2);
    }

    ReliabilityDiagnostics {
        ece,
        mce,
        brier_score: brier_sum / n,
        bins_with_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_zero_for_perfectly_calibrated_bins() {
        let mut bins = vec![CalibrationBin::default(); 101];
        let params = CalibrationParams::new(-5.0, 0.1);
        for (idx, bin) in bins.iter_mut().enumerate() {
            let p = numeric_kit::sigmoid(params.intercept + params.coefficient * idx as f64);
            bin.total = 1000;
            bin.positive = (p * 1000.0).round() as u64;
        }
        let diag = reliability_diagnostics(&bins, &params);
        assert!(diag.ece < 0.01);
        assert!(diag.mce < 0.05);
    }

    #[test]
    fn diagnostics_empty_bins_are_zero() {
        let bins = vec![CalibrationBin::default(); 101];
        let params = CalibrationParams::new(-5.0, 0.1);
        let diag = reliability_diagnostics(&bins, &params);
        assert_eq!(diag.bins_with_data, 0);
        assert_eq!(diag.ece, 0.0);
    }
}
