//! Data-driven calibration: streams risk scores and cascade events out of
//! storage and turns them into the 101-bin histogram `fit_calibration`
//! expects, without ever materializing a symbol's full history at once.

use cascade_core::{CalibrationParams, CascadeEventStore, RiskScoreStore};

use crate::calibrator::{fit_calibration, CalibrationReport};

const PAGE_SIZE: usize = 50_000;

/// Label a risk score emitted at `t` as a positive if any cascade starts in
/// `[t, t + horizon_ms]`. `starts` must be sorted ascending.
fn is_cascade_within_horizon(starts: &[i64], t: i64, horizon_ms: i64) -> bool {
    let idx = starts.partition_point(|&start| start < t);
    starts.get(idx).is_some_and(|&start| start <= t + horizon_ms)
}

/// Fit calibration from persisted risk scores and cascade ground truth
/// over `[start_ms, end_ms]` for each symbol in `symbols`, streaming pages
/// rather than loading a symbol's full range into memory.
pub async fn fit_from_history(
    risk_store: &dyn RiskScoreStore,
    event_store: &dyn CascadeEventStore,
    symbols: &[String],
    start_ms: i64,
    end_ms: i64,
    horizon_min: i64,
    lambda: f64,
    max_iterations: usize,
    prior: CalibrationParams,
) -> Result<CalibrationReport, cascade_core::CascadeError> {
    let horizon_ms = horizon_min * 60_000;
    let mut pairs: Vec<(i32, bool)> = Vec::new();

    for symbol in symbols {
        let events = event_store.load(symbol, start_ms, end_ms + horizon_ms).await?;
        let mut starts: Vec<i64> = events.iter().map(|e| e.start_time_ms).collect();
        starts.sort_unstable();

        let mut cursor = start_ms;
        loop {
            let page = risk_store.page(symbol, cursor, end_ms, PAGE_SIZE).await?;
            if page.is_empty() {
                break;
            }
            for assessment in &page {
                let positive = is_cascade_within_horizon(&starts, assessment.timestamp_ms, horizon_ms);
                pairs.push((assessment.risk_score, positive));
            }
            let last_ts = page.last().unwrap().timestamp_ms;
            if page.len() < PAGE_SIZE || last_ts >= end_ms {
                break;
            }
            // next page starts strictly after the last timestamp seen, per
            // the streaming cursor contract (first page >=, subsequent >).
            cursor = last_ts + 1;
        }
    }

    let bins = crate::calibrator::bin_outcomes(pairs);
    Ok(fit_calibration(&bins, lambda, max_iterations, prior))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::ports::memory::{InMemoryCascadeEventStore, InMemoryRiskScoreStore};
    use cascade_core::{CascadeEvent, Direction, RiskAssessment, RiskLevel};

    fn assessment(symbol: &str, ts: i64, score: i32) -> RiskAssessment {
        RiskAssessment {
            symbol: symbol.to_string(),
            timestamp_ms: ts,
            risk_score: score,
            risk_level: RiskLevel::Low,
            confidence: 0.1,
            factors: vec![],
            prediction: None,
        }
    }

    #[test]
    fn horizon_check_matches_first_start_geq_t() {
        let starts = vec![1_000, 5_000, 9_000];
        assert!(is_cascade_within_horizon(&starts, 0, 1_500));
        assert!(!is_cascade_within_horizon(&starts, 0, 500));
        assert!(is_cascade_within_horizon(&starts, 4_000, 1_500));
        assert!(!is_cascade_within_horizon(&starts, 9_500, 1_000));
    }

    #[tokio::test]
    async fn fit_from_history_labels_scores_near_cascades_as_positive() {
        let risk_store = InMemoryRiskScoreStore::new();
        let event_store = InMemoryCascadeEventStore::new();

        for minute in 0..200 {
            let ts = minute * 60_000;
            let score = if (minute / 20) % 2 == 0 { 20 } else { 80 };
            risk_store.upsert(&assessment("BTC-PERP", ts, score)).await.unwrap();
        }

        event_store
            .upsert(&CascadeEvent {
                symbol: "BTC-PERP".into(),
                direction: Direction::LongSqueeze,
                start_time_ms: 20 * 60_000 + 5 * 60_000,
                end_time_ms: 20 * 60_000 + 10 * 60_000,
                price_change_pct: -6.0,
                liquidation_volume_usd: 5_000_000.0,
            })
            .await
            .unwrap();

        let prior = CalibrationParams::new(-7.0, 0.1);
        let report = fit_from_history(
            &risk_store,
            &event_store,
            &["BTC-PERP".to_string()],
            0,
            199 * 60_000,
            60,
            0.001,
            25,
            prior,
        )
        .await
        .unwrap();

        assert_eq!(report.total, 200);
        assert!(report.positives >= 1);
    }
}
