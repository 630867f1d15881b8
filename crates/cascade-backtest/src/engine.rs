use cascade_core::{CascadeError, CascadeEventStore, RiskScoreStore};
use numeric_kit::safe_div;

use crate::models::{BacktestConfig, BaselineMetrics, ConfusionMatrix, DetailedResult};

struct SymbolTally {
    matrix: ConfusionMatrix,
    lead_time_sum_ms: i64,
    lead_time_count: u64,
    total_points: u64,
    cascade_count: u64,
}

/// First cascade start `>= t`, checked against `t + horizon_ms` (§4.5).
fn is_within_horizon(starts: &[i64], t: i64, horizon_ms: i64) -> Option<i64> {
    let idx = starts.partition_point(|&s| s < t);
    starts
        .get(idx)
        .copied()
        .filter(|&start| start <= t + horizon_ms)
}

async fn tally_symbol(
    risk_store: &dyn RiskScoreStore,
    event_store: &dyn CascadeEventStore,
    symbol: &str,
    config: &BacktestConfig,
) -> Result<SymbolTally, CascadeError> {
    let horizon_ms = config.horizon_min * 60_000;
    let cascades = event_store
        .load(symbol, config.start_ms, config.end_ms + horizon_ms)
        .await?;
    let starts: Vec<i64> = cascades.iter().map(|c| c.start_time_ms).collect();

    let mut matrix = ConfusionMatrix::default();
    let mut lead_time_sum_ms: i64 = 0;
    let mut lead_time_count: u64 = 0;
    let mut total_points: u64 = 0;

    let mut cursor = config.start_ms;
    loop {
        let page = risk_store
            .page(symbol, cursor, config.end_ms, config.page_size)
            .await?;
        if page.is_empty() {
            break;
        }

        for score in &page {
            total_points += 1;
            let predicted = score.risk_score >= config.score_threshold
                && score.confidence >= config.confidence_threshold;
            let actual = is_within_horizon(&starts, score.timestamp_ms, horizon_ms);

            match (predicted, actual.is_some()) {
                (true, true) => {
                    matrix.tp += 1;
                    if let Some(cascade_start) = actual {
                        lead_time_sum_ms += cascade_start - score.timestamp_ms;
                        lead_time_count += 1;
                    }
                }
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
                (false, false) => matrix.tn += 1,
            }
        }

        let last_ts = page.last().unwrap().timestamp_ms;
        if page.len() < config.page_size || last_ts >= config.end_ms {
            break;
        }
        cursor = last_ts + 1;
    }

    Ok(SymbolTally {
        matrix,
        lead_time_sum_ms,
        lead_time_count,
        total_points,
        cascade_count: cascades.len() as u64,
    })
}

fn metrics_from(matrix: ConfusionMatrix, lead_sum_ms: i64, lead_count: u64, total_points: u64, cascades: u64) -> DetailedResult {
    let precision = safe_div(matrix.tp as f64, (matrix.tp + matrix.fp) as f64, 0.0);
    let recall = safe_div(matrix.tp as f64, (matrix.tp + matrix.fn_) as f64, 0.0);
    let f1 = safe_div(2.0 * precision * recall, precision + recall, 0.0);
    let fpr = safe_div(matrix.fp as f64, (matrix.fp + matrix.tn) as f64, 0.0);
    let avg_lead_time_min = safe_div(lead_sum_ms as f64, lead_count as f64, 0.0) / 60_000.0;

    let prediction_rate = safe_div((matrix.tp + matrix.fp) as f64, total_points as f64, 0.0);
    let base_rate = safe_div((matrix.tp + matrix.fn_) as f64, total_points as f64, 0.0);
    let random_f1 = safe_div(
        2.0 * prediction_rate * base_rate,
        prediction_rate + base_rate,
        0.0,
    );

    DetailedResult {
        precision,
        recall,
        f1,
        fpr,
        avg_lead_time_min,
        confusion_matrix: matrix,
        total_points,
        cascades_in_window: cascades,
        prediction_rate,
        base_rate,
        baseline: BaselineMetrics {
            random_f1,
            naive_f1: 0.0,
        },
    }
}

/// Evaluate a threshold pair against ground-truth cascades for one or more
/// symbols, micro-averaging by summing confusion counts and weighting lead
/// time by per-symbol TP counts (§4.5 "Multi-symbol").
pub async fn run_backtest(
    risk_store: &dyn RiskScoreStore,
    event_store: &dyn CascadeEventStore,
    symbols: &[String],
    config: &BacktestConfig,
) -> Result<DetailedResult, CascadeError> {
    let mut matrix = ConfusionMatrix::default();
    let mut lead_time_sum_ms: i64 = 0;
    let mut lead_time_count: u64 = 0;
    let mut total_points: u64 = 0;
    let mut cascades: u64 = 0;

    for symbol in symbols {
        let tally = tally_symbol(risk_store, event_store, symbol, config).await?;
        tracing::debug!(
            symbol = %symbol,
            total_points = tally.total_points,
            cascades = tally.cascade_count,
            tp = tally.matrix.tp,
            fp = tally.matrix.fp,
            "backtest tally for symbol"
        );
        matrix.tp += tally.matrix.tp;
        matrix.fp += tally.matrix.fp;
        matrix.fn_ += tally.matrix.fn_;
        matrix.tn += tally.matrix.tn;
        lead_time_sum_ms += tally.lead_time_sum_ms;
        lead_time_count += tally.lead_time_count;
        total_points += tally.total_points;
        cascades += tally.cascade_count;
    }

    Ok(metrics_from(matrix, lead_time_sum_ms, lead_time_count, total_points, cascades))
}

/// Threshold sweep over a grid of `(score_threshold, confidence_threshold)`
/// pairs, re-scanning only the risk-score pages (§4.5 "Threshold sweep").
pub async fn sweep(
    risk_store: &dyn RiskScoreStore,
    event_store: &dyn CascadeEventStore,
    symbols: &[String],
    base_config: &BacktestConfig,
    score_thresholds: &[i32],
    confidence_thresholds: &[f64],
) -> Result<Vec<crate::models::SweepPoint>, CascadeError> {
    let mut points = Vec::with_capacity(score_thresholds.len() * confidence_thresholds.len());
    for &score_threshold in score_thresholds {
        for &confidence_threshold in confidence_thresholds {
            let config = BacktestConfig {
                score_threshold,
                confidence_threshold,
                ..*base_config
            };
            let result = run_backtest(risk_store, event_store, symbols, &config).await?;
            points.push(crate::models::SweepPoint {
                score_threshold,
                confidence_threshold,
                result,
            });
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use cascade_core::ports::memory::{InMemoryCascadeEventStore, InMemoryRiskScoreStore};
    use cascade_core::{CascadeEvent, Direction, RiskAssessment, RiskLevel};

    use super::*;

    fn assessment(symbol: &str, ts: i64, score: i32, confidence: f64) -> RiskAssessment {
        RiskAssessment {
            symbol: symbol.to_string(),
            timestamp_ms: ts,
            risk_score: score,
            risk_level: RiskLevel::Low,
            confidence,
            factors: vec![],
            prediction: None,
        }
    }

    #[tokio::test]
    async fn perfect_predictor_scores_f1_one() {
        let risk_store = InMemoryRiskScoreStore::new();
        let event_store = InMemoryCascadeEventStore::new();

        for i in 0..10 {
            let ts = i * 60_000;
            let is_cascade_lead = i == 5;
            let score = if is_cascade_lead { 90 } else { 10 };
            risk_store
                .upsert(&assessment("BTC-PERP", ts, score, 0.9))
                .await
                .unwrap();
        }
        event_store
            .upsert(&CascadeEvent {
                symbol: "BTC-PERP".into(),
                direction: Direction::LongSqueeze,
                start_time_ms: 5 * 60_000 + 30_000,
                end_time_ms: 6 * 60_000,
                price_change_pct: -6.0,
                liquidation_volume_usd: 5_000_000.0,
            })
            .await
            .unwrap();

        let config = BacktestConfig {
            page_size: 1000,
            ..BacktestConfig::new(0, 9 * 60_000, 5)
        };
        let result = run_backtest(
            &risk_store,
            &event_store,
            &[String::from("BTC-PERP")],
            &config,
        )
        .await
        .unwrap();

        assert_eq!(result.confusion_matrix.tp, 1);
        assert_eq!(result.confusion_matrix.fp, 0);
        assert!((result.f1 - 1.0).abs() < 1e-9);
        assert!(result.avg_lead_time_min > 0.0);
    }

    #[tokio::test]
    async fn no_cascades_in_window_yields_zero_base_rate() {
        let risk_store = InMemoryRiskScoreStore::new();
        let event_store = InMemoryCascadeEventStore::new();
        for i in 0..5 {
            risk_store
                .upsert(&assessment("ETH-PERP", i * 60_000, 10, 0.9))
                .await
                .unwrap();
        }
        let config = BacktestConfig::new(0, 4 * 60_000, 60);
        let result = run_backtest(
            &risk_store,
            &event_store,
            &[String::from("ETH-PERP")],
            &config,
        )
        .await
        .unwrap();
        assert_eq!(result.base_rate, 0.0);
        assert_eq!(result.cascades_in_window, 0);
    }

    #[tokio::test]
    async fn sweep_produces_one_point_per_grid_cell() {
        let risk_store = InMemoryRiskScoreStore::new();
        let event_store = InMemoryCascadeEventStore::new();
        risk_store
            .upsert(&assessment("SOL-PERP", 0, 50, 0.5))
            .await
            .unwrap();
        let config = BacktestConfig::new(0, 0, 60);
        let points = sweep(
            &risk_store,
            &event_store,
            &[String::from("SOL-PERP")],
            &config,
            &[40, 60],
            &[0.3, 0.7],
        )
        .await
        .unwrap();
        assert_eq!(points.len(), 4);
    }
}
