use serde::{Deserialize, Serialize};

/// Inputs to [`crate::engine::run_backtest`] (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_ms: i64,
    pub end_ms: i64,
    pub score_threshold: i32,
    pub confidence_threshold: f64,
    pub horizon_min: i64,
    pub page_size: usize,
}

impl BacktestConfig {
    pub fn new(start_ms: i64, end_ms: i64, horizon_min: i64) -> Self {
        Self {
            start_ms,
            end_ms,
            score_threshold: 60,
            confidence_threshold: 0.5,
            horizon_min,
            page_size: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tn: u64,
}

impl ConfusionMatrix {
    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.fn_ + self.tn
    }
}

/// `random_f1`/`naive_f1` reference points a real classifier must beat (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub random_f1: f64,
    pub naive_f1: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetailedResult {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub fpr: f64,
    pub avg_lead_time_min: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub total_points: u64,
    pub cascades_in_window: u64,
    pub prediction_rate: f64,
    pub base_rate: f64,
    pub baseline: BaselineMetrics,
}

/// One cell of a threshold sweep (§4.5 "Threshold sweep").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub score_threshold: i32,
    pub confidence_threshold: f64,
    pub result: DetailedResult,
}
