use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

/// A mark-price observation, sorted by `timestamp_ms` before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub price: f64,
}

/// A single liquidation fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub timestamp_ms: i64,
    pub side: Side,
    pub size_usd: f64,
}

/// Sliding-window cascade detection parameters (§4.4, all defaults).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    pub window_min: i64,
    pub step_min: i64,
    pub sigma_multiplier: f64,
    pub liq_percentile: f64,
    pub min_liq_usd: f64,
    pub dominance_ratio: f64,
    pub vol_lookback_min: i64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            window_min: 5,
            step_min: 1,
            sigma_multiplier: 3.0,
            liq_percentile: 0.95,
            min_liq_usd: 100_000.0,
            dominance_ratio: 0.65,
            vol_lookback_min: 24 * 60,
        }
    }
}
