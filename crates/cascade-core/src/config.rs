use serde::{Deserialize, Serialize};

use crate::types::CalibrationParams;

/// Cold-start (fixed) stress thresholds, in percent of `price_deviation_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColdStartThresholds {
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for ColdStartThresholds {
    fn default() -> Self {
        Self {
            elevated: 0.15,
            high: 0.30,
            critical: 0.60,
        }
    }
}

/// Percentiles of `spread_buf` used to derive dynamic (warm) thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPercentiles {
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for ThresholdPercentiles {
    fn default() -> Self {
        Self {
            elevated: 0.90,
            high: 0.95,
            critical: 0.99,
        }
    }
}

/// Tercile split points used to classify the volatility-of-stress regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolRegimePercentiles {
    pub low_high: f64,
    pub high_low: f64,
}

impl Default for VolRegimePercentiles {
    fn default() -> Self {
        Self {
            low_high: 0.33,
            high_low: 0.67,
        }
    }
}

/// Per-regime multipliers applied to the dynamic thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolMultipliers {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for VolMultipliers {
    fn default() -> Self {
        Self {
            low: 0.75,
            medium: 1.0,
            high: 1.5,
        }
    }
}

/// Full configuration surface for the stress engine, per §6. Library
/// crates take this as an explicit value; only `cascade-daemon` reads it
/// from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub history_length: usize,
    pub min_history_length: usize,
    pub cold_start_thresholds: ColdStartThresholds,
    pub threshold_percentiles: ThresholdPercentiles,
    pub vol_regime_percentiles: VolRegimePercentiles,
    pub vol_multipliers: VolMultipliers,
    pub vol_lookback: usize,
    pub enable_liquidity_adjustment: bool,
    pub calibration_prior: CalibrationParams,
    pub z_score_scaling: f64,
    pub prediction_min_score: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_length: 43_200,
            min_history_length: 1_440,
            cold_start_thresholds: ColdStartThresholds::default(),
            threshold_percentiles: ThresholdPercentiles::default(),
            vol_regime_percentiles: VolRegimePercentiles::default(),
            vol_multipliers: VolMultipliers::default(),
            vol_lookback: 4_320,
            enable_liquidity_adjustment: false,
            // §6's config surface states -7/0.1 as the prior; see
            // DESIGN.md for why this value wins over §3's -5/0.1 example.
            calibration_prior: CalibrationParams::new(-7.0, 0.1),
            z_score_scaling: 20.0,
            prediction_min_score: 40,
        }
    }
}

impl EngineConfig {
    /// Reject configurations that would make the engine behave
    /// incoherently (e.g. inverted thresholds). Called once at startup,
    /// not on the hot path.
    pub fn validate(&self) -> Result<(), String> {
        if self.history_length == 0 {
            return Err("history_length must be > 0".into());
        }
        if self.min_history_length > self.history_length {
            return Err("min_history_length must be <= history_length".into());
        }
        let c = &self.cold_start_thresholds;
        if !(c.elevated < c.high && c.high < c.critical) {
            return Err("cold_start_thresholds must be strictly increasing".into());
        }
        let p = &self.threshold_percentiles;
        if !(p.elevated < p.high && p.high < p.critical) {
            return Err("threshold_percentiles must be strictly increasing".into());
        }
        if self.z_score_scaling <= 0.0 {
            return Err("z_score_scaling must be positive".into());
        }
        Ok(())
    }
}
