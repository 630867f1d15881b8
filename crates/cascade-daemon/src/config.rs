use std::env;

use anyhow::{Context, Result};
use cascade_core::{
    CalibrationParams, ColdStartThresholds, EngineConfig, ThresholdPercentiles,
    VolMultipliers, VolRegimePercentiles,
};

/// Daemon-level configuration, loaded from the environment and layered on
/// top of the library's [`EngineConfig`] (§6 "Config surface").
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub engine: EngineConfig,
    pub watchlist: Vec<String>,
    pub database_url: String,
    pub poll_interval_secs: u64,
    pub health_bind_addr: String,
    pub stale_after_multiplier: u32,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        let engine = EngineConfig {
            history_length: parse_env("HISTORY_LENGTH", 43_200)?,
            min_history_length: parse_env("MIN_HISTORY_LENGTH", 1_440)?,
            cold_start_thresholds: ColdStartThresholds {
                elevated: parse_env("COLD_START_ELEVATED", 0.15)?,
                high: parse_env("COLD_START_HIGH", 0.30)?,
                critical: parse_env("COLD_START_CRITICAL", 0.60)?,
            },
            threshold_percentiles: ThresholdPercentiles {
                elevated: parse_env("THRESHOLD_PERCENTILE_ELEVATED", 0.90)?,
                high: parse_env("THRESHOLD_PERCENTILE_HIGH", 0.95)?,
                critical: parse_env("THRESHOLD_PERCENTILE_CRITICAL", 0.99)?,
            },
            vol_regime_percentiles: VolRegimePercentiles {
                low_high: parse_env("VOL_REGIME_LOW_HIGH", 0.33)?,
                high_low: parse_env("VOL_REGIME_HIGH_LOW", 0.67)?,
            },
            vol_multipliers: VolMultipliers {
                low: parse_env("VOL_MULTIPLIER_LOW", 0.75)?,
                medium: parse_env("VOL_MULTIPLIER_MEDIUM", 1.0)?,
                high: parse_env("VOL_MULTIPLIER_HIGH", 1.5)?,
            },
            vol_lookback: parse_env("VOL_LOOKBACK", 4_320)?,
            enable_liquidity_adjustment: parse_env("ENABLE_LIQUIDITY_ADJUSTMENT", false)?,
            calibration_prior: CalibrationParams::new(
                parse_env("CALIBRATION_INTERCEPT", -7.0)?,
                parse_env("CALIBRATION_COEFFICIENT", 0.1)?,
            ),
            z_score_scaling: parse_env("Z_SCORE_SCALING", 20.0)?,
            prediction_min_score: parse_env("PREDICTION_MIN_SCORE", 40)?,
        };
        engine
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid engine config: {e}"))?;

        let watchlist = env::var("WATCHLIST")
            .unwrap_or_else(|_| "BTC-PERP,ETH-PERP,SOL-PERP".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            engine,
            watchlist,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite::memory:".to_string()),
            poll_interval_secs: parse_env("POLL_INTERVAL_SECONDS", 30)?,
            health_bind_addr: env::var("HEALTH_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8090".to_string()),
            stale_after_multiplier: parse_env("STALE_AFTER_MULTIPLIER", 2)?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} is not valid")),
        Err(_) => Ok(default),
    }
}
