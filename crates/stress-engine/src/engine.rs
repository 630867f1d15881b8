use std::sync::RwLock;

use dashmap::DashMap;
use numeric_kit::sigmoid;

use cascade_core::{
    CalibrationParams, Direction, EngineConfig, Prediction, RiskAssessment, RiskFactor, RiskLevel,
    SymbolSnapshot, TimeWindow,
};

use crate::state::SymbolState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolRegime {
    Low,
    Medium,
    High,
}

impl VolRegime {
    fn multiplier(self, mults: &cascade_core::VolMultipliers) -> f64 {
        match self {
            VolRegime::Low => mults.low,
            VolRegime::Medium => mults.medium,
            VolRegime::High => mults.high,
        }
    }
}

/// Stateful per-symbol cascade stress analyzer (§4.2).
///
/// Owns one [`SymbolState`] per symbol in a [`DashMap`] so that analyzing
/// distinct symbols concurrently never contends on a shared lock; only the
/// calibration prior is shared, behind an `RwLock` swapped wholesale on
/// replacement (§3, §5).
pub struct StressEngine {
    config: EngineConfig,
    states: DashMap<String, SymbolState>,
    calibration: RwLock<CalibrationParams>,
}

impl StressEngine {
    pub fn new(config: EngineConfig) -> Self {
        let calibration = config.calibration_prior;
        Self {
            config,
            states: DashMap::new(),
            calibration: RwLock::new(calibration),
        }
    }

    /// Replace the calibration prior with a freshly fitted one. Whole-value
    /// swap, never a partial update (§3).
    pub fn set_calibration(&self, params: CalibrationParams) {
        if let Ok(mut guard) = self.calibration.write() {
            *guard = params;
        }
    }

    pub fn calibration(&self) -> CalibrationParams {
        self.calibration
            .read()
            .map(|g| *g)
            .unwrap_or(self.config.calibration_prior)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze a batch of snapshots (any mix of symbols), producing one
    /// `RiskAssessment` per snapshot that was not dropped for being
    /// out-of-order. Never panics or returns an error for malformed input
    /// (§4.2, §7).
    pub fn analyze(&self, batch: &[SymbolSnapshot]) -> Vec<RiskAssessment> {
        batch
            .iter()
            .filter_map(|snapshot| self.analyze_one(snapshot))
            .collect()
    }

    /// Filter a batch of assessments down to those carrying a prediction.
    pub fn to_predictions(assessments: &[RiskAssessment]) -> Vec<Prediction> {
        assessments.iter().filter_map(|a| a.prediction.clone()).collect()
    }

    fn analyze_one(&self, snapshot: &SymbolSnapshot) -> Option<RiskAssessment> {
        let mut state = self
            .states
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| SymbolState::new(self.config.history_length));

        if let Some(last) = state.last_timestamp_ms {
            if snapshot.timestamp_ms <= last {
                tracing::warn!(
                    symbol = %snapshot.symbol,
                    timestamp_ms = snapshot.timestamp_ms,
                    last_timestamp_ms = last,
                    "dropping out-of-order snapshot"
                );
                return None;
            }
        }

        let s = numeric_kit::finite_or(snapshot.price_deviation_pct, 0.0).max(0.0);
        state.spread_buf.push(s);

        let mean = state.spread_buf.mean();
        let stddev = state.spread_buf.stddev();
        let z = if stddev > 0.0 { (s - mean) / stddev } else { 0.0 };
        state.z_score_buf.push(z);

        if self.config.enable_liquidity_adjustment {
            state
                .oi_buf
                .push(numeric_kit::finite_or(snapshot.total_open_interest_usd, 0.0));
        }

        let warm = state.spread_buf.len() >= self.config.min_history_length;

        let mut risk_score = if warm {
            self.warm_score(z)
        } else {
            self.cold_score(s)
        };

        let (elevated, high, critical, regime) = if warm {
            self.dynamic_thresholds(&state)
        } else {
            (
                self.config.cold_start_thresholds.elevated,
                self.config.cold_start_thresholds.high,
                self.config.cold_start_thresholds.critical,
                VolRegime::Medium,
            )
        };

        let risk_level = Self::classify_level(s, elevated, high, critical, risk_score);

        if self.config.enable_liquidity_adjustment && state.oi_buf.len() >= 60 {
            let median_oi = state.oi_buf.quantile(0.5);
            if median_oi > 0.0 {
                let current_oi = numeric_kit::finite_or(snapshot.total_open_interest_usd, 0.0).max(0.0);
                let factor = (current_oi / median_oi).sqrt();
                risk_score = (risk_score as f64 * factor).round().clamp(0.0, 100.0) as i32;
            }
        }

        let params = self.calibration();
        let confidence = sigmoid(params.intercept + params.coefficient * risk_score as f64);

        let prediction = if risk_score >= self.config.prediction_min_score {
            Some(self.build_prediction(snapshot, risk_score, z, &params))
        } else {
            None
        };

        let factors = vec![
            RiskFactor {
                name: "z_score".to_string(),
                value: z,
                note: if warm { "warm".to_string() } else { "cold".to_string() },
            },
            RiskFactor {
                name: "vol_regime".to_string(),
                value: match regime {
                    VolRegime::Low => 0.0,
                    VolRegime::Medium => 1.0,
                    VolRegime::High => 2.0,
                },
                note: "0=low 1=medium 2=high".to_string(),
            },
        ];

        state.last_timestamp_ms = Some(snapshot.timestamp_ms);

        Some(RiskAssessment {
            symbol: snapshot.symbol.clone(),
            timestamp_ms: snapshot.timestamp_ms,
            risk_score,
            risk_level,
            confidence,
            factors,
            prediction,
        })
    }

    fn cold_score(&self, s: f64) -> i32 {
        let t = &self.config.cold_start_thresholds;
        let score = if s < t.elevated {
            numeric_kit::lerp(s, 0.0, 0.0, t.elevated, 40.0)
        } else if s < t.high {
            numeric_kit::lerp(s, t.elevated, 40.0, t.high, 60.0)
        } else if s < t.critical {
            numeric_kit::lerp(s, t.high, 60.0, t.critical, 80.0)
        } else {
            // Unbounded tail above `critical`: extend the last segment's
            // slope rather than clamping flat at 80, then clip to 100.
            let slope = 20.0 / (t.critical - t.high).max(f64::EPSILON);
            80.0 + slope * (s - t.critical)
        };
        numeric_kit::round_half_up(score).clamp(0.0, 100.0) as i32
    }

    fn warm_score(&self, z: f64) -> i32 {
        let raw = numeric_kit::round_half_up(z * self.config.z_score_scaling);
        raw.clamp(0.0, 100.0) as i32
    }

    /// Dynamic (warm) thresholds and the volatility regime used to scale
    /// them. Per the source behavior: the volatility-of-stress series is
    /// compared against tercile quantiles of `z_score_buf` itself (see
    /// DESIGN.md for why this reading was kept over classifying against
    /// quantiles of the vol-of-stress series).
    fn dynamic_thresholds(&self, state: &SymbolState) -> (f64, f64, f64, VolRegime) {
        let tail = state.z_score_buf.tail(self.config.vol_lookback);
        let vol_of_stress = stddev_of(&tail);

        let vp = &self.config.vol_regime_percentiles;
        let low_cut = state.z_score_buf.quantile(vp.low_high);
        let high_cut = state.z_score_buf.quantile(vp.high_low);

        let regime = if vol_of_stress < low_cut {
            VolRegime::Low
        } else if vol_of_stress > high_cut {
            VolRegime::High
        } else {
            VolRegime::Medium
        };

        let mult = regime.multiplier(&self.config.vol_multipliers);
        let p = &self.config.threshold_percentiles;
        let elevated = state.spread_buf.quantile(p.elevated) * mult;
        let high = state.spread_buf.quantile(p.high) * mult;
        let critical = state.spread_buf.quantile(p.critical) * mult;
        (elevated, high, critical, regime)
    }

    fn classify_level(s: f64, elevated: f64, high: f64, critical: f64, risk_score: i32) -> RiskLevel {
        if s >= critical {
            RiskLevel::Critical
        } else if s >= high {
            RiskLevel::High
        } else if s >= elevated {
            RiskLevel::Elevated
        } else if risk_score >= 20 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    fn build_prediction(
        &self,
        snapshot: &SymbolSnapshot,
        risk_score: i32,
        z: f64,
        params: &CalibrationParams,
    ) -> Prediction {
        let direction = if snapshot.avg_funding_rate > 0.0 {
            Direction::LongSqueeze
        } else {
            Direction::ShortSqueeze
        };

        let probability =
            sigmoid(params.intercept + params.coefficient * risk_score as f64).clamp(0.05, 0.95);

        let severity = risk_score as f64 / 100.0;
        let liquidation_pct = 0.03 + severity * 0.07;
        let total_oi = numeric_kit::finite_or(snapshot.total_open_interest_usd, 0.0);
        let estimated_impact_usd = if total_oi > 0.0 { total_oi * liquidation_pct } else { 0.0 };

        let trigger_distance_pct = (6.0 - severity * 4.0).max(2.0);

        let base_price = snapshot.oracle_price.unwrap_or(snapshot.avg_mark_price);
        let trigger_price = if base_price.is_finite() && base_price > 0.0 {
            match direction {
                Direction::LongSqueeze => base_price * (1.0 - trigger_distance_pct / 100.0),
                Direction::ShortSqueeze => base_price * (1.0 + trigger_distance_pct / 100.0),
            }
        } else {
            0.0
        };

        let time_window = if z.abs() >= 3.0 {
            TimeWindow::OneToFourHours
        } else if z.abs() >= 2.0 {
            TimeWindow::FourToTwelveHours
        } else {
            TimeWindow::TwelveToTwentyFourHours
        };

        Prediction {
            direction,
            probability,
            estimated_impact_usd,
            time_window,
            trigger_price,
            trigger_distance_pct,
        }
    }
}

fn stddev_of(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.max(0.0).sqrt()
}
