use serde::{Deserialize, Serialize};

/// A per-symbol, per-minute aggregate produced by the (out-of-scope)
/// exchange aggregator. The engine trusts the aggregator's guarantees
/// (§6): mark/index deviation already validated, funding already
/// normalized to an 8h window, outliers already filtered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub oracle_price: Option<f64>,
    pub avg_mark_price: f64,
    /// Max cross-exchange spread over oracle, in percent. The primary
    /// stress signal fed into `spread_buf`.
    pub price_deviation_pct: f64,
    pub total_open_interest_usd: f64,
    /// Fractional, 8h-normalized funding rate (not a percentage).
    pub avg_funding_rate: f64,
}

/// Directional squeeze a cascade would unwind: longs get liquidated into a
/// falling market (`LongSqueeze`) or shorts get liquidated into a rising
/// one (`ShortSqueeze`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LongSqueeze,
    ShortSqueeze,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::LongSqueeze => "long_squeeze",
            Direction::ShortSqueeze => "short_squeeze",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Elevated => "elevated",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Whether this level warrants an [`Alert`] broadcast (§6).
    pub fn is_alertable(&self) -> bool {
        matches!(self, RiskLevel::Elevated | RiskLevel::High | RiskLevel::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "1-4h")]
    OneToFourHours,
    #[serde(rename = "4-12h")]
    FourToTwelveHours,
    #[serde(rename = "12-24h")]
    TwelveToTwentyFourHours,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::OneToFourHours => "1-4h",
            TimeWindow::FourToTwelveHours => "4-12h",
            TimeWindow::TwelveToTwentyFourHours => "12-24h",
        }
    }
}

/// A single diagnostic triple surfaced to the UI explaining a risk score's
/// composition (e.g. `("z_score", 2.4, "warm")`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub value: f64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub direction: Direction,
    pub probability: f64,
    pub estimated_impact_usd: f64,
    pub time_window: TimeWindow,
    pub trigger_price: f64,
    pub trigger_distance_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub factors: Vec<RiskFactor>,
    pub prediction: Option<Prediction>,
}

/// Ground-truth cascade event identified by the detector or by historical
/// backfill. Identity key is `(symbol, direction, start_time_ms)`; upserts
/// against this key are idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeEvent {
    pub symbol: String,
    pub direction: Direction,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub price_change_pct: f64,
    pub liquidation_volume_usd: f64,
}

impl CascadeEvent {
    /// Stable text key used for persistence upserts, per §6.
    pub fn identity_key(&self) -> String {
        format!("{}:{}:{}", self.symbol, self.direction.as_str(), self.start_time_ms)
    }
}

/// Packed 2x2 covariance of the logistic fit, `[Var a, Cov(a,b), Var b]`.
/// Present only when the fit converged on a well-conditioned Jacobian.
pub type PackedCovariance = [f64; 3];

/// Parameters of the logistic calibration model `P(y=1|s) = sigma(a + b*s)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub intercept: f64,
    pub coefficient: f64,
    pub covariance: Option<PackedCovariance>,
}

impl CalibrationParams {
    pub fn new(intercept: f64, coefficient: f64) -> Self {
        Self {
            intercept,
            coefficient,
            covariance: None,
        }
    }
}

/// Binned empirical outcome counts for one integer risk score (0..=100).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub positive: u64,
    pub total: u64,
}

/// One symbol's contribution to an [`Alert`] batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEntry {
    pub symbol: String,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub prediction: Option<Prediction>,
}

/// Alert broadcast when one or more assessments in a batch reach
/// `elevated` or above (§6). `level` is the highest level present in
/// `symbols`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: RiskLevel,
    pub symbols: Vec<AlertEntry>,
}
