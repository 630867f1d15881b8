use async_trait::async_trait;
use cascade_core::SymbolSnapshot;
use cascade_detector::{LiquidationEvent, PricePoint, Side};
use dashmap::DashMap;

/// Bound on how much per-symbol price/liquidation history a feed keeps
/// in memory, matching the detector's own `vol_lookback_min` default of
/// 24h at 1-minute resolution with headroom.
const HISTORY_CAP: usize = 4_320;

/// Source of `SymbolSnapshot` batches and, for symbols the cascade
/// detector sweeps, the raw price/liquidation history it needs. Network
/// I/O to the real aggregator lives outside this crate's scope (§5
/// "Suspension points") — production deployments implement this trait
/// against their own exchange-aggregator client; this crate ships only
/// the demo generator below.
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    async fn poll(&self, symbols: &[String]) -> anyhow::Result<Vec<SymbolSnapshot>>;

    /// Price series for `symbol`, sorted by `timestamp_ms`, suitable for
    /// `cascade_detector::detect_cascades` (§4.4).
    async fn price_history(&self, symbol: &str) -> anyhow::Result<Vec<PricePoint>>;

    /// Liquidation series for `symbol`, sorted by `timestamp_ms`.
    async fn liquidation_history(&self, symbol: &str) -> anyhow::Result<Vec<LiquidationEvent>>;
}

/// Deterministic synthetic feed for local runs and smoke tests. Walks a
/// small pseudo-random sequence per symbol so repeated polls look like a
/// live, slowly drifting market without any external dependency, and
/// accumulates the same series as price/liquidation history so the
/// detector has something real to sweep.
pub struct DemoSnapshotFeed {
    seeds: DashMap<String, u64>,
    prices: DashMap<String, Vec<PricePoint>>,
    liquidations: DashMap<String, Vec<LiquidationEvent>>,
}

impl DemoSnapshotFeed {
    pub fn new() -> Self {
        Self {
            seeds: DashMap::new(),
            prices: DashMap::new(),
            liquidations: DashMap::new(),
        }
    }

    fn next(&self, symbol: &str) -> u64 {
        let mut seed = self.seeds.entry(symbol.to_string()).or_insert(0x9e3779b97f4a7c15);
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        *seed
    }

    fn record_price(&self, symbol: &str, point: PricePoint) {
        let mut series = self.prices.entry(symbol.to_string()).or_default();
        series.push(point);
        if series.len() > HISTORY_CAP {
            let overflow = series.len() - HISTORY_CAP;
            series.drain(0..overflow);
        }
    }

    fn record_liquidation(&self, symbol: &str, raw: u64, deviation_pct: f64) {
        // Only emit a liquidation row on a visible price-deviation spike,
        // so quiet periods stay quiet like a real liquidation feed.
        if deviation_pct < 0.3 {
            return;
        }
        let side = if raw % 5 == 0 { Side::Short } else { Side::Long };
        let size_usd = 100_000.0 + ((raw >> 16) % 5_000_000) as f64;
        let mut series = self.liquidations.entry(symbol.to_string()).or_default();
        series.push(LiquidationEvent {
            timestamp_ms: current_time_ms(),
            side,
            size_usd,
        });
        if series.len() > HISTORY_CAP {
            let overflow = series.len() - HISTORY_CAP;
            series.drain(0..overflow);
        }
    }
}

impl Default for DemoSnapshotFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotFeed for DemoSnapshotFeed {
    async fn poll(&self, symbols: &[String]) -> anyhow::Result<Vec<SymbolSnapshot>> {
        let now_ms = current_time_ms();
        let snapshots = symbols
            .iter()
            .map(|symbol| {
                let raw = self.next(symbol);
                let noise = ((raw >> 40) % 2001) as f64 / 1000.0 - 1.0; // [-1, 1]
                let funding = ((raw >> 20) % 21) as f64 / 10_000.0 - 0.001;
                let avg_mark_price = 50_000.0 + noise * 25.0;
                let price_deviation_pct = noise.abs() * 0.05;

                self.record_price(
                    symbol,
                    PricePoint {
                        timestamp_ms: now_ms,
                        price: avg_mark_price,
                    },
                );
                self.record_liquidation(symbol, raw, price_deviation_pct);

                SymbolSnapshot {
                    symbol: symbol.clone(),
                    timestamp_ms: now_ms,
                    oracle_price: Some(50_000.0),
                    avg_mark_price,
                    price_deviation_pct,
                    total_open_interest_usd: 10_000_000.0,
                    avg_funding_rate: funding,
                }
            })
            .collect();
        Ok(snapshots)
    }

    async fn price_history(&self, symbol: &str) -> anyhow::Result<Vec<PricePoint>> {
        Ok(self.prices.get(symbol).map(|v| v.clone()).unwrap_or_default())
    }

    async fn liquidation_history(&self, symbol: &str) -> anyhow::Result<Vec<LiquidationEvent>> {
        Ok(self.liquidations.get(symbol).map(|v| v.clone()).unwrap_or_default())
    }
}

fn current_time_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
