use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Tracks the last-compute timestamp per symbol so `/healthz` can report
/// staleness without asking the engine directly (§7 "health endpoint
/// reports per-subsystem status and last-computed timestamp").
#[derive(Clone, Default)]
pub struct HealthState {
    last_compute_ms: Arc<DashMap<String, i64>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, symbol: &str, timestamp_ms: i64) {
        self.last_compute_ms.insert(symbol.to_string(), timestamp_ms);
    }
}

#[derive(Serialize)]
struct SymbolHealth {
    symbol: String,
    last_compute_ms: i64,
    stale: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    symbols: Vec<SymbolHealth>,
}

struct HealthContext {
    state: HealthState,
    stale_after_ms: i64,
}

pub fn router(state: HealthState, poll_interval_secs: u64, stale_after_multiplier: u32) -> Router {
    let stale_after_ms = poll_interval_secs as i64 * 1000 * stale_after_multiplier as i64;
    let ctx = Arc::new(HealthContext { state, stale_after_ms });
    Router::new()
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn healthz(State(ctx): State<Arc<HealthContext>>) -> Json<serde_json::Value> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let symbols: Vec<SymbolHealth> = ctx
        .state
        .last_compute_ms
        .iter()
        .map(|entry| {
            let last = *entry.value();
            SymbolHealth {
                symbol: entry.key().clone(),
                last_compute_ms: last,
                stale: now_ms - last > ctx.stale_after_ms,
            }
        })
        .collect();

    let status = if symbols.iter().any(|s| s.stale) {
        "stale"
    } else {
        "ok"
    };

    Json(serde_json::to_value(HealthResponse { status, symbols }).unwrap_or_default())
}
