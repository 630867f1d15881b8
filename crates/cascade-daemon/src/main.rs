use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cascade_backtest::BacktestConfig;
use cascade_core::ports::memory::{InMemoryCascadeEventStore, InMemoryRiskScoreStore};
use cascade_core::{CascadeEventStore, RiskScoreStore};
use cascade_detector::DetectorParams;
use risk_calibration::SqliteCalibrationHistory;
use stress_engine::StressEngine;

/// Run a detector sweep + ground-truth backtest evaluation once every this
/// many ticks, rather than on every tick, since both scan accumulated
/// history and are comparatively expensive (§4.4, §4.5).
const EVALUATION_INTERVAL_TICKS: u64 = 10;

mod alerts;
mod config;
mod feed;
mod health;
mod scheduler;

use alerts::AlertBroadcaster;
use config::DaemonConfig;
use feed::{DemoSnapshotFeed, SnapshotFeed};
use health::HealthState;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("starting cascade risk engine");

    let config = DaemonConfig::from_env()?;
    tracing::info!(
        watchlist = ?config.watchlist,
        poll_interval_secs = config.poll_interval_secs,
        history_length = config.engine.history_length,
        min_history_length = config.engine.min_history_length,
        prediction_min_score = config.engine.prediction_min_score,
        "configuration loaded and validated"
    );

    sqlx::any::install_default_drivers();
    let db_pool = sqlx::AnyPool::connect(&config.database_url).await?;
    let calibration_history = SqliteCalibrationHistory::new(db_pool.clone());
    calibration_history.migrate().await?;
    tracing::info!("calibration history store ready");

    let risk_store: Arc<dyn RiskScoreStore> = Arc::new(InMemoryRiskScoreStore::new());
    let event_store: Arc<dyn CascadeEventStore> = Arc::new(InMemoryCascadeEventStore::new());

    let engine = Arc::new(StressEngine::new(config.engine.clone()));
    if let Some(params) = calibration_history.latest_params().await? {
        engine.set_calibration(params);
        tracing::info!("restored calibration params from history");
    }

    let feed: Arc<dyn SnapshotFeed> = Arc::new(DemoSnapshotFeed::new());
    let health_state = HealthState::new();
    let alert_bus = AlertBroadcaster::new(256);

    let health_router = health::router(
        health_state.clone(),
        config.poll_interval_secs,
        config.stale_after_multiplier,
    );
    let health_listener = tokio::net::TcpListener::bind(&config.health_bind_addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_router).await {
            tracing::error!(error = %e, "health server exited");
        }
    });
    tracing::info!(addr = %config.health_bind_addr, "health endpoint listening");

    let watchlist = config.watchlist.clone();
    let scheduler = Scheduler::new(Duration::from_secs(config.poll_interval_secs));
    let detector_params = DetectorParams::default();
    let tick_no = Arc::new(AtomicU64::new(0));

    scheduler
        .run(|| {
            let watchlist = watchlist.clone();
            let feed = Arc::clone(&feed);
            let engine = Arc::clone(&engine);
            let risk_store = Arc::clone(&risk_store);
            let event_store = Arc::clone(&event_store);
            let health_state = health_state.clone();
            let alert_bus = alert_bus.clone();
            let tick_no = Arc::clone(&tick_no);
            let detector_params = detector_params;
            async move {
                let snapshots = match feed.poll(&watchlist).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(error = %e, "snapshot feed poll failed, skipping tick");
                        return;
                    }
                };

                let assessments = engine.analyze(&snapshots);
                for assessment in &assessments {
                    if let Err(e) = risk_store.upsert(assessment).await {
                        tracing::warn!(symbol = %assessment.symbol, error = %e, "failed to persist risk assessment");
                        continue;
                    }
                    health_state.record(&assessment.symbol, assessment.timestamp_ms);
                }

                let alerted = alert_bus.publish(&assessments);
                tracing::info!(
                    analyzed = assessments.len(),
                    alerted,
                    "tick complete"
                );

                if tick_no.fetch_add(1, Ordering::Relaxed) % EVALUATION_INTERVAL_TICKS != 0 {
                    return;
                }

                let mut events_found = 0usize;
                for symbol in &watchlist {
                    let prices = match feed.price_history(symbol).await {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(symbol = %symbol, error = %e, "failed to load price history");
                            continue;
                        }
                    };
                    let liquidations = match feed.liquidation_history(symbol).await {
                        Ok(l) => l,
                        Err(e) => {
                            tracing::warn!(symbol = %symbol, error = %e, "failed to load liquidation history");
                            continue;
                        }
                    };
                    let detected = cascade_detector::detect_cascades(symbol, &prices, &liquidations, &detector_params);
                    for event in &detected {
                        if let Err(e) = event_store.upsert(event).await {
                            tracing::warn!(symbol = %symbol, error = %e, "failed to persist cascade event");
                        }
                    }
                    events_found += detected.len();
                }
                tracing::info!(events_found, "periodic cascade detector sweep complete");

                let now_ms = snapshots.iter().map(|s| s.timestamp_ms).max().unwrap_or(0);
                let backtest_config = BacktestConfig::new(0, now_ms, 60);
                match cascade_backtest::run_backtest(&*risk_store, &*event_store, &watchlist, &backtest_config).await {
                    Ok(result) => tracing::info!(
                        precision = result.precision,
                        recall = result.recall,
                        f1 = result.f1,
                        cascades_in_window = result.cascades_in_window,
                        "periodic backtest evaluation"
                    ),
                    Err(e) => tracing::warn!(error = %e, "periodic backtest evaluation failed"),
                }
            }
        })
        .await?;

    tracing::info!("cascade risk engine shut down");
    Ok(())
}
