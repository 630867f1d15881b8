//! Cascade-prediction backtest driver (§4.5).

pub mod engine;
pub mod models;

pub use engine::{run_backtest, sweep};
pub use models::{BacktestConfig, BaselineMetrics, ConfusionMatrix, DetailedResult, SweepPoint};
