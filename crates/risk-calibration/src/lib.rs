//! Probability calibration for the cascade risk engine.
//!
//! Maps a raw `risk_score` onto an empirically-grounded `P(cascade)` via a
//! logistic model fit by IRLS over binned historical outcomes (§4.3), and
//! exposes confidence intervals and reliability diagnostics around that fit.

pub mod calibrator;
pub mod history;
pub mod streaming;
pub mod uncertainty;

pub use calibrator::{bin_outcomes, fit_calibration, CalibrationReport};
pub use history::{reliability_diagnostics, CalibrationRun, ReliabilityDiagnostics, SqliteCalibrationHistory};
pub use streaming::fit_from_history;
pub use uncertainty::{wald_interval, wilson_interval, Interval};
