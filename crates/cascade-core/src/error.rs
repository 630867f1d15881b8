use thiserror::Error;

/// Error taxonomy for the cascade risk engine.
///
/// Per-snapshot data-shape problems (missing fields, insufficient history,
/// out-of-order timestamps) are never represented here: they degrade to a
/// neutral substitution or a dropped update and are logged, not surfaced as
/// an `Err`. This enum covers failures that are genuinely exceptional:
/// malformed configuration, storage I/O, and calibration numerical collapse
/// severe enough that the caller needs to know no fit happened.
#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("calibration did not converge: {0}")]
    CalibrationFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
