//! Sliding-window price/liquidation cascade detection (§4.4).

pub mod detector;
pub mod types;

pub use detector::detect_cascades;
pub use types::{DetectorParams, LiquidationEvent, PricePoint, Side};
