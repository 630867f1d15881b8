pub mod config;
pub mod error;
pub mod ports;
pub mod types;

pub use config::*;
pub use error::*;
pub use ports::{CascadeEventStore, RiskScoreStore};
pub use types::*;
