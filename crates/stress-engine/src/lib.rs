//! Per-symbol cascade stress scoring (§4.2).

pub mod engine;
pub mod state;

pub use engine::StressEngine;
pub use state::SymbolState;
