//! Simulation harness.
//!
//! The orchestrator (`Simulator`), the flat-image loader, and the symbol
//! map used by the basic-block trace.

/// Flat binary image loading.
pub mod loader;

/// The top-level simulator and its run loop.
pub mod simulator;

/// Address-to-name symbol map.
pub mod symbols;

pub use simulator::{build_simulator, DebugFmt, Simulator};
pub use symbols::SymbolMap;
