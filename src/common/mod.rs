//! Common types and error handling shared across the simulator.
//!
//! This module provides the fundamental word types, big-endian conversion
//! helpers, and the simulation error taxonomy used by every other
//! component.

/// Simulation error types and fatal-error wrapping.
pub mod error;

/// Word types, endian conversion, and size/alignment helpers.
pub mod types;

pub use error::{FatalError, SimError, SimResult};
pub use types::{ceil_div, sign_extend, MemSize, NUM_SLOTS};
