//! Cache subsystems.
//!
//! Three caches with distinct organizations sit between the core and main
//! memory: a pluggable data cache, a method cache holding whole functions,
//! and a block-organized stack cache. None of them owns the main memory;
//! operations that transfer data borrow it for the duration of the call.

/// Data cache variants (ideal, pass-through, LRU set-associative).
pub mod data;

/// Method cache (whole-method lines, LRU or FIFO replacement).
pub mod method;

/// Stack cache (block-aligned reserve/ensure/free with spill and fill).
pub mod stack;

pub use data::{DataCache, IdealDataCache, LruDataCache, NoDataCache};
pub use method::{IdealMethodCache, LruMethodCache, MethodCache, Replacement};
pub use stack::{BlockStackCache, IdealStackCache, StackCache};
