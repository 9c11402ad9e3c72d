//! Execution units of the core.
//!
//! Contains the pure ALU computation functions and the cache subsystems
//! (data cache, method cache, stack cache).

/// ALU computation functions.
pub mod alu;

/// Cache implementations.
pub mod cache;
