//! Simulation error definitions.
//!
//! This module defines the error handling for the simulator. It provides:
//! 1. **Error Representation:** All fatal conditions a simulated program can
//!    trigger, from illegal instructions to cache policy violations.
//! 2. **Fatal Wrapping:** The orchestrator annotates an error with the cycle
//!    and program counter at which it was raised.
//! 3. **Error Handling:** Integration with the standard Rust error traits
//!    for top-level reporting.

use std::fmt;

/// Result type used throughout the simulator core.
pub type SimResult<T> = Result<T, SimError>;

/// Errors signalled by the simulated processor.
///
/// Every variant is fatal to the current simulation run. Errors are raised
/// synchronously in the middle of a pipeline stage and propagate to the
/// orchestrator, which ends the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// Normal termination: `ret` to address 0.
    ///
    /// Carries the program's exit code (the value of r1 at the halt).
    Halt(u32),

    /// The decoder failed to match an instruction word, or an instruction
    /// failed a semantic precondition. Carries the offending word.
    Illegal(u32),

    /// An address outside the physical memory range was accessed.
    Unmapped(u32),

    /// A read touched uninitialized memory bytes while strict checking is
    /// enabled. Carries the faulting address and the number of
    /// uninitialized bytes.
    IllegalAccess(u32, u32),

    /// A stack-cache operation violated the cache's size policy.
    StackExceeded(&'static str),

    /// A method's size is zero or exceeds the method-cache capacity.
    /// Carries the method's base address.
    CodeExceeded(u32),

    /// The program counter left the currently resident method.
    /// Carries the base address of that method.
    IllegalPc(u32),

    /// A memory access address was not a multiple of the access width.
    Unaligned(u32),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Halt(code) => write!(f, "Halt called: exit code {}", code),
            SimError::Illegal(iw) => write!(f, "Illegal instruction: {:#010x}", iw),
            SimError::Unmapped(addr) => write!(f, "Unmapped memory access: {:#010x}", addr),
            SimError::IllegalAccess(addr, count) => write!(
                f,
                "Illegal memory access: read of {:#010x} touches {} uninitialized bytes",
                addr, count
            ),
            SimError::StackExceeded(msg) => write!(f, "Stack size exceeded: {}", msg),
            SimError::CodeExceeded(addr) => {
                write!(f, "Method cache size exceeded: method {:#010x}", addr)
            }
            SimError::IllegalPc(base) => write!(
                f,
                "Program counter outside current method: base {:#010x}",
                base
            ),
            SimError::Unaligned(addr) => write!(f, "Unaligned memory access: {:#010x}", addr),
        }
    }
}

impl std::error::Error for SimError {}

/// A simulation error annotated with the cycle and PC at which it occurred.
///
/// Produced by the orchestrator when a stage function fails; nothing is
/// recovered locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FatalError {
    /// The underlying error.
    pub error: SimError,
    /// Program counter at the time the error was raised.
    pub pc: u32,
    /// Cycle counter at the time the error was raised.
    pub cycle: u64,
}

impl FatalError {
    /// Returns the program exit code if this error is a normal halt.
    pub fn exit_code(&self) -> Option<u32> {
        match self.error {
            SimError::Halt(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle {}: {} at {:#010x}",
            self.cycle, self.error, self.pc
        )
    }
}

impl std::error::Error for FatalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_exit_code_is_extracted() {
        let fatal = FatalError {
            error: SimError::Halt(5),
            pc: 0x20,
            cycle: 7,
        };
        assert_eq!(fatal.exit_code(), Some(5));
    }

    #[test]
    fn non_halt_has_no_exit_code() {
        let fatal = FatalError {
            error: SimError::Unaligned(3),
            pc: 0,
            cycle: 0,
        };
        assert_eq!(fatal.exit_code(), None);
    }
}
