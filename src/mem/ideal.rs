//! Ideal (zero-latency) memory.
//!
//! Backing storage for the timed memory models and the implementation used
//! for local memories. Content is zero on first touch. With strict
//! checking enabled, reads of bytes that were never written raise an
//! illegal-access error; peeks ignore such errors.

use std::io::{self, Write};

use crate::common::{SimError, SimResult};
use crate::mem::Memory;

/// Zero-latency memory with bounds and initialization checking.
pub struct IdealMemory {
    content: Vec<u8>,
    /// Per-byte written markers, present only under strict checking.
    written: Option<Vec<bool>>,
}

impl IdealMemory {
    /// Creates a memory of `size` bytes.
    ///
    /// # Arguments
    ///
    /// * `size` - Memory size in bytes.
    /// * `strict` - When true, reads of never-written bytes fail with an
    ///   illegal-access error.
    pub fn new(size: usize, strict: bool) -> Self {
        Self {
            content: vec![0; size],
            written: if strict { Some(vec![false; size]) } else { None },
        }
    }

    /// Validates an access and updates the initialization markers.
    ///
    /// Raises `Unmapped` when the range leaves the memory, and (for checked
    /// reads) `IllegalAccess` when any touched byte was never written.
    pub fn check_access(
        &mut self,
        address: u32,
        size: u32,
        is_read: bool,
        ignore_errors: bool,
    ) -> SimResult<()> {
        let len = self.content.len() as u32;
        if address > len || size > len - address.min(len) {
            return Err(SimError::Unmapped(address));
        }

        if let Some(written) = &mut self.written {
            let range = address as usize..(address + size) as usize;
            if is_read {
                if !ignore_errors {
                    let count = range.clone().filter(|&i| !written[i]).count() as u32;
                    if count > 0 {
                        return Err(SimError::IllegalAccess(address, count));
                    }
                }
            } else {
                for i in range {
                    written[i] = true;
                }
            }
        }

        Ok(())
    }

    fn copy_out(&self, address: u32, data: &mut [u8]) {
        let start = address as usize;
        data.copy_from_slice(&self.content[start..start + data.len()]);
    }

    fn copy_in(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        self.content[start..start + data.len()].copy_from_slice(data);
    }
}

impl Memory for IdealMemory {
    fn read(&mut self, address: u32, data: &mut [u8]) -> SimResult<bool> {
        self.check_access(address, data.len() as u32, true, false)?;
        self.copy_out(address, data);
        Ok(true)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> SimResult<bool> {
        self.check_access(address, data.len() as u32, false, false)?;
        self.copy_in(address, data);
        Ok(true)
    }

    fn read_peek(&mut self, address: u32, data: &mut [u8]) -> SimResult<()> {
        self.check_access(address, data.len() as u32, true, true)?;
        self.copy_out(address, data);
        Ok(())
    }

    fn write_peek(&mut self, address: u32, data: &[u8]) -> SimResult<()> {
        self.check_access(address, data.len() as u32, false, true)?;
        self.copy_in(address, data);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn tick(&mut self) {}

    fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, " IDLE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut mem = IdealMemory::new(64, false);
        assert!(mem.write(8, &[1, 2, 3, 4]).unwrap());
        let mut buf = [0u8; 4];
        assert!(mem.read(8, &mut buf).unwrap());
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_access_is_unmapped() {
        let mut mem = IdealMemory::new(16, false);
        let mut buf = [0u8; 4];
        assert_eq!(mem.read(14, &mut buf), Err(SimError::Unmapped(14)));
        assert_eq!(mem.read(0x1000, &mut buf), Err(SimError::Unmapped(0x1000)));
    }

    #[test]
    fn strict_mode_flags_uninitialized_reads() {
        let mut mem = IdealMemory::new(16, true);
        let mut buf = [0u8; 2];
        assert_eq!(mem.read(4, &mut buf), Err(SimError::IllegalAccess(4, 2)));

        mem.write(4, &[7, 9]).unwrap();
        assert!(mem.read(4, &mut buf).unwrap());
        assert_eq!(buf, [7, 9]);
    }

    #[test]
    fn peek_ignores_initialization_errors() {
        let mut mem = IdealMemory::new(16, true);
        let mut buf = [0u8; 4];
        mem.read_peek(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }
}
