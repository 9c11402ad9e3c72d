//! Stack cache.
//!
//! A block-organized cache on top of a shallow in-memory stack. The
//! `reserve`, `ensure` and `free` operations manage whole blocks; reserve
//! spills the oldest resident blocks to main memory when the cache
//! overflows, ensure fills previously spilled blocks back in. Spills and
//! fills run as block-aligned bursts against the memory stack-top pointer,
//! which grows downward.
//!
//! Loads and stores address the logical stack from the top: offset 0 is
//! the topmost byte.

use std::io::{self, Write};

use crate::common::{ceil_div, SimError, SimResult};
use crate::mem::Memory;

/// Transfer phases of the block stack cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Spill,
    Fill,
}

/// Contract of a stack cache.
///
/// The control operations take the stack-top special register by reference
/// and update it as blocks move between the cache and memory.
pub trait StackCache {
    /// Reserves `size` bytes on top of the stack, spilling older blocks to
    /// memory when the cache overflows.
    ///
    /// Returns `Ok(false)` while a spill is still in progress.
    fn reserve(&mut self, mem: &mut dyn Memory, size: u32, stack_top: &mut u32)
        -> SimResult<bool>;

    /// Pops `size` bytes from the stack, releasing spilled blocks without
    /// transferring them.
    fn free(&mut self, mem: &mut dyn Memory, size: u32, stack_top: &mut u32) -> SimResult<bool>;

    /// Guarantees `size` bytes are resident, filling spilled blocks from
    /// memory as needed.
    ///
    /// Returns `Ok(false)` while a fill is still in progress.
    fn ensure(&mut self, mem: &mut dyn Memory, size: u32, stack_top: &mut u32)
        -> SimResult<bool>;

    /// Reads from the logical stack; offset 0 is the topmost byte.
    fn read(&mut self, offset: u32, data: &mut [u8]) -> SimResult<bool>;

    /// Writes to the logical stack; offset 0 is the topmost byte.
    fn write(&mut self, offset: u32, data: &[u8]) -> SimResult<bool>;

    /// Advances the cache by one cycle.
    fn tick(&mut self) {}

    /// Current size of the stack cache content in bytes.
    fn size_bytes(&self) -> u32;

    /// Traces occupancy changes.
    fn trace(&mut self, cycle: u64, out: &mut dyn Write) -> io::Result<()> {
        let _ = (cycle, out);
        Ok(())
    }

    /// Prints the internal state for debugging.
    fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        let _ = out;
        Ok(())
    }

    /// Prints accumulated statistics.
    fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        let _ = out;
        Ok(())
    }
}

/// An ideal stack cache with unbounded space.
///
/// Content grows at the end of the vector; the end is the top of the
/// stack.
pub struct IdealStackCache {
    content: Vec<u8>,
}

impl IdealStackCache {
    /// Creates an empty ideal stack cache.
    pub fn new() -> Self {
        Self {
            content: Vec::new(),
        }
    }

    fn grow(&mut self, bytes: u32) {
        self.content.resize(self.content.len() + bytes as usize, 0);
    }

    fn shrink(&mut self, bytes: u32) -> SimResult<()> {
        if self.content.len() < bytes as usize {
            return Err(SimError::StackExceeded("freeing more than is allocated"));
        }
        self.content.truncate(self.content.len() - bytes as usize);
        Ok(())
    }

    fn check_range(&self, offset: u32, size: u32) -> SimResult<usize> {
        let len = self.content.len() as u64;
        let end = offset as u64 + size as u64;
        if len < end {
            return Err(SimError::StackExceeded("access beyond the stack top"));
        }
        Ok((len - end) as usize)
    }
}

impl Default for IdealStackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StackCache for IdealStackCache {
    fn reserve(&mut self, _mem: &mut dyn Memory, size: u32, _stack_top: &mut u32)
        -> SimResult<bool> {
        self.grow(size);
        Ok(true)
    }

    fn free(&mut self, _mem: &mut dyn Memory, size: u32, _stack_top: &mut u32)
        -> SimResult<bool> {
        self.shrink(size)?;
        Ok(true)
    }

    fn ensure(&mut self, _mem: &mut dyn Memory, _size: u32, _stack_top: &mut u32)
        -> SimResult<bool> {
        Ok(true)
    }

    fn read(&mut self, offset: u32, data: &mut [u8]) -> SimResult<bool> {
        let start = self.check_range(offset, data.len() as u32)?;
        data.copy_from_slice(&self.content[start..start + data.len()]);
        Ok(true)
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> SimResult<bool> {
        let start = self.check_range(offset, data.len() as u32)?;
        self.content[start..start + data.len()].copy_from_slice(data);
        Ok(true)
    }

    fn size_bytes(&self) -> u32 {
        self.content.len() as u32
    }

    fn trace(&mut self, cycle: u64, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "Cyc: {:020} Total: {:010} Cache: {:010}",
            cycle,
            self.content.len(),
            self.content.len()
        )
    }
}

/// Statistics of the block stack cache.
#[derive(Default)]
pub struct StackCacheStats {
    pub blocks_reserved_total: u64,
    pub max_blocks_allocated: u32,
    pub max_blocks_reserved: u32,
    pub blocks_spilled: u64,
    pub max_blocks_spilled: u32,
    pub blocks_filled: u64,
    pub max_blocks_filled: u32,
    pub free_empty: u64,
    pub read_accesses: u64,
    pub bytes_read: u64,
    pub write_accesses: u64,
    pub bytes_written: u64,
}

/// A block-organized stack cache with bounded total occupancy.
///
/// The cache holds up to `num_blocks` blocks; reserved plus spilled blocks
/// never exceed `total_blocks`. The content vector mirrors spilled bytes
/// at its bottom so fills need no data copy.
pub struct BlockStackCache {
    content: IdealStackCache,
    block_bytes: u32,
    num_blocks: u32,
    total_blocks: u32,

    phase: Phase,
    /// Spill/fill staging buffer.
    buffer: Vec<u8>,
    transfer_blocks: u32,
    reserved_blocks: u32,
    spilled_blocks: u32,

    traced_total: u32,
    traced_reserved: u32,

    pub stats: StackCacheStats,
}

impl BlockStackCache {
    /// Creates a block stack cache.
    ///
    /// # Arguments
    ///
    /// * `num_blocks` - Cache capacity in blocks.
    /// * `block_bytes` - Block size in bytes.
    /// * `total_blocks` - Bound on reserved plus spilled blocks.
    pub fn new(num_blocks: u32, block_bytes: u32, total_blocks: u32) -> Self {
        Self {
            content: IdealStackCache::new(),
            block_bytes,
            num_blocks,
            total_blocks,
            phase: Phase::Idle,
            buffer: vec![0; (num_blocks * block_bytes) as usize],
            transfer_blocks: 0,
            reserved_blocks: 0,
            spilled_blocks: 0,
            traced_total: 0,
            traced_reserved: 0,
            stats: StackCacheStats::default(),
        }
    }

    /// Blocks currently resident in the cache.
    pub fn reserved_blocks(&self) -> u32 {
        self.reserved_blocks
    }

    /// Blocks currently spilled to memory.
    pub fn spilled_blocks(&self) -> u32 {
        self.spilled_blocks
    }

    fn blocks(&self, size: u32) -> u32 {
        ceil_div(size, self.block_bytes)
    }
}

impl StackCache for BlockStackCache {
    fn reserve(&mut self, mem: &mut dyn Memory, size: u32, stack_top: &mut u32)
        -> SimResult<bool> {
        let size_blocks = self.blocks(size);

        if self.phase == Phase::Idle {
            debug_assert_eq!(self.transfer_blocks, 0);

            if size_blocks > self.num_blocks {
                return Err(SimError::StackExceeded(
                    "reservation exceeds the stack cache size",
                ));
            }

            self.reserved_blocks += size_blocks;
            self.content.grow(size_blocks * self.block_bytes);

            self.stats.blocks_reserved_total += size_blocks as u64;
            self.stats.max_blocks_reserved = self.stats.max_blocks_reserved.max(size_blocks);
            self.stats.max_blocks_allocated = self
                .stats
                .max_blocks_allocated
                .max(self.content.size_bytes() / self.block_bytes);

            if self.reserved_blocks <= self.num_blocks {
                return Ok(true);
            }

            // Overflow: spill the oldest resident blocks. The spill
            // commences in the same cycle.
            self.transfer_blocks = self.reserved_blocks - self.num_blocks;
            if self.transfer_blocks + self.spilled_blocks > self.total_blocks {
                return Err(SimError::StackExceeded("total stack size exceeded"));
            }

            let bytes = (self.transfer_blocks * self.block_bytes) as usize;
            let start = self.content.content.len() - (self.reserved_blocks * self.block_bytes) as usize;
            self.buffer[..bytes].copy_from_slice(&self.content.content[start..start + bytes]);
            self.phase = Phase::Spill;
        }

        debug_assert_eq!(self.phase, Phase::Spill);
        debug_assert_ne!(self.transfer_blocks, 0);

        let bytes = self.transfer_blocks * self.block_bytes;
        if mem.write(stack_top.wrapping_sub(bytes), &self.buffer[..bytes as usize])? {
            self.reserved_blocks -= self.transfer_blocks;
            self.spilled_blocks += self.transfer_blocks;

            self.stats.blocks_spilled += self.transfer_blocks as u64;
            self.stats.max_blocks_spilled =
                self.stats.max_blocks_spilled.max(self.transfer_blocks);

            *stack_top = stack_top.wrapping_sub(bytes);
            self.transfer_blocks = 0;
            self.phase = Phase::Idle;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn free(&mut self, _mem: &mut dyn Memory, size: u32, stack_top: &mut u32)
        -> SimResult<bool> {
        debug_assert!(self.phase == Phase::Idle && self.transfer_blocks == 0);

        let size_blocks = self.blocks(size);

        if size_blocks > self.num_blocks {
            return Err(SimError::StackExceeded("free exceeds the stack cache size"));
        }
        if size_blocks > self.spilled_blocks + self.reserved_blocks {
            return Err(SimError::StackExceeded("freeing more than is allocated"));
        }

        self.content.shrink(size_blocks * self.block_bytes)?;

        if size_blocks <= self.reserved_blocks {
            self.reserved_blocks -= size_blocks;
        } else {
            // Also release spilled blocks without transferring them back.
            let freed_spilled = size_blocks - self.reserved_blocks;
            self.spilled_blocks -= freed_spilled;
            self.reserved_blocks = 0;
            *stack_top = stack_top.wrapping_add(freed_spilled * self.block_bytes);
            self.stats.free_empty += 1;
        }

        Ok(true)
    }

    fn ensure(&mut self, mem: &mut dyn Memory, size: u32, stack_top: &mut u32)
        -> SimResult<bool> {
        let size_blocks = self.blocks(size);

        if self.phase == Phase::Idle {
            debug_assert_eq!(self.transfer_blocks, 0);

            if size_blocks > self.num_blocks {
                return Err(SimError::StackExceeded(
                    "ensure exceeds the stack cache size",
                ));
            }
            if size_blocks > self.reserved_blocks + self.spilled_blocks {
                return Err(SimError::StackExceeded(
                    "ensure exceeds the allocated stack",
                ));
            }

            if self.reserved_blocks >= size_blocks {
                return Ok(true);
            }

            // Fill the shortfall from memory. The fill commences in the
            // same cycle.
            self.transfer_blocks = size_blocks - self.reserved_blocks;
            debug_assert!(self.transfer_blocks <= self.spilled_blocks);
            self.phase = Phase::Fill;
        }

        debug_assert_eq!(self.phase, Phase::Fill);
        debug_assert_ne!(self.transfer_blocks, 0);

        // The content vector still mirrors the spilled bytes, so the data
        // read back from memory is only needed for its timing.
        let bytes = self.transfer_blocks * self.block_bytes;
        if mem.read(*stack_top, &mut self.buffer[..bytes as usize])? {
            self.spilled_blocks -= self.transfer_blocks;
            self.reserved_blocks += self.transfer_blocks;

            self.stats.blocks_filled += self.transfer_blocks as u64;
            self.stats.max_blocks_filled =
                self.stats.max_blocks_filled.max(self.transfer_blocks);

            *stack_top = stack_top.wrapping_add(bytes);
            self.transfer_blocks = 0;
            self.phase = Phase::Idle;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn read(&mut self, offset: u32, data: &mut [u8]) -> SimResult<bool> {
        let resident = (self.reserved_blocks * self.block_bytes) as u64;
        if offset as u64 + data.len() as u64 > resident {
            return Err(SimError::StackExceeded("access beyond the resident stack"));
        }
        self.content.read(offset, data)?;
        self.stats.read_accesses += 1;
        self.stats.bytes_read += data.len() as u64;
        Ok(true)
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> SimResult<bool> {
        let resident = (self.reserved_blocks * self.block_bytes) as u64;
        if offset as u64 + data.len() as u64 > resident {
            return Err(SimError::StackExceeded("access beyond the resident stack"));
        }
        self.content.write(offset, data)?;
        self.stats.write_accesses += 1;
        self.stats.bytes_written += data.len() as u64;
        Ok(true)
    }

    fn size_bytes(&self) -> u32 {
        (self.reserved_blocks + self.spilled_blocks) * self.block_bytes
    }

    fn trace(&mut self, cycle: u64, out: &mut dyn Write) -> io::Result<()> {
        // Only trace occupancy changes, and only between transfers.
        let total = self.spilled_blocks + self.reserved_blocks;
        if self.phase == Phase::Idle
            && (self.traced_total != total || self.traced_reserved != self.reserved_blocks)
        {
            writeln!(
                out,
                "Cyc: {:020} Total: {:010} Cache: {:010}",
                cycle, total, self.reserved_blocks
            )?;
            self.traced_total = total;
            self.traced_reserved = self.reserved_blocks;
        }
        Ok(())
    }

    fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "  {:?}: Reserved: {:4} ({}) Spilled: {:4} ({})",
            self.phase, self.reserved_blocks, self.num_blocks, self.spilled_blocks,
            self.total_blocks
        )
    }

    fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        let s = &self.stats;
        writeln!(out, "\nStack Cache Statistics:")?;
        writeln!(out, "                           total        max.")?;
        writeln!(
            out,
            "   Blocks Spilled   : {:10}  {:10}",
            s.blocks_spilled, s.max_blocks_spilled
        )?;
        writeln!(
            out,
            "   Blocks Filled    : {:10}  {:10}",
            s.blocks_filled, s.max_blocks_filled
        )?;
        writeln!(
            out,
            "   Blocks Allocated : {:10}  {:10}",
            s.blocks_reserved_total, s.max_blocks_allocated
        )?;
        writeln!(
            out,
            "   Blocks Reserved  :          -  {:10}",
            s.max_blocks_reserved
        )?;
        writeln!(out, "   Reads            : {:10}", s.read_accesses)?;
        writeln!(out, "   Bytes Read       : {:10}", s.bytes_read)?;
        writeln!(out, "   Writes           : {:10}", s.write_accesses)?;
        writeln!(out, "   Bytes Written    : {:10}", s.bytes_written)?;
        writeln!(out, "   Emptying Frees   : {:10}", s.free_empty)?;
        Ok(())
    }
}
