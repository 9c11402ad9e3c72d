//! Method cache.
//!
//! The method cache treats whole functions as atomic cache lines. An entry
//! covers a variable number of fixed-size blocks; a method's on-memory
//! layout is preceded by a 4-byte big-endian size header at `address - 4`.
//!
//! A miss runs the state machine IDLE -> SIZE -> TRANSFER: first the size
//! header is fetched from memory with full latency, then older entries are
//! evicted until the method fits, then exactly the method's blocks are
//! streamed in. The pipeline stalls for the whole transfer.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::common::{ceil_div, SimError, SimResult, NUM_SLOTS};
use crate::mem::Memory;

/// Contract of a method cache.
pub trait MethodCache {
    /// Preloads the entry method before the first instruction executes.
    fn initialize(&mut self, mem: &mut dyn Memory, address: u32) -> SimResult<()>;

    /// Fetches the 8-byte bundle at `address` from the current method.
    ///
    /// Fails with `IllegalPc` when `address` lies outside the current
    /// method's range.
    fn fetch(&mut self, mem: &mut dyn Memory, address: u32, iw: &mut [u32; NUM_SLOTS])
        -> SimResult<()>;

    /// Checks whether the method at `address` is resident, starting a
    /// transfer on a miss.
    ///
    /// Returns `Ok(false)` while the transfer is in progress; the caller
    /// must re-issue the request every cycle until it completes.
    fn is_available(&mut self, mem: &mut dyn Memory, address: u32) -> SimResult<bool>;

    /// Pure lookup: true iff the method at `address` is resident.
    fn assert_availability(&mut self, address: u32) -> bool;

    /// Advances the cache by one cycle.
    fn tick(&mut self);

    /// Prints the resident methods for debugging.
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

/// An ideal method cache: every method is always resident.
pub struct IdealMethodCache;

impl MethodCache for IdealMethodCache {
    fn initialize(&mut self, _mem: &mut dyn Memory, _address: u32) -> SimResult<()> {
        Ok(())
    }

    fn fetch(&mut self, mem: &mut dyn Memory, address: u32, iw: &mut [u32; NUM_SLOTS])
        -> SimResult<()> {
        let mut buf = [0u8; 8];
        mem.read_peek(address, &mut buf)?;
        iw[0] = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        iw[1] = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(())
    }

    fn is_available(&mut self, _mem: &mut dyn Memory, _address: u32) -> SimResult<bool> {
        Ok(true)
    }

    fn assert_availability(&mut self, _address: u32) -> bool {
        true
    }

    fn tick(&mut self) {}
}

/// Replacement policy over whole methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replacement {
    /// Hits promote the entry to most-recent.
    Lru,
    /// Entries keep their insertion order; the first-in entry is evicted.
    Fifo,
}

/// Transfer phases of a missed method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Size,
    Transfer,
}

/// A resident method entry.
struct MethodInfo {
    instructions: Vec<u8>,
    address: u32,
    num_blocks: u32,
    num_bytes: u32,
}

/// Per-method hit/miss statistics.
#[derive(Clone, Copy, Default)]
pub struct MethodStats {
    pub hits: u64,
    pub misses: u64,
}

/// A method cache with LRU or FIFO replacement over whole methods.
///
/// Entries are kept ordered by age, the most recent at the highest index.
/// Under FIFO replacement hits do not reorder entries; a separate cursor
/// remembers which entry the core is executing from.
pub struct LruMethodCache {
    block_bytes: u32,
    num_blocks: u32,
    init_blocks: u32,
    replacement: Replacement,

    phase: Phase,
    transfer_blocks: u32,
    transfer_bytes: u32,

    /// Entries by age; index `num_blocks - 1` is most recent.
    methods: Vec<MethodInfo>,
    active_methods: u32,
    active_blocks: u32,
    /// Entry the core currently fetches from (FIFO keeps this off the
    /// most-recent slot).
    current: usize,

    pub blocks_transferred: u64,
    pub max_blocks_transferred: u32,
    pub bytes_transferred: u64,
    pub max_bytes_transferred: u32,
    pub hits: u64,
    pub misses: u64,
    pub stall_cycles: u64,
    pub method_stats: BTreeMap<u32, MethodStats>,
}

impl LruMethodCache {
    /// Creates a method cache.
    ///
    /// # Arguments
    ///
    /// * `num_blocks` - Cache capacity in blocks.
    /// * `block_bytes` - Block size in bytes.
    /// * `init_blocks` - Blocks preloaded for the entry method.
    /// * `replacement` - Replacement policy over methods.
    pub fn new(num_blocks: u32, block_bytes: u32, init_blocks: u32, replacement: Replacement)
        -> Self {
        let buffer_bytes = (num_blocks * block_bytes) as usize;
        Self {
            block_bytes,
            num_blocks,
            init_blocks,
            replacement,
            phase: Phase::Idle,
            transfer_blocks: 0,
            transfer_bytes: 0,
            methods: (0..num_blocks)
                .map(|_| MethodInfo {
                    instructions: vec![0; buffer_bytes],
                    address: 0,
                    num_blocks: 0,
                    num_bytes: 0,
                })
                .collect(),
            active_methods: 0,
            active_blocks: 0,
            current: num_blocks as usize - 1,
            blocks_transferred: 0,
            max_blocks_transferred: 0,
            bytes_transferred: 0,
            max_bytes_transferred: 0,
            hits: 0,
            misses: 0,
            stall_cycles: 0,
            method_stats: BTreeMap::new(),
        }
    }

    fn most_recent(&self) -> usize {
        self.methods.len() - 1
    }

    /// Index range currently holding active entries.
    fn active_range(&self) -> std::ops::Range<usize> {
        self.methods.len() - self.active_methods as usize..self.methods.len()
    }

    fn find(&self, address: u32) -> Option<usize> {
        self.active_range().rev().find(|&i| self.methods[i].address == address)
    }

    /// Looks up a method, applying the replacement policy's hit behavior.
    fn lookup(&mut self, address: u32) -> bool {
        let Some(idx) = self.find(address) else {
            return false;
        };

        match self.replacement {
            Replacement::Lru => {
                // Promote to most-recent, shifting the younger entries down.
                let entry = self.methods.remove(idx);
                self.methods.push(entry);
                self.current = self.most_recent();
            }
            Replacement::Fifo => {
                self.current = idx;
            }
        }
        true
    }

    fn do_fetch(&self, entry: usize, address: u32, iw: &mut [u32; NUM_SLOTS]) -> SimResult<()> {
        let method = &self.methods[entry];
        if address < method.address || method.address + method.num_bytes <= address {
            return Err(SimError::IllegalPc(method.address));
        }

        let offset = (address - method.address) as usize;
        let mut buf = [0u8; 8];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = method
                .instructions
                .get(offset + i)
                .copied()
                .unwrap_or(0);
        }
        iw[0] = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        iw[1] = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(())
    }
}

impl MethodCache for LruMethodCache {
    fn initialize(&mut self, mem: &mut dyn Memory, address: u32) -> SimResult<()> {
        debug_assert!(self.active_methods == 0 && self.active_blocks == 0);

        let init_bytes = self.init_blocks * self.block_bytes;
        let recent = self.most_recent();
        let entry = &mut self.methods[recent];
        mem.read_peek(address, &mut entry.instructions[..init_bytes as usize])?;
        entry.address = address;
        entry.num_blocks = self.init_blocks;
        entry.num_bytes = init_bytes;

        self.active_blocks = self.init_blocks;
        self.active_methods = 1;
        self.current = recent;
        Ok(())
    }

    fn fetch(&mut self, _mem: &mut dyn Memory, address: u32, iw: &mut [u32; NUM_SLOTS])
        -> SimResult<()> {
        self.do_fetch(self.current, address, iw)
    }

    fn is_available(&mut self, mem: &mut dyn Memory, address: u32) -> SimResult<bool> {
        if self.phase == Phase::Idle {
            debug_assert!(self.transfer_blocks == 0 && self.transfer_bytes == 0);

            if self.lookup(address) {
                self.hits += 1;
                self.method_stats.entry(address).or_default().hits += 1;
                return Ok(true);
            }

            // Miss: fetch the size header next. The SIZE phase starts in
            // the same cycle.
            self.phase = Phase::Size;
            self.misses += 1;
            self.method_stats.entry(address).or_default().misses += 1;
        }

        if self.phase == Phase::Size {
            let mut header = [0u8; 4];
            if !mem.read(address.wrapping_sub(4), &mut header)? {
                return Ok(false);
            }

            self.transfer_bytes = u32::from_be_bytes(header);
            self.transfer_blocks = ceil_div(self.transfer_bytes, self.block_bytes);

            if self.transfer_blocks == 0 || self.transfer_blocks > self.num_blocks {
                return Err(SimError::CodeExceeded(address));
            }

            // Evict the oldest entries until the method fits.
            while self.active_blocks + self.transfer_blocks > self.num_blocks {
                debug_assert!(self.active_methods > 0);
                let oldest = self.methods.len() - self.active_methods as usize;
                self.active_blocks -= self.methods[oldest].num_blocks;
                self.active_methods -= 1;
            }

            self.active_methods += 1;
            self.active_blocks += self.transfer_blocks;
            self.blocks_transferred += self.transfer_blocks as u64;
            self.max_blocks_transferred = self.max_blocks_transferred.max(self.transfer_blocks);
            self.bytes_transferred += self.transfer_bytes as u64;
            self.max_bytes_transferred = self.max_bytes_transferred.max(self.transfer_bytes);

            // Recycle the oldest slot's buffer for the new most-recent
            // entry.
            let oldest = self.methods.len() - self.active_methods as usize;
            let mut entry = self.methods.remove(oldest);
            entry.address = address;
            entry.num_blocks = self.transfer_blocks;
            entry.num_bytes = self.transfer_bytes;
            self.methods.push(entry);
            self.current = self.most_recent();

            // The TRANSFER phase starts in the same cycle.
            self.phase = Phase::Transfer;
        }

        if self.phase == Phase::Transfer {
            debug_assert!(self.transfer_blocks != 0 && self.transfer_bytes != 0);

            let len = (self.transfer_blocks * self.block_bytes) as usize;
            let recent = self.most_recent();
            let done = mem.read(address, &mut self.methods[recent].instructions[..len])?;

            if done {
                self.transfer_blocks = 0;
                self.transfer_bytes = 0;
                self.phase = Phase::Idle;
                return Ok(true);
            }
            return Ok(false);
        }

        unreachable!("method cache phase state corrupted");
    }

    fn assert_availability(&mut self, address: u32) -> bool {
        self.find(address).is_some()
    }

    fn tick(&mut self) {
        if self.phase != Phase::Idle {
            self.stall_cycles += 1;
        }
    }

    fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            " #M: {:02} #B: {:02}",
            self.active_methods, self.active_blocks
        )?;
        for (age, i) in self.active_range().rev().enumerate() {
            let m = &self.methods[i];
            writeln!(
                out,
                "   M{:02}: {:#010x} ({:8} Blk {:8} b)",
                age + 1,
                m.address,
                m.num_blocks,
                m.num_bytes
            )?;
        }
        Ok(())
    }

    fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\nMethod Cache Statistics:")?;
        writeln!(out, "                            total        max.")?;
        writeln!(
            out,
            "   Blocks Transferred: {:10}  {:10}",
            self.blocks_transferred, self.max_blocks_transferred
        )?;
        writeln!(
            out,
            "   Bytes Transferred : {:10}  {:10}",
            self.bytes_transferred, self.max_bytes_transferred
        )?;
        writeln!(out, "   Cache Hits        : {:10}", self.hits)?;
        writeln!(out, "   Cache Misses      : {:10}", self.misses)?;
        writeln!(out, "   Miss Stall Cycles : {:10}", self.stall_cycles)?;
        writeln!(out, "\n       Method:      #hits     #misses")?;
        for (address, stats) in &self.method_stats {
            writeln!(
                out,
                "   {:#010x}: {:10}  {:10}",
                address, stats.hits, stats.misses
            )?;
        }
        Ok(())
    }
}
