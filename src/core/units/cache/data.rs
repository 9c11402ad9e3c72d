//! Data cache implementations.
//!
//! The data cache is pluggable: the pipeline only depends on the
//! `DataCache` contract. Three variants are provided:
//!
//! * `IdealDataCache` - always hits; reads and writes go straight to the
//!   backing memory without timing.
//! * `NoDataCache` - no cache at all; every access pays the full main
//!   memory latency.
//! * `LruDataCache` - set-associative, write-through, no write-allocate.
//!   The cache tracks tags and timing only; content always lives in the
//!   backing memory.

use std::io::{self, Write};

use crate::common::SimResult;
use crate::mem::Memory;

/// Contract of a data cache in front of the main memory.
pub trait DataCache {
    /// Attempts to read through the cache.
    ///
    /// Returns `Ok(true)` with `data` filled when the access has
    /// completed, `Ok(false)` while it is still being serviced.
    fn read(&mut self, mem: &mut dyn Memory, address: u32, data: &mut [u8]) -> SimResult<bool>;

    /// Attempts to write through the cache.
    fn write(&mut self, mem: &mut dyn Memory, address: u32, data: &[u8]) -> SimResult<bool>;

    /// Advances the cache by one cycle.
    fn tick(&mut self) {}

    /// Prints accumulated statistics.
    fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        let _ = out;
        Ok(())
    }
}

/// An ideal data cache: every access hits with zero latency.
pub struct IdealDataCache;

impl DataCache for IdealDataCache {
    fn read(&mut self, mem: &mut dyn Memory, address: u32, data: &mut [u8]) -> SimResult<bool> {
        mem.read_peek(address, data)?;
        Ok(true)
    }

    fn write(&mut self, mem: &mut dyn Memory, address: u32, data: &[u8]) -> SimResult<bool> {
        mem.write_peek(address, data)?;
        Ok(true)
    }
}

/// No data cache: accesses pass through with full memory timing.
pub struct NoDataCache;

impl DataCache for NoDataCache {
    fn read(&mut self, mem: &mut dyn Memory, address: u32, data: &mut [u8]) -> SimResult<bool> {
        mem.read(address, data)
    }

    fn write(&mut self, mem: &mut dyn Memory, address: u32, data: &[u8]) -> SimResult<bool> {
        mem.write(address, data)
    }
}

/// A set-associative, write-through data cache with LRU replacement.
///
/// Tags and timing only: on a read miss the full line is fetched from the
/// backing memory (paying its latency) before the requested bytes are
/// served; writes go to memory with full timing and update no lines
/// (no write-allocate).
pub struct LruDataCache {
    line_bytes: u32,
    sets: usize,
    ways: usize,
    /// Tag per (set, way); `None` marks an empty line.
    tags: Vec<Vec<Option<u32>>>,
    /// LRU stacks, most recent first, one per set.
    usage: Vec<Vec<usize>>,
    /// Line fill buffer reused across misses.
    fill_buf: Vec<u8>,
    pub hits: u64,
    pub misses: u64,
    pub bytes_transferred: u64,
}

impl LruDataCache {
    /// Creates an LRU data cache.
    ///
    /// # Arguments
    ///
    /// * `size_bytes` - Total cache capacity.
    /// * `line_bytes` - Line size; accesses are cached at this granularity.
    /// * `ways` - Associativity.
    pub fn new(size_bytes: u32, line_bytes: u32, ways: usize) -> Self {
        let sets = (size_bytes / line_bytes) as usize / ways;
        Self {
            line_bytes,
            sets,
            ways,
            tags: vec![vec![None; ways]; sets],
            usage: (0..sets).map(|_| (0..ways).collect()).collect(),
            fill_buf: vec![0; line_bytes as usize],
            hits: 0,
            misses: 0,
            bytes_transferred: 0,
        }
    }

    fn index(&self, address: u32) -> (usize, u32) {
        let line = address / self.line_bytes;
        ((line as usize) % self.sets, line)
    }

    fn lookup(&mut self, set: usize, tag: u32) -> Option<usize> {
        self.tags[set].iter().position(|&t| t == Some(tag))
    }

    /// Moves `way` to the most-recently-used position of its set.
    fn touch(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&w| w == way) {
            stack.remove(pos);
        }
        stack.insert(0, way);
    }

    fn victim(&self, set: usize) -> usize {
        *self.usage[set].last().expect("set has at least one way")
    }
}

impl DataCache for LruDataCache {
    fn read(&mut self, mem: &mut dyn Memory, address: u32, data: &mut [u8]) -> SimResult<bool> {
        let (set, tag) = self.index(address);
        if let Some(way) = self.lookup(set, tag) {
            self.touch(set, way);
            self.hits += 1;
            mem.read_peek(address, data)?;
            return Ok(true);
        }

        // Miss: fetch the whole line with full memory timing, then install.
        let line_addr = address / self.line_bytes * self.line_bytes;
        if !mem.read(line_addr, &mut self.fill_buf)? {
            return Ok(false);
        }

        let way = self.victim(set);
        self.tags[set][way] = Some(tag);
        self.touch(set, way);
        self.misses += 1;
        self.bytes_transferred += self.line_bytes as u64;
        mem.read_peek(address, data)?;
        Ok(true)
    }

    fn write(&mut self, mem: &mut dyn Memory, address: u32, data: &[u8]) -> SimResult<bool> {
        // Write-through, no allocate.
        mem.write(address, data)
    }

    fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\nData Cache Statistics:")?;
        writeln!(out, "   Cache Hits        : {:10}", self.hits)?;
        writeln!(out, "   Cache Misses      : {:10}", self.misses)?;
        writeln!(out, "   Bytes Transferred : {:10}", self.bytes_transferred)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::IdealMemory;

    #[test]
    fn second_access_hits() {
        let mut mem = IdealMemory::new(1024, false);
        let mut cache = LruDataCache::new(256, 32, 2);
        mem.write_peek(0x40, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        assert!(cache.read(&mut mem, 0x40, &mut buf).unwrap());
        assert_eq!(cache.misses, 1);

        assert!(cache.read(&mut mem, 0x42, &mut buf[..2]).unwrap());
        assert_eq!(cache.hits, 1, "same line should hit");
    }

    #[test]
    fn lru_evicts_least_recent_line() {
        let mut mem = IdealMemory::new(4096, false);
        // Direct-mapped equivalent with 2 sets of 1 way, 32-byte lines.
        let mut cache = LruDataCache::new(64, 32, 1);
        let mut buf = [0u8; 4];

        cache.read(&mut mem, 0x000, &mut buf).unwrap();
        cache.read(&mut mem, 0x040, &mut buf).unwrap();
        assert_eq!(cache.misses, 2, "0x40 maps to the same set and evicts");

        cache.read(&mut mem, 0x000, &mut buf).unwrap();
        assert_eq!(cache.misses, 3, "original line was evicted");
    }
}
