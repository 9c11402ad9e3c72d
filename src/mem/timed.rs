//! Burst-timed main memory models.
//!
//! A `DelayedMemory` front-end owns an ideal storage and a request FIFO.
//! Accesses are rounded outward to burst boundaries; the per-request tick
//! budget comes from a `TransferTiming` policy, which exists in three
//! flavours:
//!
//! * `FixedTiming` - every burst costs a fixed number of ticks, plus a
//!   one-shot read delay for loads and non-posted writes.
//! * `VariableBurstTiming` - each memory page spanned costs one burst
//!   worth of overhead, the remaining bytes stream at one tick per word.
//! * `TdmTiming` - a global TDM round rotates; requests advance by whole
//!   bursts only during this core's slot.
//!
//! Writes may be posted: the caller sees completion as soon as the request
//! queue is short enough, while the controller stays occupied for the full
//! latency.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::common::SimResult;
use crate::mem::{IdealMemory, Memory};

/// A pending request in the memory controller's FIFO.
#[derive(Clone, Copy, Debug)]
pub struct Request {
    /// Requested (unaligned) address.
    pub address: u32,
    /// Requested size in bytes.
    pub size: u32,
    /// True for loads, false for stores.
    pub is_load: bool,
    /// True when the write was acknowledged before completion.
    pub is_posted: bool,
    /// Ticks (or TDM slots) until the request completes.
    pub ticks_remaining: u32,
}

/// Timing policy of a delayed memory.
pub trait TransferTiming {
    /// Computes the tick budget of a request covering `aligned_size` bytes.
    fn transfer_ticks(&self, aligned_address: u32, aligned_size: u32, is_load: bool, is_posted: bool)
        -> u32;

    /// Hook invoked at the start of every cycle tick.
    fn begin_tick(&mut self, has_requests: bool) {
        let _ = has_requests;
    }

    /// Advances the front request by one cycle.
    fn tick_request(&mut self, req: &mut Request) {
        req.ticks_remaining -= 1;
    }
}

/// Fixed-delay timing: a constant cost per burst.
pub struct FixedTiming {
    bytes_per_burst: u32,
    ticks_per_burst: u32,
    read_delay: u32,
}

impl FixedTiming {
    /// Creates a fixed-delay timing policy.
    pub fn new(bytes_per_burst: u32, ticks_per_burst: u32, read_delay: u32) -> Self {
        Self {
            bytes_per_burst,
            ticks_per_burst,
            read_delay,
        }
    }
}

impl TransferTiming for FixedTiming {
    fn transfer_ticks(&self, _address: u32, aligned_size: u32, is_load: bool, is_posted: bool) -> u32 {
        let num_bursts = (aligned_size - 1) / self.bytes_per_burst + 1;
        let mut ticks = self.ticks_per_burst * num_bursts;
        if is_load || !is_posted {
            ticks += self.read_delay;
        }
        ticks
    }
}

/// Variable-burst timing: page-crossing overhead plus per-word streaming.
pub struct VariableBurstTiming {
    bytes_per_burst: u32,
    ticks_per_burst: u32,
    read_delay: u32,
    bytes_per_page: u32,
}

impl VariableBurstTiming {
    /// Creates a variable-burst timing policy.
    pub fn new(
        bytes_per_burst: u32,
        ticks_per_burst: u32,
        read_delay: u32,
        bytes_per_page: u32,
    ) -> Self {
        Self {
            bytes_per_burst,
            ticks_per_burst,
            read_delay,
            bytes_per_page,
        }
    }
}

impl TransferTiming for VariableBurstTiming {
    fn transfer_ticks(&self, aligned_address: u32, aligned_size: u32, is_load: bool, is_posted: bool)
        -> u32 {
        let start_page = aligned_address / self.bytes_per_page;
        let end_page = (aligned_address + aligned_size - 1) / self.bytes_per_page;
        let num_pages = end_page - start_page + 1;

        // Every page spanned pays one full burst; the rest streams at one
        // tick per word.
        let mut ticks = num_pages * self.ticks_per_burst;
        let streamed = aligned_size.saturating_sub(num_pages * self.bytes_per_burst);
        ticks += streamed / 4;

        if is_load || !is_posted {
            ticks += self.read_delay;
        }
        ticks
    }
}

/// TDM timing: this core may only drain its FIFO during its slot of a
/// global round.
pub struct TdmTiming {
    bytes_per_burst: u32,
    ticks_per_burst: u32,
    read_delay: u32,
    round_length: u32,
    round_start: u32,
    round_counter: u32,
}

impl TdmTiming {
    /// Creates a TDM timing policy.
    ///
    /// The global round spans `cores * ticks_per_burst + refresh_ticks`
    /// ticks; this core's slot begins at `cpu_id * ticks_per_burst`.
    pub fn new(
        bytes_per_burst: u32,
        ticks_per_burst: u32,
        read_delay: u32,
        cores: u32,
        cpu_id: u32,
        refresh_ticks: u32,
    ) -> Self {
        let round_length = cores * ticks_per_burst + refresh_ticks;
        assert!(
            ticks_per_burst + read_delay < round_length,
            "read delay too long; overlapping TDM requests are not supported"
        );
        Self {
            bytes_per_burst,
            ticks_per_burst,
            read_delay,
            round_length,
            round_start: cpu_id * ticks_per_burst,
            round_counter: 0,
        }
    }
}

impl TransferTiming for TdmTiming {
    fn transfer_ticks(&self, _address: u32, aligned_size: u32, _is_load: bool, _is_posted: bool)
        -> u32 {
        // Counted in TDM slots rather than raw ticks; one burst per slot.
        (aligned_size - 1) / self.bytes_per_burst + 1
    }

    fn begin_tick(&mut self, _has_requests: bool) {
        self.round_counter = (self.round_counter + 1) % self.round_length;
    }

    fn tick_request(&mut self, req: &mut Request) {
        let mut round_end = self.round_start + self.ticks_per_burst;
        if !req.is_posted {
            round_end += self.read_delay;
        }
        if round_end >= self.round_length {
            round_end -= self.round_length;
        }

        if round_end == self.round_counter {
            req.ticks_remaining -= 1;
        }
    }
}

/// Statistics of a delayed memory.
#[derive(Default)]
pub struct MemoryStats {
    pub max_queue_size: usize,
    pub consecutive_requests: u64,
    pub busy_cycles: u64,
    pub posted_write_cycles: u64,
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub bytes_read_transferred: u64,
    pub bytes_write_transferred: u64,
    pub requests_per_size: BTreeMap<u32, u64>,
}

/// A timing-modelled memory in front of an ideal storage.
pub struct DelayedMemory {
    storage: IdealMemory,
    timing: Box<dyn TransferTiming>,
    bytes_per_burst: u32,
    posted_writes: usize,
    requests: Vec<Request>,
    last_address: u32,
    last_is_load: bool,
    /// Accumulated controller statistics.
    pub stats: MemoryStats,
}

impl DelayedMemory {
    /// Creates a delayed memory.
    ///
    /// # Arguments
    ///
    /// * `storage` - The backing ideal memory.
    /// * `timing` - The transfer timing policy.
    /// * `bytes_per_burst` - Burst alignment applied to every request.
    /// * `posted_writes` - Posted-write capacity; 0 disables posting.
    pub fn new(
        storage: IdealMemory,
        timing: Box<dyn TransferTiming>,
        bytes_per_burst: u32,
        posted_writes: usize,
    ) -> Self {
        Self {
            storage,
            timing,
            bytes_per_burst,
            posted_writes,
            requests: Vec::new(),
            last_address: 0,
            last_is_load: false,
            stats: MemoryStats::default(),
        }
    }

    /// Number of requests currently in the FIFO.
    pub fn queue_len(&self) -> usize {
        self.requests.len()
    }

    fn aligned(&self, address: u32, size: u32) -> (u32, u32) {
        let start = address / self.bytes_per_burst * self.bytes_per_burst;
        let end = ((address + size - 1) / self.bytes_per_burst + 1) * self.bytes_per_burst;
        (start, end - start)
    }

    /// Locates the matching pending request or creates a new one.
    ///
    /// Returns the request index and whether it was created this cycle.
    fn find_or_create(
        &mut self,
        address: u32,
        size: u32,
        is_load: bool,
        is_posted: bool,
    ) -> SimResult<(usize, bool)> {
        self.storage.check_access(address, size, is_load, false)?;

        if let Some(idx) = self
            .requests
            .iter()
            .position(|r| r.address == address && r.size == size && r.is_load == is_load)
        {
            return Ok((idx, false));
        }

        let (aligned_address, aligned_size) = self.aligned(address, size);
        let ticks = self
            .timing
            .transfer_ticks(aligned_address, aligned_size, is_load, is_posted);
        self.requests.push(Request {
            address,
            size,
            is_load,
            is_posted,
            ticks_remaining: ticks,
        });

        self.stats.max_queue_size = self.stats.max_queue_size.max(self.requests.len());
        self.stats.busy_cycles += ticks as u64;
        if is_load == self.last_is_load && address == self.last_address {
            self.stats.consecutive_requests += 1;
        }
        if is_load {
            self.stats.reads += 1;
            self.stats.bytes_read += size as u64;
            self.stats.bytes_read_transferred += aligned_size as u64;
        } else {
            self.stats.writes += 1;
            self.stats.bytes_written += size as u64;
            self.stats.bytes_write_transferred += aligned_size as u64;
        }
        self.last_address = address + size;
        self.last_is_load = is_load;

        let hist_size = ((size - 1) / 4 + 1) * 4;
        *self.stats.requests_per_size.entry(hist_size).or_insert(0) += 1;

        Ok((self.requests.len() - 1, true))
    }
}

impl Memory for DelayedMemory {
    fn read(&mut self, address: u32, data: &mut [u8]) -> SimResult<bool> {
        let (idx, _) = self.find_or_create(address, data.len() as u32, true, false)?;
        if self.requests[idx].ticks_remaining == 0 {
            debug_assert_eq!(idx, 0, "requests are served in FIFO order");
            self.requests.remove(idx);
            self.storage.read_peek(address, data)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn write(&mut self, address: u32, data: &[u8]) -> SimResult<bool> {
        let posted = self.posted_writes > 0;
        let (idx, created) = self.find_or_create(address, data.len() as u32, false, posted)?;

        // Posted writes take effect immediately; the queued request keeps
        // the controller occupied for the full latency.
        if posted && created {
            self.storage.write_peek(address, data)?;
        }

        if self.requests[idx].ticks_remaining == 0 {
            debug_assert_eq!(idx, 0, "requests are served in FIFO order");
            self.requests.remove(idx);
            if !posted {
                self.storage.write_peek(address, data)?;
            }
            Ok(true)
        } else if posted {
            Ok(self.requests.len() <= self.posted_writes)
        } else {
            Ok(false)
        }
    }

    fn read_peek(&mut self, address: u32, data: &mut [u8]) -> SimResult<()> {
        self.storage.read_peek(address, data)
    }

    fn write_peek(&mut self, address: u32, data: &[u8]) -> SimResult<()> {
        self.storage.write_peek(address, data)
    }

    fn is_ready(&self) -> bool {
        self.requests.is_empty()
    }

    fn tick(&mut self) {
        self.timing.begin_tick(!self.requests.is_empty());

        // When only posted writes remain queued nobody is waiting on a
        // result, so the cycle is hidden rather than a stall.
        if !self.requests.is_empty()
            && self.requests.len() <= self.posted_writes
            && self.requests.iter().all(|r| r.is_posted)
        {
            self.stats.posted_write_cycles += 1;
        }

        if let Some(front) = self.requests.first_mut() {
            if front.ticks_remaining > 0 {
                self.timing.tick_request(front);
                if front.ticks_remaining == 0 && front.is_posted {
                    self.requests.remove(0);
                }
            }
        }
    }

    fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.requests.is_empty() {
            writeln!(out, " IDLE")?;
        } else {
            for req in &self.requests {
                writeln!(
                    out,
                    " {}: {} ({:#010x} {})",
                    if req.is_load { "LOAD " } else { "STORE" },
                    req.ticks_remaining,
                    req.address,
                    req.size
                )?;
            }
        }
        Ok(())
    }

    fn print_stats(&self, cycles: u64, out: &mut dyn Write) -> io::Result<()> {
        let s = &self.stats;
        let stall_cycles = s.busy_cycles.saturating_sub(s.posted_write_cycles);
        let total_bytes = s.bytes_read_transferred + s.bytes_write_transferred;
        let cyc = cycles.max(1) as f64;

        writeln!(out, "\nMain Memory Statistics:")?;
        writeln!(out, "                              total  % of cycles")?;
        writeln!(out, "   Max Queue Size        : {:10}", s.max_queue_size)?;
        writeln!(out, "   Consecutive Transfers : {:10}", s.consecutive_requests)?;
        writeln!(out, "   Requests              : {:10}", s.reads + s.writes)?;
        writeln!(
            out,
            "   Bursts Transferred    : {:10}",
            total_bytes / self.bytes_per_burst as u64
        )?;
        writeln!(out, "   Bytes Transferred     : {:10}", total_bytes)?;
        writeln!(
            out,
            "   Stall Cycles          : {:10} {:10.2}%",
            stall_cycles,
            stall_cycles as f64 / cyc * 100.0
        )?;
        writeln!(
            out,
            "   Hidden Write Cycles   : {:10} {:10.2}%",
            s.posted_write_cycles,
            s.posted_write_cycles as f64 / cyc * 100.0
        )?;
        writeln!(out, "\n                                Read       Write")?;
        writeln!(out, "   Requests              : {:10}  {:10}", s.reads, s.writes)?;
        writeln!(
            out,
            "   Bytes Requested       : {:10}  {:10}",
            s.bytes_read, s.bytes_written
        )?;
        writeln!(
            out,
            "   Bytes Transferred     : {:10}  {:10}",
            s.bytes_read_transferred, s.bytes_write_transferred
        )?;
        writeln!(out, "\n   Request size    #requests")?;
        for (size, count) in &s.requests_per_size {
            writeln!(out, "   {:10} : {:12}", size, count)?;
        }
        Ok(())
    }
}
