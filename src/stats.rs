//! Simulation statistics collection and reporting.
//!
//! Tracks per-instruction fetch/retire/discard counters for both issue
//! slots, retired bubbles, and per-stage stall cycles. Cache and memory
//! statistics live in their components; the simulator's report stitches
//! everything together.

use std::io::{self, Write};

use crate::common::NUM_SLOTS;
use crate::core::pipeline::NUM_STAGES;
use crate::isa::Decoder;

/// Counters of a single instruction variant in a single slot.
#[derive(Clone, Copy, Default)]
pub struct InstrStat {
    pub fetched: u64,
    pub retired: u64,
    pub discarded: u64,
}

/// Aggregated pipeline statistics.
pub struct SimStats {
    /// Per-instruction counters, indexed by decoder table id, per slot.
    pub instructions: Vec<[InstrStat; NUM_SLOTS]>,
    /// Bubbles retired per slot.
    pub bubbles_retired: [u64; NUM_SLOTS],
    /// Cycles spent with the stall floor at each stage. The IF entry
    /// counts unstalled cycles.
    pub stall_cycles: [u64; NUM_STAGES],
}

impl SimStats {
    /// Creates zeroed statistics sized to the decoder table.
    pub fn new(num_instructions: usize) -> Self {
        Self {
            instructions: vec![[InstrStat::default(); NUM_SLOTS]; num_instructions],
            bubbles_retired: [0; NUM_SLOTS],
            stall_cycles: [0; NUM_STAGES],
        }
    }

    /// Prints the per-instruction table and stall summary.
    pub fn print(&self, decoder: &Decoder, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\nInstruction Statistics:")?;
        writeln!(
            out,
            "   {:>15}: {:>10} {:>10} {:>10}",
            "instruction", "#fetched", "#retired", "#discarded"
        )?;

        let mut total = InstrStat::default();
        for (id, slots) in self.instructions.iter().enumerate() {
            let fetched: u64 = slots.iter().map(|s| s.fetched).sum();
            let retired: u64 = slots.iter().map(|s| s.retired).sum();
            let discarded: u64 = slots.iter().map(|s| s.discarded).sum();
            if fetched == 0 && retired == 0 && discarded == 0 {
                continue;
            }
            writeln!(
                out,
                "   {:>15}: {:>10} {:>10} {:>10}",
                decoder.name(id as u16),
                fetched,
                retired,
                discarded
            )?;
            total.fetched += fetched;
            total.retired += retired;
            total.discarded += discarded;
        }
        writeln!(
            out,
            "   {:>15}: {:>10} {:>10} {:>10}",
            "all", total.fetched, total.retired, total.discarded
        )?;
        let bubbles: u64 = self.bubbles_retired.iter().sum();
        writeln!(
            out,
            "   {:>15}: {:>10} {:>10} {:>10}",
            "bubbles", "-", bubbles, "-"
        )?;

        writeln!(out, "\nStall Cycles:")?;
        for (stage, cycles) in crate::core::pipeline::Stage::ALL
            .iter()
            .zip(self.stall_cycles.iter())
            .skip(1)
        {
            writeln!(out, "   {}: {}", stage.name(), cycles)?;
        }
        Ok(())
    }
}
