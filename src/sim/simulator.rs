//! The simulation orchestrator.
//!
//! Drives one simulated cycle per step: the decoupled-load side channel,
//! the four pipeline stages in reverse order, the commit phases, the
//! statistics, the pipeline advance with fetch or bubble injection, and
//! one tick each for main memory, method cache, and stack cache.

use std::io::{self, Write};

use crate::common::{FatalError, SimError, SimResult, NUM_SLOTS};
use crate::config::{Config, DataCacheKind, MemoryModel, MethodCacheKind, StackCacheKind};
use crate::core::arch::{spr, Gpr, Prr, Spr};
use crate::core::pipeline::{Pipeline, Stage};
use crate::core::units::cache::{
    BlockStackCache, DataCache, IdealDataCache, IdealMethodCache, IdealStackCache, LruDataCache,
    LruMethodCache, MethodCache, NoDataCache, Replacement, StackCache,
};
use crate::isa::op::{Op, StackOp};
use crate::isa::{Decoder, InstrData};
use crate::mem::{DelayedMemory, FixedTiming, IdealMemory, Memory, TdmTiming, VariableBurstTiming};
use crate::sim::SymbolMap;
use crate::stats::SimStats;

/// Debug output formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugFmt {
    /// No per-cycle output.
    None,
    /// One-line register dump per cycle.
    Short,
    /// Full register dump per cycle.
    Default,
    /// PC and cycle per line.
    Trace,
    /// Retiring bundle per line.
    Instructions,
    /// One line whenever the PC hits a known symbol.
    Blocks,
    /// Stack cache occupancy changes.
    StackTrace,
    /// Registers plus cache and memory internals.
    All,
}

impl DebugFmt {
    /// Parses a format name; unknown names fall back to `None`.
    pub fn parse(name: &str) -> Self {
        match name {
            "short" => DebugFmt::Short,
            "default" => DebugFmt::Default,
            "trace" => DebugFmt::Trace,
            "instructions" => DebugFmt::Instructions,
            "blocks" => DebugFmt::Blocks,
            "stack" => DebugFmt::StackTrace,
            "all" => DebugFmt::All,
            _ => DebugFmt::None,
        }
    }
}

type StageFn = fn(&mut InstrData, &mut Simulator, usize) -> SimResult<()>;

/// A single Patmos core with its memory hierarchy.
pub struct Simulator {
    /// Cycle counter.
    pub cycle: u64,
    /// Base address of the current method.
    pub base: u32,
    /// Program counter.
    pub pc: u32,
    /// Next program counter.
    pub npc: u32,

    pub gpr: Gpr,
    pub prr: Prr,
    pub spr: Spr,

    /// Stall floor: stages at or below hold this cycle.
    pub stall: Stage,
    pub pipeline: Pipeline,

    /// Single-slot decoupled-load side channel.
    pub decoupled_load: InstrData,
    pub decoupled_active: bool,

    pub memory: Box<dyn Memory>,
    pub local: Box<dyn Memory>,
    pub dcache: Box<dyn DataCache>,
    pub mcache: Box<dyn MethodCache>,
    pub scache: Box<dyn StackCache>,
    /// Block size the stack-control immediates are scaled by.
    pub stack_block_bytes: u32,

    pub decoder: Decoder,
    pub symbols: SymbolMap,
    pub stats: SimStats,
}

/// Builds a simulator from a configuration.
pub fn build_simulator(config: &Config) -> Simulator {
    let mem = &config.memory;
    let storage = IdealMemory::new(mem.size, mem.strict_init_check);
    let memory: Box<dyn Memory> = match mem.model {
        MemoryModel::Ideal => Box::new(storage),
        MemoryModel::Fixed => Box::new(DelayedMemory::new(
            storage,
            Box::new(FixedTiming::new(
                mem.bytes_per_burst,
                mem.ticks_per_burst,
                mem.read_delay,
            )),
            mem.bytes_per_burst,
            mem.posted_writes,
        )),
        MemoryModel::Variable => Box::new(DelayedMemory::new(
            storage,
            Box::new(VariableBurstTiming::new(
                mem.bytes_per_burst,
                mem.ticks_per_burst,
                mem.read_delay,
                mem.bytes_per_page,
            )),
            mem.bytes_per_burst,
            mem.posted_writes,
        )),
        MemoryModel::Tdm => Box::new(DelayedMemory::new(
            storage,
            Box::new(TdmTiming::new(
                mem.bytes_per_burst,
                mem.ticks_per_burst,
                mem.read_delay,
                mem.cores,
                mem.cpu_id,
                mem.refresh_ticks,
            )),
            mem.bytes_per_burst,
            mem.posted_writes,
        )),
    };

    let dcache: Box<dyn DataCache> = match config.data_cache.kind {
        DataCacheKind::Ideal => Box::new(IdealDataCache),
        DataCacheKind::None => Box::new(NoDataCache),
        DataCacheKind::Lru => Box::new(LruDataCache::new(
            config.data_cache.size,
            config.data_cache.line_bytes,
            config.data_cache.ways,
        )),
    };

    let mc = &config.method_cache;
    let mcache: Box<dyn MethodCache> = match mc.kind {
        MethodCacheKind::Ideal => Box::new(IdealMethodCache),
        MethodCacheKind::Lru => Box::new(LruMethodCache::new(
            mc.size / mc.block_bytes,
            mc.block_bytes,
            mc.init_blocks,
            Replacement::Lru,
        )),
        MethodCacheKind::Fifo => Box::new(LruMethodCache::new(
            mc.size / mc.block_bytes,
            mc.block_bytes,
            mc.init_blocks,
            Replacement::Fifo,
        )),
    };

    let sc = &config.stack_cache;
    let scache: Box<dyn StackCache> = match sc.kind {
        StackCacheKind::Ideal => Box::new(IdealStackCache::new()),
        StackCacheKind::Block => Box::new(BlockStackCache::new(
            sc.size / sc.block_bytes,
            sc.block_bytes,
            sc.total_size / sc.block_bytes,
        )),
    };

    Simulator::new(
        memory,
        Box::new(IdealMemory::new(config.local_memory.size, false)),
        dcache,
        mcache,
        scache,
        sc.block_bytes,
    )
}

impl Simulator {
    /// Creates a simulator over the given memory hierarchy.
    pub fn new(
        memory: Box<dyn Memory>,
        local: Box<dyn Memory>,
        dcache: Box<dyn DataCache>,
        mcache: Box<dyn MethodCache>,
        scache: Box<dyn StackCache>,
        stack_block_bytes: u32,
    ) -> Self {
        let decoder = Decoder::new();
        let stats = SimStats::new(decoder.num_instructions());
        Self {
            cycle: 0,
            base: 0,
            pc: 0,
            npc: 0,
            gpr: Gpr::new(),
            prr: Prr::new(),
            spr: Spr::new(),
            stall: Stage::If,
            pipeline: Pipeline::new(),
            decoupled_load: InstrData::default(),
            decoupled_active: false,
            memory,
            local,
            dcache,
            mcache,
            scache,
            stack_block_bytes,
            decoder,
            symbols: SymbolMap::new(),
            stats,
        }
    }

    /// Raises the stall floor to at least `stage` for this cycle.
    pub fn stall(&mut self, stage: Stage) {
        self.stall = self.stall.max(stage);
    }

    /// Runs the simulation until it halts, fails, or exhausts
    /// `max_cycles`.
    ///
    /// Normal termination surfaces as a `FatalError` wrapping
    /// `SimError::Halt`.
    pub fn run(
        &mut self,
        entry: u32,
        max_cycles: u64,
        debug_fmt: DebugFmt,
        out: &mut dyn Write,
    ) -> Result<(), FatalError> {
        if self.cycle == 0 {
            self.base = entry;
            self.pc = entry;
            self.mcache
                .initialize(self.memory.as_mut(), entry)
                .map_err(|error| self.fatal(error))?;
        }

        for _ in 0..max_cycles {
            match self.step(debug_fmt, out) {
                Ok(()) => {}
                Err(error) => return Err(self.fatal(error)),
            }
        }
        Ok(())
    }

    fn fatal(&self, error: SimError) -> FatalError {
        FatalError {
            error,
            pc: self.pc,
            cycle: self.cycle,
        }
    }

    /// Simulates one cycle.
    fn step(&mut self, debug_fmt: DebugFmt, out: &mut dyn Write) -> SimResult<()> {
        // The decoupled load progresses in parallel with the pipeline.
        if self.decoupled_active {
            let mut load = self.decoupled_load;
            if load.dmw(self)? {
                self.decoupled_load = InstrData::default();
                self.decoupled_active = false;
            } else {
                self.decoupled_load = load;
            }
        }

        self.invoke(Stage::Mw, InstrData::mw)?;
        self.invoke(Stage::Ex, InstrData::ex)?;
        self.invoke(Stage::Dr, InstrData::dr)?;
        self.invoke(Stage::If, InstrData::if_stage)?;

        self.invoke(Stage::Mw, InstrData::mw_commit)?;
        self.invoke(Stage::Ex, InstrData::ex_commit)?;

        // The cycle counter is architecturally visible.
        self.spr.write(spr::SCL, self.cycle as u32);
        self.spr.write(spr::SCH, (self.cycle >> 32) as u32);

        self.track_retirement();
        self.stats.stall_cycles[self.stall as usize] += 1;

        if debug_fmt == DebugFmt::Instructions {
            let _ = self.print_bundle(Stage::Mw, out);
        }

        self.advance()?;
        self.stall = Stage::If;

        self.memory.tick();
        self.mcache.tick();
        self.scache.tick();

        let _ = self.print_cycle(debug_fmt, out);

        self.cycle += 1;
        Ok(())
    }

    fn invoke(&mut self, stage: Stage, f: StageFn) -> SimResult<()> {
        for slot in 0..NUM_SLOTS {
            let mut data = self.pipeline.slots[stage as usize][slot];
            f(&mut data, self, slot)?;
            self.pipeline.slots[stage as usize][slot] = data;
        }
        Ok(())
    }

    fn track_retirement(&mut self) {
        if self.stall == Stage::Mw {
            return;
        }
        for slot in 0..NUM_SLOTS {
            let data = &self.pipeline.slots[Stage::Mw as usize][slot];
            if data.is_bubble() {
                self.stats.bubbles_retired[slot] += 1;
            } else {
                let stat = &mut self.stats.instructions[data.id as usize][slot];
                if data.dr_pred {
                    stat.retired += 1;
                } else {
                    stat.discarded += 1;
                }
            }
        }
    }

    /// Advances the pipeline by one stage above the stall floor.
    ///
    /// Records from EX down to the floor are copied one stage up; the
    /// stage above the floor is then bubbled (or refilled by fetch when
    /// nothing stalled). A floor at MW retires nothing, injects nothing,
    /// and clears the EX forwarding cells so the stalled EX stage can
    /// refill them on its retry.
    fn advance(&mut self) -> SimResult<()> {
        for st in (self.stall as usize..=Stage::Ex as usize).rev() {
            self.pipeline.slots[st + 1] = self.pipeline.slots[st];
        }

        if self.stall > Stage::Ex {
            for slot in 0..NUM_SLOTS {
                self.pipeline.slots[Stage::Ex as usize][slot].gpr_ex.reset();
            }
        }

        if self.stall == Stage::If {
            self.fetch()?;
        } else if self.stall != Stage::Mw {
            self.pipeline.slots[self.stall as usize + 1] = Default::default();
        }
        Ok(())
    }

    /// Fetches and decodes the next bundle into the IF stage.
    fn fetch(&mut self) -> SimResult<()> {
        let mut iw = [0u32; NUM_SLOTS];
        self.mcache.fetch(self.memory.as_mut(), self.pc, &mut iw)?;

        let mut bundle = [InstrData::default(); NUM_SLOTS];
        let size = self.decoder.decode(iw, &mut bundle);
        if size == 0 {
            return Err(SimError::Illegal(iw[0]));
        }
        self.npc = self.pc + size as u32 * 4;

        for (slot, data) in bundle.iter().enumerate() {
            if !data.is_bubble() {
                self.stats.instructions[data.id as usize][slot].fetched += 1;
            }
        }
        self.pipeline.slots[Stage::If as usize] = bundle;
        Ok(())
    }

    /// Formats one instruction record for the trace output.
    fn format_instr(&self, data: &InstrData) -> String {
        if data.is_bubble() {
            return "---".to_string();
        }
        let name = self.decoder.name(data.id);
        let guard = if data.pred >= 8 {
            format!("(!p{})", data.pred - 8)
        } else {
            format!("( p{})", data.pred)
        };
        match data.op {
            Op::AluImm { rd, rs1, imm, .. } | Op::AluLong { rd, rs1, imm, .. } => {
                format!("{} {} r{} = r{}, {}", guard, name, rd, rs1, imm)
            }
            Op::AluReg { rd, rs1, rs2, .. } => {
                format!("{} {} r{} = r{}, r{}", guard, name, rd, rs1, rs2)
            }
            Op::AluUnary { rd, rs1, .. } => format!("{} {} r{} = r{}", guard, name, rd, rs1),
            Op::AluMul { rs1, rs2, .. } => format!("{} {} r{}, r{}", guard, name, rs1, rs2),
            Op::Compare { pd, rs1, rs2, .. } => {
                format!("{} {} p{} = r{}, r{}", guard, name, pd, rs1, rs2)
            }
            Op::PredAlu { pd, ps1, ps2, .. } => {
                format!("{} {} p{} = p{}, p{}", guard, name, pd, ps1, ps2)
            }
            Op::NopN { cycles } => format!("{} nop {}", guard, cycles),
            Op::Mts { sd, rs1 } => format!("{} mts s{} = r{}", guard, sd, rs1),
            Op::Mfs { rd, ss } => format!("{} mfs r{} = s{}", guard, rd, ss),
            Op::Load { rd, ra, imm, .. } => {
                format!("{} {} r{} = [r{} + {}]", guard, name, rd, ra, imm)
            }
            Op::DecoupledLoad { ra, imm, .. } => {
                format!("{} {} sm = [r{} + {}]", guard, name, ra, imm)
            }
            Op::Store { ra, rs, imm, .. } => {
                format!("{} {} [r{} + {}] = r{}", guard, name, ra, imm, rs)
            }
            Op::StackCtl { op, imm } => {
                let name = match op {
                    StackOp::Reserve => "sres",
                    StackOp::Ensure => "sens",
                    StackOp::Free => "sfree",
                };
                format!("{} {} {}", guard, name, imm)
            }
            Op::Call { imm } => format!("{} call {:#x}", guard, imm * 4),
            Op::Branch { imm } => format!("{} b {}", guard, imm),
            Op::CallReg { rs } => format!("{} callr r{}", guard, rs),
            Op::BranchReg { rs } => format!("{} br r{}", guard, rs),
            Op::Ret { rb, ro } => format!("{} ret r{}, r{}", guard, rb, ro),
            Op::Bne { rs1, rs2, imm } => format!("bne r{} != r{}, {}", rs1, rs2, imm),
            Op::WaitMem => format!("{} waitm", guard),
            Op::Bubble => unreachable!(),
        }
    }

    fn print_bundle(&self, stage: Stage, out: &mut dyn Write) -> io::Result<()> {
        let slots = &self.pipeline.slots[stage as usize];
        writeln!(
            out,
            "{:08x} {:9} {} || {}",
            self.pc,
            self.cycle,
            self.format_instr(&slots[0]),
            self.format_instr(&slots[1])
        )
    }

    /// Prints the per-cycle debug output.
    fn print_cycle(&mut self, debug_fmt: DebugFmt, out: &mut dyn Write) -> io::Result<()> {
        match debug_fmt {
            DebugFmt::None | DebugFmt::Instructions => Ok(()),
            DebugFmt::Trace => writeln!(out, "{:08x} {}", self.pc, self.cycle),
            DebugFmt::Blocks => {
                if let Some(name) = self.symbols.lookup(self.pc) {
                    writeln!(out, "{:08x} {:9} {}", self.pc, self.cycle, name)?;
                }
                Ok(())
            }
            DebugFmt::StackTrace => self.scache.trace(self.cycle, out),
            DebugFmt::Short | DebugFmt::Default => self.print_registers(debug_fmt, out),
            DebugFmt::All => {
                self.print_registers(DebugFmt::Default, out)?;
                writeln!(out, "Method Cache:")?;
                self.mcache.print_state(out)?;
                writeln!(out, "Stack Cache:")?;
                self.scache.print_state(out)?;
                writeln!(out, "Memory:")?;
                self.memory.print_state(out)
            }
        }
    }

    /// Prints the register files.
    pub fn print_registers(&self, debug_fmt: DebugFmt, out: &mut dyn Write) -> io::Result<()> {
        if debug_fmt == DebugFmt::Short {
            for r in 0..32 {
                write!(out, " r{:<2}: {:08x}", r, self.gpr.read(r))?;
            }
            return writeln!(out);
        }

        writeln!(out, "\nCyc : {}", self.cycle)?;
        write!(out, " PRR: ")?;
        for p in (0..8).rev() {
            write!(out, "{}", self.prr.read(p) as u32)?;
        }
        write!(out, "  BASE: {:08x}   PC : {:08x}   ", self.base, self.pc)?;
        if let Some((_, name)) = self.symbols.find_covering(self.pc) {
            write!(out, "{}", name)?;
        }
        writeln!(out)?;

        for r in 0..32 {
            write!(out, " r{:<2}: {:08x}", r, self.gpr.read(r))?;
            if r % 8 == 7 {
                writeln!(out)?;
            }
        }
        for sr in 0..32 {
            let value = if sr == spr::SZ {
                self.prr.gather()
            } else {
                self.spr.read(sr)
            };
            write!(out, " s{:<2}: {:08x}", sr, value)?;
            if sr % 8 == 7 {
                writeln!(out)?;
            }
        }
        Ok(())
    }

    /// Prints the summary statistics report.
    pub fn print_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\n==========================================================")?;
        writeln!(out, "PATMOS CORE SIMULATION STATISTICS")?;
        writeln!(out, "==========================================================")?;
        writeln!(out, "sim_cycles               {}", self.cycle)?;
        self.stats.print(&self.decoder, out)?;
        self.mcache.print_stats(out)?;
        self.dcache.print_stats(out)?;
        self.scache.print_stats(out)?;
        self.memory.print_stats(self.cycle, out)?;
        writeln!(out, "==========================================================")
    }
}
