//! Shared test helpers: instruction encoding, image building, and
//! simulator construction.
//!
//! The encoders produce the binary formats consumed by the decoder: bit
//! 31 is the bundle bit, bits 30:27 the guard predicate, bits 26:22 the
//! format opcode.

#![allow(dead_code)]

use patmos_sim::common::FatalError;
use patmos_sim::config::Config;
use patmos_sim::sim::{build_simulator, loader, DebugFmt, Simulator};

pub const BUNDLE: u32 = 0x8000_0000;

const FMT_ALUR: u32 = 16;
const FMT_SPC: u32 = 17;
const FMT_LDT: u32 = 18;
const FMT_STT: u32 = 19;
const FMT_STC: u32 = 20;
const FMT_CALL: u32 = 21;
const FMT_BR: u32 = 22;
const FMT_CFLR: u32 = 23;
const FMT_BNE: u32 = 24;
const FMT_ALUL: u32 = 31;

/// ALU function codes shared by the immediate, register, and long
/// formats.
pub mod func {
    pub const ADD: u32 = 0;
    pub const SUB: u32 = 1;
    pub const XOR: u32 = 2;
    pub const SL: u32 = 3;
    pub const SR: u32 = 4;
    pub const SRA: u32 = 5;
    pub const OR: u32 = 6;
    pub const AND: u32 = 7;
    pub const RL: u32 = 8;
    pub const RR: u32 = 9;
    pub const RSUB: u32 = 10;
    pub const NOR: u32 = 11;
    pub const SHADD: u32 = 12;
    pub const SHADD2: u32 = 13;

    pub const CMPEQ: u32 = 0;
    pub const CMPNEQ: u32 = 1;
    pub const CMPLT: u32 = 2;
    pub const CMPLE: u32 = 3;
    pub const CMPULT: u32 = 4;
    pub const CMPULE: u32 = 5;
    pub const BTEST: u32 = 6;

    pub const LWS: u32 = 0;
    pub const LWL: u32 = 1;
    pub const LWC: u32 = 2;
    pub const LWM: u32 = 3;
    pub const LHS: u32 = 4;
    pub const LHL: u32 = 5;
    pub const LHC: u32 = 6;
    pub const LHM: u32 = 7;
    pub const LBS: u32 = 8;
    pub const LBL: u32 = 9;
    pub const LBC: u32 = 10;
    pub const LBM: u32 = 11;
    pub const LHUS: u32 = 12;
    pub const LHUL: u32 = 13;
    pub const LHUC: u32 = 14;
    pub const LHUM: u32 = 15;
    pub const LBUS: u32 = 16;
    pub const LBUL: u32 = 17;
    pub const LBUC: u32 = 18;
    pub const LBUM: u32 = 19;
    pub const DLWC: u32 = 20;
    pub const DLWM: u32 = 21;

    pub const SWS: u32 = 0;
    pub const SWL: u32 = 1;
    pub const SWC: u32 = 2;
    pub const SWM: u32 = 3;
    pub const SHS: u32 = 4;
    pub const SHL: u32 = 5;
    pub const SHC: u32 = 6;
    pub const SHM: u32 = 7;
    pub const SBS: u32 = 8;
    pub const SBL: u32 = 9;
    pub const SBC: u32 = 10;
    pub const SBM: u32 = 11;

    pub const SRES: u32 = 0;
    pub const SENS: u32 = 1;
    pub const SFREE: u32 = 2;
}

fn guarded(pred: u32, fmt: u32) -> u32 {
    (pred << 27) | (fmt << 22)
}

/// ALU with a 12-bit immediate.
pub fn alui(pred: u32, f: u32, rd: u32, rs1: u32, imm: u32) -> u32 {
    (pred << 27) | (f << 22) | (rd << 17) | (rs1 << 12) | (imm & 0xFFF)
}

/// ALU with a 32-bit immediate; returns both bundle words.
pub fn alul(pred: u32, f: u32, rd: u32, rs1: u32, imm: u32) -> [u32; 2] {
    [
        BUNDLE | guarded(pred, FMT_ALUL) | (rd << 17) | (rs1 << 12) | f,
        imm,
    ]
}

/// Register-register ALU.
pub fn alur(pred: u32, f: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    guarded(pred, FMT_ALUR) | (rd << 17) | (rs1 << 12) | (rs2 << 7) | f
}

/// Unary ALU (sext8 0, sext16 1, zext16 2, abs 3).
pub fn aluu(pred: u32, f: u32, rd: u32, rs1: u32) -> u32 {
    guarded(pred, FMT_ALUR) | (rd << 17) | (rs1 << 12) | (1 << 4) | f
}

/// Multiply (mul/mulu).
pub fn alum(pred: u32, unsigned: bool, rs1: u32, rs2: u32) -> u32 {
    guarded(pred, FMT_ALUR) | (rs1 << 12) | (rs2 << 7) | (2 << 4) | unsigned as u32
}

/// Compare into a predicate register.
pub fn aluc(pred: u32, f: u32, pd: u32, rs1: u32, rs2: u32) -> u32 {
    guarded(pred, FMT_ALUR) | (pd << 17) | (rs1 << 12) | (rs2 << 7) | (3 << 4) | f
}

/// Predicate algebra (por 6, pand 7, pxor 10, pnor 11).
pub fn alup(pred: u32, f: u32, pd: u32, ps1: u32, ps2: u32) -> u32 {
    guarded(pred, FMT_ALUR) | (pd << 17) | (ps1 << 12) | (ps2 << 7) | (4 << 4) | f
}

/// Multi-cycle nop.
pub fn nopn(pred: u32, cycles: u32) -> u32 {
    guarded(pred, FMT_SPC) | cycles
}

/// Wait for the decoupled load to retire.
pub fn waitm(pred: u32) -> u32 {
    guarded(pred, FMT_SPC) | (1 << 6)
}

/// Move general register to special register.
pub fn mts(pred: u32, sd: u32, rs1: u32) -> u32 {
    guarded(pred, FMT_SPC) | (2 << 6) | (rs1 << 12) | sd
}

/// Move special register to general register.
pub fn mfs(pred: u32, rd: u32, ss: u32) -> u32 {
    guarded(pred, FMT_SPC) | (3 << 6) | (rd << 17) | ss
}

/// Load (see `func` for the area/width codes).
pub fn ldt(pred: u32, f: u32, rd: u32, ra: u32, imm: i32) -> u32 {
    guarded(pred, FMT_LDT) | (rd << 17) | (ra << 12) | (f << 7) | (imm as u32 & 0x7F)
}

/// Store.
pub fn stt(pred: u32, f: u32, ra: u32, rs: u32, imm: i32) -> u32 {
    guarded(pred, FMT_STT) | (f << 17) | (ra << 12) | (rs << 7) | (imm as u32 & 0x7F)
}

/// Stack control; the immediate counts stack-cache blocks.
pub fn stc(pred: u32, f: u32, imm: u32) -> u32 {
    guarded(pred, FMT_STC) | (f << 18) | (imm & 0x3_FFFF)
}

/// Call to an absolute word address.
pub fn call(pred: u32, word_addr: u32) -> u32 {
    guarded(pred, FMT_CALL) | (word_addr & 0x3F_FFFF)
}

/// PC-relative branch (word offset).
pub fn b(pred: u32, imm: i32) -> u32 {
    guarded(pred, FMT_BR) | (imm as u32 & 0x3F_FFFF)
}

/// Return through r30/r31.
pub fn ret(pred: u32) -> u32 {
    guarded(pred, FMT_CFLR) | (30 << 12) | (31 << 7)
}

/// Register-indirect call.
pub fn callr(pred: u32, rs: u32) -> u32 {
    guarded(pred, FMT_CFLR) | (rs << 12) | 1
}

/// Register-indirect branch.
pub fn brr(pred: u32, rs: u32) -> u32 {
    guarded(pred, FMT_CFLR) | (rs << 12) | 2
}

/// Unpredicated compare-and-branch (word offset).
pub fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
    (FMT_BNE << 22) | (rs1 << 12) | (rs2 << 7) | (imm as u32 & 0x7F)
}

/// The canonical no-op: subi r0 = r0, 0.
pub fn nop() -> u32 {
    alui(0, func::SUB, 0, 0, 0)
}

/// A flat binary image under construction.
pub struct Image {
    pub bytes: Vec<u8>,
}

impl Image {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn ensure(&mut self, end: usize) {
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
    }

    /// Places raw bytes at an address.
    pub fn data(&mut self, address: u32, data: &[u8]) -> &mut Self {
        let start = address as usize;
        self.ensure(start + data.len());
        self.bytes[start..start + data.len()].copy_from_slice(data);
        self
    }

    /// Places a big-endian word at an address.
    pub fn word(&mut self, address: u32, value: u32) -> &mut Self {
        self.data(address, &value.to_be_bytes())
    }

    /// Places a method: its size header at `base - 4`, its words at
    /// `base`.
    pub fn method(&mut self, base: u32, words: &[u32]) -> &mut Self {
        self.word(base - 4, words.len() as u32 * 4);
        for (i, word) in words.iter().enumerate() {
            self.word(base + i as u32 * 4, *word);
        }
        self
    }
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test configuration: 64 KiB main memory behind a fixed-delay
/// controller with a noticeable burst cost.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.memory.size = 0x1_0000;
    config.memory.ticks_per_burst = 2;
    config.memory.read_delay = 2;
    config
}

/// Builds a simulator and loads the image at address 0.
pub fn build_sim(config: &Config, image: &Image) -> Simulator {
    let mut sim = build_simulator(config);
    loader::load_sections(sim.memory.as_mut(), &[(0, &image.bytes)])
        .expect("image must fit in memory");
    sim
}

pub const ENTRY: u32 = 0x4;
pub const MAX_CYCLES: u64 = 100_000;

/// Runs a single-method program placed at the entry address until it
/// halts or fails.
pub fn run_words(words: &[u32]) -> (Simulator, FatalError) {
    run_image_words(Image::new(), words)
}

/// Runs a single-method program against a prepared image.
pub fn run_image_words(mut image: Image, words: &[u32]) -> (Simulator, FatalError) {
    image.method(ENTRY, words);
    let mut sim = build_sim(&test_config(), &image);
    let result = sim.run(ENTRY, MAX_CYCLES, DebugFmt::None, &mut std::io::sink());
    let fatal = result.expect_err("program must halt or fail");
    (sim, fatal)
}

/// Appends the halt sequence (return to address 0 plus delay slots).
pub fn with_halt(words: &[u32]) -> Vec<u32> {
    let mut program = words.to_vec();
    program.extend_from_slice(&[ret(0), nop(), nop()]);
    program
}
