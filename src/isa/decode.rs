//! Instruction decoder.
//!
//! Bundles are decoded against a table of binary formats. Every table
//! entry carries a fixed mask/pattern pair over the 32-bit word; exactly
//! one entry may match a word (duplicate matches are a table bug and
//! asserted against in debug builds). A word matching no entry is an
//! illegal instruction.
//!
//! Word layout: bit 31 is the bundle bit, bits 30:27 the guard predicate,
//! bits 26:22 the format opcode. A set bundle bit pairs the word with its
//! successor, either as the second issue slot or as the 32-bit immediate
//! of a long ALU instruction (slot 0 only). A clear bundle bit issues the
//! word alone with a bubble in slot 1.

use crate::common::types::sign_extend;
use crate::common::{MemSize, NUM_SLOTS};
use crate::isa::op::{AluOp, CompareOp, MemArea, Op, PredOp, StackOp, UnaryOp};
use crate::isa::InstrData;

/// Format opcodes (bits 26:22). Values 0-15 encode the ALU-immediate
/// family with the function in bits 25:22.
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

/// Register-family sub-opcodes (bits 6:4 of the ALU-register format).
const SUB_ALUR: u32 = 0;
const SUB_ALUU: u32 = 1;
const SUB_ALUM: u32 = 2;
const SUB_ALUC: u32 = 3;
const SUB_ALUP: u32 = 4;

const MASK_FMT: u32 = 0x1F << 22;
const MASK_SUB: u32 = 0x7 << 4;
const MASK_FUNC: u32 = 0xF;

/// Issue-slot legality of a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotRule {
    /// May issue in either slot.
    Any,
    /// Slot 0 only.
    First,
    /// Slot 0 only, consumes the second slot as a long immediate.
    Long,
}

/// A binary format table entry.
struct Format {
    name: &'static str,
    mask: u32,
    pattern: u32,
    slots: SlotRule,
    decode: fn(iw: u32, imm: u32) -> Op,
}

fn pred(iw: u32) -> usize {
    ((iw >> 27) & 0xF) as usize
}

fn rd(iw: u32) -> usize {
    ((iw >> 17) & 0x1F) as usize
}

fn rs1(iw: u32) -> usize {
    ((iw >> 12) & 0x1F) as usize
}

fn rs2(iw: u32) -> usize {
    ((iw >> 7) & 0x1F) as usize
}

fn pd(iw: u32) -> usize {
    ((iw >> 17) & 0x7) as usize
}

fn ps1(iw: u32) -> usize {
    ((iw >> 12) & 0xF) as usize
}

fn ps2(iw: u32) -> usize {
    ((iw >> 7) & 0xF) as usize
}

fn imm12(iw: u32) -> u32 {
    iw & 0xFFF
}

fn imm7s(iw: u32) -> i32 {
    sign_extend(iw & 0x7F, 7)
}

const ALU_FUNCS: [(AluOp, &str, &str, &str); 14] = [
    (AluOp::Add, "addi", "addl", "add"),
    (AluOp::Sub, "subi", "subl", "sub"),
    (AluOp::Xor, "xori", "xorl", "xor"),
    (AluOp::Sl, "sli", "sll", "sl"),
    (AluOp::Sr, "sri", "srl", "sr"),
    (AluOp::Sra, "srai", "sral", "sra"),
    (AluOp::Or, "ori", "orl", "or"),
    (AluOp::And, "andi", "andl", "and"),
    (AluOp::Rl, "rli", "rll", "rl"),
    (AluOp::Rr, "rri", "rrl", "rr"),
    (AluOp::Rsub, "rsubi", "rsubl", "rsub"),
    (AluOp::Nor, "nori", "norl", "nor"),
    (AluOp::Shadd, "shaddi", "shaddl", "shadd"),
    (AluOp::Shadd2, "shadd2i", "shadd2l", "shadd2"),
];

/// Load table in function order: area-major over word/half/byte widths,
/// signed then unsigned, then the decoupled variants.
const LOAD_FUNCS: [(&str, MemArea, MemSize, bool); 20] = [
    ("lws", MemArea::Stack, MemSize::Word, true),
    ("lwl", MemArea::Local, MemSize::Word, true),
    ("lwc", MemArea::Data, MemSize::Word, true),
    ("lwm", MemArea::Main, MemSize::Word, true),
    ("lhs", MemArea::Stack, MemSize::Half, true),
    ("lhl", MemArea::Local, MemSize::Half, true),
    ("lhc", MemArea::Data, MemSize::Half, true),
    ("lhm", MemArea::Main, MemSize::Half, true),
    ("lbs", MemArea::Stack, MemSize::Byte, true),
    ("lbl", MemArea::Local, MemSize::Byte, true),
    ("lbc", MemArea::Data, MemSize::Byte, true),
    ("lbm", MemArea::Main, MemSize::Byte, true),
    ("lhus", MemArea::Stack, MemSize::Half, false),
    ("lhul", MemArea::Local, MemSize::Half, false),
    ("lhuc", MemArea::Data, MemSize::Half, false),
    ("lhum", MemArea::Main, MemSize::Half, false),
    ("lbus", MemArea::Stack, MemSize::Byte, false),
    ("lbul", MemArea::Local, MemSize::Byte, false),
    ("lbuc", MemArea::Data, MemSize::Byte, false),
    ("lbum", MemArea::Main, MemSize::Byte, false),
];

const DLOAD_FUNCS: [(&str, MemArea, MemSize, bool); 10] = [
    ("dlwc", MemArea::Data, MemSize::Word, true),
    ("dlwm", MemArea::Main, MemSize::Word, true),
    ("dlhc", MemArea::Data, MemSize::Half, true),
    ("dlhm", MemArea::Main, MemSize::Half, true),
    ("dlbc", MemArea::Data, MemSize::Byte, true),
    ("dlbm", MemArea::Main, MemSize::Byte, true),
    ("dlhuc", MemArea::Data, MemSize::Half, false),
    ("dlhum", MemArea::Main, MemSize::Half, false),
    ("dlbuc", MemArea::Data, MemSize::Byte, false),
    ("dlbum", MemArea::Main, MemSize::Byte, false),
];

const STORE_FUNCS: [(&str, MemArea, MemSize); 12] = [
    ("sws", MemArea::Stack, MemSize::Word),
    ("swl", MemArea::Local, MemSize::Word),
    ("swc", MemArea::Data, MemSize::Word),
    ("swm", MemArea::Main, MemSize::Word),
    ("shs", MemArea::Stack, MemSize::Half),
    ("shl", MemArea::Local, MemSize::Half),
    ("shc", MemArea::Data, MemSize::Half),
    ("shm", MemArea::Main, MemSize::Half),
    ("sbs", MemArea::Stack, MemSize::Byte),
    ("sbl", MemArea::Local, MemSize::Byte),
    ("sbc", MemArea::Data, MemSize::Byte),
    ("sbm", MemArea::Main, MemSize::Byte),
];

/// The instruction decoder.
///
/// Owns the format table; entry indices double as instruction IDs for the
/// statistics tables.
pub struct Decoder {
    formats: Vec<Format>,
    /// Table index of the canonical no-op (`subi r0 = r0, 0`).
    pub nop_id: u16,
}

impl Decoder {
    /// Builds the decoder table.
    pub fn new() -> Self {
        let mut formats = Vec::new();

        // ALUi: the function selects the table entry.
        for (func, &(_, name, _, _)) in ALU_FUNCS.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT,
                pattern: (func as u32) << 22,
                slots: SlotRule::Any,
                decode: alui_decoders()[func],
            });
        }
        let nop_id = 1;

        // ALUl: same functions against the long-immediate format.
        for (func, &(_, _, name, _)) in ALU_FUNCS.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | MASK_SUB | MASK_FUNC,
                pattern: (FMT_ALUL << 22) | func as u32,
                slots: SlotRule::Long,
                decode: alul_decoders()[func],
            });
        }

        // ALUr.
        for (func, &(_, _, _, name)) in ALU_FUNCS.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | MASK_SUB | MASK_FUNC,
                pattern: (FMT_ALUR << 22) | (SUB_ALUR << 4) | func as u32,
                slots: SlotRule::Any,
                decode: alur_decoders()[func],
            });
        }

        // ALUu.
        for (func, name) in ["sext8", "sext16", "zext16", "abs"].iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | MASK_SUB | MASK_FUNC,
                pattern: (FMT_ALUR << 22) | (SUB_ALUU << 4) | func as u32,
                slots: SlotRule::Any,
                decode: aluu_decoders()[func],
            });
        }

        // ALUm.
        formats.push(Format {
            name: "mul",
            mask: MASK_FMT | MASK_SUB | MASK_FUNC,
            pattern: (FMT_ALUR << 22) | (SUB_ALUM << 4),
            slots: SlotRule::Any,
            decode: |iw, _| Op::AluMul { unsigned: false, rs1: rs1(iw), rs2: rs2(iw) },
        });
        formats.push(Format {
            name: "mulu",
            mask: MASK_FMT | MASK_SUB | MASK_FUNC,
            pattern: (FMT_ALUR << 22) | (SUB_ALUM << 4) | 1,
            slots: SlotRule::Any,
            decode: |iw, _| Op::AluMul { unsigned: true, rs1: rs1(iw), rs2: rs2(iw) },
        });

        // ALUc.
        let compares = [
            ("cmpeq", CompareOp::Eq),
            ("cmpneq", CompareOp::Neq),
            ("cmplt", CompareOp::Lt),
            ("cmple", CompareOp::Le),
            ("cmpult", CompareOp::Ult),
            ("cmpule", CompareOp::Ule),
            ("btest", CompareOp::Btest),
        ];
        for (func, &(name, _)) in compares.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | MASK_SUB | MASK_FUNC,
                pattern: (FMT_ALUR << 22) | (SUB_ALUC << 4) | func as u32,
                slots: SlotRule::Any,
                decode: aluc_decoders()[func],
            });
        }

        // ALUp.
        let preds = [
            ("por", PredOp::Por, 6u32),
            ("pand", PredOp::Pand, 7),
            ("pxor", PredOp::Pxor, 10),
            ("pnor", PredOp::Pnor, 11),
        ];
        for (i, &(name, _, func)) in preds.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | MASK_SUB | MASK_FUNC,
                pattern: (FMT_ALUR << 22) | (SUB_ALUP << 4) | func,
                slots: SlotRule::Any,
                decode: alup_decoders()[i],
            });
        }

        // SPC.
        formats.push(Format {
            name: "nop",
            mask: MASK_FMT | (0x7 << 6),
            pattern: FMT_SPC << 22,
            slots: SlotRule::First,
            decode: |iw, _| Op::NopN { cycles: iw & 0x3F },
        });
        formats.push(Format {
            name: "waitm",
            mask: MASK_FMT | (0x7 << 6),
            pattern: (FMT_SPC << 22) | (1 << 6),
            slots: SlotRule::First,
            decode: |_, _| Op::WaitMem,
        });
        formats.push(Format {
            name: "mts",
            mask: MASK_FMT | (0x7 << 6),
            pattern: (FMT_SPC << 22) | (2 << 6),
            slots: SlotRule::First,
            decode: |iw, _| Op::Mts { sd: (iw & 0x1F) as usize, rs1: rs1(iw) },
        });
        formats.push(Format {
            name: "mfs",
            mask: MASK_FMT | (0x7 << 6),
            pattern: (FMT_SPC << 22) | (3 << 6),
            slots: SlotRule::First,
            decode: |iw, _| Op::Mfs { rd: rd(iw), ss: (iw & 0x1F) as usize },
        });

        // LDT: plain loads then decoupled loads.
        for (func, &(name, ..)) in LOAD_FUNCS.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | (0x1F << 7),
                pattern: (FMT_LDT << 22) | ((func as u32) << 7),
                slots: SlotRule::First,
                decode: load_decoders()[func],
            });
        }
        for (i, &(name, ..)) in DLOAD_FUNCS.iter().enumerate() {
            let func = (LOAD_FUNCS.len() + i) as u32;
            formats.push(Format {
                name,
                mask: MASK_FMT | (0x1F << 7),
                pattern: (FMT_LDT << 22) | (func << 7),
                slots: SlotRule::First,
                decode: dload_decoders()[i],
            });
        }

        // STT.
        for (func, &(name, ..)) in STORE_FUNCS.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | (0x1F << 17),
                pattern: (FMT_STT << 22) | ((func as u32) << 17),
                slots: SlotRule::First,
                decode: store_decoders()[func],
            });
        }

        // STC.
        let stack_ops = [
            ("sres", StackOp::Reserve),
            ("sens", StackOp::Ensure),
            ("sfree", StackOp::Free),
        ];
        for (func, &(name, _)) in stack_ops.iter().enumerate() {
            formats.push(Format {
                name,
                mask: MASK_FMT | (0xF << 18),
                pattern: (FMT_STC << 22) | ((func as u32) << 18),
                slots: SlotRule::First,
                decode: stc_decoders()[func],
            });
        }

        // Control flow.
        formats.push(Format {
            name: "call",
            mask: MASK_FMT,
            pattern: FMT_CALL << 22,
            slots: SlotRule::First,
            decode: |iw, _| Op::Call { imm: iw & 0x3F_FFFF },
        });
        formats.push(Format {
            name: "b",
            mask: MASK_FMT,
            pattern: FMT_BR << 22,
            slots: SlotRule::First,
            decode: |iw, _| Op::Branch { imm: sign_extend(iw & 0x3F_FFFF, 22) },
        });
        formats.push(Format {
            name: "ret",
            mask: MASK_FMT | MASK_FUNC,
            pattern: FMT_CFLR << 22,
            slots: SlotRule::First,
            decode: |iw, _| Op::Ret { rb: rs1(iw), ro: rs2(iw) },
        });
        formats.push(Format {
            name: "callr",
            mask: MASK_FMT | MASK_FUNC,
            pattern: (FMT_CFLR << 22) | 1,
            slots: SlotRule::First,
            decode: |iw, _| Op::CallReg { rs: rs1(iw) },
        });
        formats.push(Format {
            name: "br",
            mask: MASK_FMT | MASK_FUNC,
            pattern: (FMT_CFLR << 22) | 2,
            slots: SlotRule::First,
            decode: |iw, _| Op::BranchReg { rs: rs1(iw) },
        });
        formats.push(Format {
            name: "bne",
            mask: MASK_FMT,
            pattern: FMT_BNE << 22,
            slots: SlotRule::First,
            decode: |iw, _| Op::Bne { rs1: rs1(iw), rs2: rs2(iw), imm: imm7s(iw) },
        });

        Self { formats, nop_id }
    }

    /// Number of instruction variants in the table.
    pub fn num_instructions(&self) -> usize {
        self.formats.len()
    }

    /// Mnemonic of a table entry.
    pub fn name(&self, id: u16) -> &'static str {
        self.formats[id as usize].name
    }

    /// True when the record is the canonical no-op rather than a bubble.
    pub fn is_nop(&self, data: &InstrData) -> bool {
        data.id == self.nop_id && matches!(data.op, Op::AluImm { rd: 0, .. })
    }

    /// Decodes one instruction word for a given slot.
    ///
    /// Returns the table id, the operation, and whether the format
    /// consumes the second slot as a long immediate.
    fn decode_slot(&self, iw: u32, imm: u32, slot: usize) -> Option<(u16, Op, bool)> {
        let mut result = None;
        for (id, fmt) in self.formats.iter().enumerate() {
            if iw & fmt.mask != fmt.pattern {
                continue;
            }
            if slot != 0 && fmt.slots != SlotRule::Any {
                continue;
            }
            debug_assert!(result.is_none(), "duplicate format match for {:#010x}", iw);
            result = Some((id as u16, (fmt.decode)(iw, imm), fmt.slots == SlotRule::Long));
            if !cfg!(debug_assertions) {
                break;
            }
        }
        result
    }

    /// Decodes a fetched bundle into instruction records.
    ///
    /// # Returns
    ///
    /// The number of words consumed (1 or 2), or 0 when the bundle does
    /// not decode. Empty slots hold bubbles.
    pub fn decode(&self, iw: [u32; NUM_SLOTS], out: &mut [InstrData; NUM_SLOTS]) -> usize {
        let Some((id, op, long)) = self.decode_slot(iw[0], iw[1], 0) else {
            return 0;
        };
        out[0] = InstrData {
            op,
            id,
            pred: pred(iw[0]),
            ..Default::default()
        };
        out[1] = InstrData::default();

        if long {
            // Long immediate: the second word is data, slot 1 stays a
            // bubble.
            debug_assert!(iw[0] & 0x8000_0000 != 0, "long formats carry the bundle bit");
            return 2;
        }
        if iw[0] & 0x8000_0000 == 0 {
            return 1;
        }

        // Dual-issue bundle: decode the second word into slot 1.
        match self.decode_slot(iw[1], 0, 1) {
            Some((id, op, _)) => {
                out[1] = InstrData {
                    op,
                    id,
                    pred: pred(iw[1]),
                    ..Default::default()
                };
                2
            }
            None => 0,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-function decode closures for the ALU-immediate format.
///
/// Tables of `fn` pointers keep the `Format` entries uniform; each index
/// corresponds to the same index in `ALU_FUNCS`.
fn alui_decoders() -> [fn(u32, u32) -> Op; 14] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, _| Op::AluImm { op: AluOp::$variant, rd: rd(iw), rs1: rs1(iw), imm: imm12(iw) }
        };
    }
    [
        d!(Add), d!(Sub), d!(Xor), d!(Sl), d!(Sr), d!(Sra), d!(Or), d!(And),
        d!(Rl), d!(Rr), d!(Rsub), d!(Nor), d!(Shadd), d!(Shadd2),
    ]
}

fn alul_decoders() -> [fn(u32, u32) -> Op; 14] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, imm| Op::AluLong { op: AluOp::$variant, rd: rd(iw), rs1: rs1(iw), imm }
        };
    }
    [
        d!(Add), d!(Sub), d!(Xor), d!(Sl), d!(Sr), d!(Sra), d!(Or), d!(And),
        d!(Rl), d!(Rr), d!(Rsub), d!(Nor), d!(Shadd), d!(Shadd2),
    ]
}

fn alur_decoders() -> [fn(u32, u32) -> Op; 14] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, _| Op::AluReg { op: AluOp::$variant, rd: rd(iw), rs1: rs1(iw), rs2: rs2(iw) }
        };
    }
    [
        d!(Add), d!(Sub), d!(Xor), d!(Sl), d!(Sr), d!(Sra), d!(Or), d!(And),
        d!(Rl), d!(Rr), d!(Rsub), d!(Nor), d!(Shadd), d!(Shadd2),
    ]
}

fn aluu_decoders() -> [fn(u32, u32) -> Op; 4] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, _| Op::AluUnary { op: UnaryOp::$variant, rd: rd(iw), rs1: rs1(iw) }
        };
    }
    [d!(Sext8), d!(Sext16), d!(Zext16), d!(Abs)]
}

fn aluc_decoders() -> [fn(u32, u32) -> Op; 7] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, _| Op::Compare { op: CompareOp::$variant, pd: pd(iw), rs1: rs1(iw), rs2: rs2(iw) }
        };
    }
    [d!(Eq), d!(Neq), d!(Lt), d!(Le), d!(Ult), d!(Ule), d!(Btest)]
}

fn alup_decoders() -> [fn(u32, u32) -> Op; 4] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, _| Op::PredAlu { op: PredOp::$variant, pd: pd(iw), ps1: ps1(iw), ps2: ps2(iw) }
        };
    }
    [d!(Por), d!(Pand), d!(Pxor), d!(Pnor)]
}

fn load_decoders() -> [fn(u32, u32) -> Op; 20] {
    macro_rules! d {
        ($area:ident, $size:ident, $signed:expr) => {
            |iw, _| Op::Load {
                area: MemArea::$area,
                size: MemSize::$size,
                signed: $signed,
                rd: rd(iw),
                ra: rs1(iw),
                imm: imm7s(iw),
            }
        };
    }
    [
        d!(Stack, Word, true), d!(Local, Word, true), d!(Data, Word, true), d!(Main, Word, true),
        d!(Stack, Half, true), d!(Local, Half, true), d!(Data, Half, true), d!(Main, Half, true),
        d!(Stack, Byte, true), d!(Local, Byte, true), d!(Data, Byte, true), d!(Main, Byte, true),
        d!(Stack, Half, false), d!(Local, Half, false), d!(Data, Half, false), d!(Main, Half, false),
        d!(Stack, Byte, false), d!(Local, Byte, false), d!(Data, Byte, false), d!(Main, Byte, false),
    ]
}

fn dload_decoders() -> [fn(u32, u32) -> Op; 10] {
    macro_rules! d {
        ($area:ident, $size:ident, $signed:expr) => {
            |iw, _| Op::DecoupledLoad {
                area: MemArea::$area,
                size: MemSize::$size,
                signed: $signed,
                ra: rs1(iw),
                imm: imm7s(iw),
            }
        };
    }
    [
        d!(Data, Word, true), d!(Main, Word, true),
        d!(Data, Half, true), d!(Main, Half, true),
        d!(Data, Byte, true), d!(Main, Byte, true),
        d!(Data, Half, false), d!(Main, Half, false),
        d!(Data, Byte, false), d!(Main, Byte, false),
    ]
}

fn store_decoders() -> [fn(u32, u32) -> Op; 12] {
    macro_rules! d {
        ($area:ident, $size:ident) => {
            |iw, _| Op::Store {
                area: MemArea::$area,
                size: MemSize::$size,
                ra: rs1(iw),
                rs: rs2(iw),
                imm: imm7s(iw),
            }
        };
    }
    [
        d!(Stack, Word), d!(Local, Word), d!(Data, Word), d!(Main, Word),
        d!(Stack, Half), d!(Local, Half), d!(Data, Half), d!(Main, Half),
        d!(Stack, Byte), d!(Local, Byte), d!(Data, Byte), d!(Main, Byte),
    ]
}

fn stc_decoders() -> [fn(u32, u32) -> Op; 3] {
    macro_rules! d {
        ($variant:ident) => {
            |iw, _| Op::StackCtl { op: StackOp::$variant, imm: iw & 0x3_FFFF }
        };
    }
    [d!(Reserve), d!(Ensure), d!(Free)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(decoder: &Decoder, iw0: u32, iw1: u32) -> (usize, [InstrData; NUM_SLOTS]) {
        let mut out = [InstrData::default(); NUM_SLOTS];
        let size = decoder.decode([iw0, iw1], &mut out);
        (size, out)
    }

    /// subi r0 = r0, 0 in slot 0 with a clear bundle bit.
    const NOP_WORD: u32 = 1 << 22;

    #[test]
    fn single_word_injects_slot1_bubble() {
        let decoder = Decoder::new();
        let (size, out) = decode_one(&decoder, NOP_WORD, 0xFFFF_FFFF);
        assert_eq!(size, 1);
        assert!(matches!(out[0].op, Op::AluImm { op: AluOp::Sub, rd: 0, rs1: 0, imm: 0 }));
        assert!(out[1].is_bubble());
        assert!(decoder.is_nop(&out[0]));
    }

    #[test]
    fn bundle_bit_decodes_both_slots() {
        let decoder = Decoder::new();
        // addi r1 = r2, 3 || add r4 = r5, r6
        let iw0 = 0x8000_0000 | (1 << 17) | (2 << 12) | 3;
        let iw1 = (FMT_ALUR << 22) | (4 << 17) | (5 << 12) | (6 << 7);
        let (size, out) = decode_one(&decoder, iw0, iw1);
        assert_eq!(size, 2);
        assert!(matches!(out[0].op, Op::AluImm { op: AluOp::Add, rd: 1, rs1: 2, imm: 3 }));
        assert!(matches!(out[1].op, Op::AluReg { op: AluOp::Add, rd: 4, rs1: 5, rs2: 6 }));
    }

    #[test]
    fn long_immediate_consumes_second_slot() {
        let decoder = Decoder::new();
        let iw0 = 0x8000_0000 | (FMT_ALUL << 22) | (7 << 17) | (2 << 12);
        let (size, out) = decode_one(&decoder, iw0, 0xDEAD_BEEF);
        assert_eq!(size, 2);
        assert!(matches!(
            out[0].op,
            Op::AluLong { op: AluOp::Add, rd: 7, rs1: 2, imm: 0xDEAD_BEEF }
        ));
        assert!(out[1].is_bubble());
    }

    #[test]
    fn non_alu_rejected_in_slot1() {
        let decoder = Decoder::new();
        // addi || waitm: the SPC format is slot-0 only.
        let iw0 = 0x8000_0000 | NOP_WORD;
        let iw1 = (FMT_SPC << 22) | (1 << 6);
        let (size, _) = decode_one(&decoder, iw0, iw1);
        assert_eq!(size, 0, "slot-0-only format must not decode in slot 1");
    }

    #[test]
    fn unknown_word_fails_to_decode() {
        let decoder = Decoder::new();
        // Format opcode 30 is unassigned.
        let (size, _) = decode_one(&decoder, 30 << 22, 0);
        assert_eq!(size, 0);
    }

    #[test]
    fn predicate_field_is_extracted() {
        let decoder = Decoder::new();
        let iw0 = (9 << 27) | NOP_WORD;
        let (size, out) = decode_one(&decoder, iw0, 0);
        assert_eq!(size, 1);
        assert_eq!(out[0].pred, 9, "negated p1");
    }

    #[test]
    fn load_and_store_functions_decode() {
        let decoder = Decoder::new();
        // lwc r3 = [r4 + -1]
        let iw0 = (FMT_LDT << 22) | (3 << 17) | (4 << 12) | (2 << 7) | 0x7F;
        let (_, out) = decode_one(&decoder, iw0, 0);
        assert!(matches!(
            out[0].op,
            Op::Load { area: MemArea::Data, size: MemSize::Word, signed: true, rd: 3, ra: 4, imm: -1 }
        ));

        // sbm [r1 + 2] = r7
        let iw0 = (FMT_STT << 22) | (11 << 17) | (1 << 12) | (7 << 7) | 2;
        let (_, out) = decode_one(&decoder, iw0, 0);
        assert!(matches!(
            out[0].op,
            Op::Store { area: MemArea::Main, size: MemSize::Byte, ra: 1, rs: 7, imm: 2 }
        ));
    }

    #[test]
    fn every_pattern_matches_its_own_entry_only() {
        let decoder = Decoder::new();
        for fmt in &decoder.formats {
            let matching: Vec<_> = decoder
                .formats
                .iter()
                .filter(|f| fmt.pattern & f.mask == f.pattern)
                .map(|f| f.name)
                .collect();
            assert_eq!(matching, vec![fmt.name], "pattern of {} is ambiguous", fmt.name);
        }
    }
}
