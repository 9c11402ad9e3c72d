//! Per-stage instruction behaviors.
//!
//! Each instruction record runs a behavior for the stage currently
//! holding it, in the order MW, EX, DR, IF within a cycle, followed by the
//! commit phases. The behaviors mutate the record's scratch fields and the
//! simulator's architectural state; results flow to later readers through
//! the bypass cells (see `core::pipeline::bypass`).

use crate::common::{MemSize, SimError, SimResult};
use crate::core::pipeline::bypass::GprOp;
use crate::core::pipeline::Stage;
use crate::core::units::alu;
use crate::isa::abi;
use crate::isa::op::{MemArea, Op, StackOp};
use crate::isa::InstrData;
use crate::sim::Simulator;
use crate::core::arch::spr;

/// Resolves a DR-captured operand against the forwarding cells.
///
/// Priority: this slot's EX cell, the other slot's EX cell, this slot's
/// MW cell, the other slot's MW cell, then the captured value.
pub fn read_gpr_ex(s: &Simulator, slot: usize, op: GprOp) -> u32 {
    let ex = &s.pipeline.slots[Stage::Ex as usize];
    let mw = &s.pipeline.slots[Stage::Mw as usize];
    let other = 1 - slot;
    ex[slot]
        .gpr_ex
        .resolve(ex[other].gpr_ex.resolve(mw[slot].gpr_mw.resolve(mw[other].gpr_mw.resolve(op))))
        .value
}

/// Checks the alignment of a memory access.
fn check_aligned(address: u32, width: u32) -> SimResult<()> {
    if address & (width - 1) != 0 {
        return Err(SimError::Unaligned(address));
    }
    Ok(())
}

impl InstrData {
    /// IF-stage behavior: advance the program counter.
    ///
    /// Control-flow instructions additionally latch their own fetch
    /// address for PC-relative targets. The latch only fires while the
    /// PC has not caught up with nPC, i.e. on the first invocation after
    /// the fetch.
    pub fn if_stage(&mut self, s: &mut Simulator, _slot: usize) -> SimResult<()> {
        if self.is_bubble() {
            return Ok(());
        }
        if self.op.is_control_flow() && s.pc != s.npc {
            self.if_pc = s.pc;
        }
        s.pc = s.npc;
        Ok(())
    }

    /// DR-stage behavior: read the guard predicate and register operands.
    pub fn dr(&mut self, s: &mut Simulator, _slot: usize) -> SimResult<()> {
        self.dr_pred = s.prr.read(self.pred);

        match self.op {
            Op::Bubble => {}
            Op::AluImm { rs1, .. } | Op::AluLong { rs1, .. } | Op::AluUnary { rs1, .. } => {
                self.dr_rs1 = s.gpr.read_op(rs1);
            }
            Op::AluReg { rs1, rs2, .. }
            | Op::AluMul { rs1, rs2, .. }
            | Op::Compare { rs1, rs2, .. } => {
                self.dr_rs1 = s.gpr.read_op(rs1);
                self.dr_rs2 = s.gpr.read_op(rs2);
            }
            Op::PredAlu { ps1, ps2, .. } => {
                self.dr_ps1 = s.prr.read(ps1);
                self.dr_ps2 = s.prr.read(ps2);
            }
            Op::NopN { cycles } => {
                if self.dr_pred && self.dr_counter != cycles {
                    self.dr_counter += 1;
                    s.stall(Stage::Dr);
                }
            }
            Op::WaitMem => {
                if self.dr_pred && s.decoupled_active {
                    s.stall(Stage::Dr);
                }
            }
            Op::Mts { rs1, .. } => {
                self.dr_rs1 = s.gpr.read_op(rs1);
            }
            Op::Mfs { ss, .. } => {
                // The predicate aggregate is virtual; gather it here.
                self.dr_ss = if ss == spr::SZ {
                    s.prr.gather()
                } else {
                    s.spr.read(ss)
                };
            }
            Op::Load { ra, .. } => {
                self.dr_rs1 = s.gpr.read_op(ra);
            }
            Op::DecoupledLoad { ra, .. } => {
                self.dr_rs1 = s.gpr.read_op(ra);
                // A second decoupled load waits for the first to retire.
                if self.dr_pred && s.decoupled_active {
                    s.stall(Stage::Dr);
                }
            }
            Op::Store { ra, rs, .. } => {
                self.dr_rs1 = s.gpr.read_op(ra);
                self.dr_rs2 = s.gpr.read_op(rs);
            }
            Op::StackCtl { .. } => {
                self.dr_ss = s.spr.read(spr::ST);
            }
            Op::Call { .. } | Op::Branch { .. } => {
                self.ex_discard = false;
            }
            Op::CallReg { rs } | Op::BranchReg { rs } => {
                self.dr_rs1 = s.gpr.read_op(rs);
                self.ex_discard = false;
            }
            Op::Ret { rb, ro } => {
                // Returns read their operands without later forwarding.
                self.dr_base = s.gpr.read(rb);
                self.dr_offset = s.gpr.read(ro);
                self.ex_discard = false;
            }
            Op::Bne { rs1, rs2, .. } => {
                self.dr_pred = true;
                self.dr_rs1 = s.gpr.read_op(rs1);
                self.dr_rs2 = s.gpr.read_op(rs2);
                self.ex_discard = false;
            }
        }
        Ok(())
    }

    /// EX-stage behavior: compute results and addresses, resolve
    /// forwarding, dispatch control flow.
    pub fn ex(&mut self, s: &mut Simulator, slot: usize) -> SimResult<()> {
        match self.op {
            Op::Bubble | Op::NopN { .. } | Op::WaitMem => {}
            Op::AluImm { op, imm, .. } => {
                self.ex_result = alu::compute(op, read_gpr_ex(s, slot, self.dr_rs1), imm);
            }
            Op::AluLong { op, imm, .. } => {
                self.ex_result = alu::compute(op, read_gpr_ex(s, slot, self.dr_rs1), imm);
            }
            Op::AluReg { op, .. } => {
                self.ex_result = alu::compute(
                    op,
                    read_gpr_ex(s, slot, self.dr_rs1),
                    read_gpr_ex(s, slot, self.dr_rs2),
                );
            }
            Op::AluUnary { op, .. } => {
                self.ex_result = alu::compute_unary(op, read_gpr_ex(s, slot, self.dr_rs1));
            }
            Op::AluMul { unsigned, .. } => {
                let (lo, hi) = alu::compute_mul(
                    unsigned,
                    read_gpr_ex(s, slot, self.dr_rs1),
                    read_gpr_ex(s, slot, self.dr_rs2),
                );
                self.ex_mull = lo;
                self.ex_mulh = hi;
            }
            Op::Compare { op, pd, .. } => {
                if self.dr_pred {
                    let result = alu::compute_compare(
                        op,
                        read_gpr_ex(s, slot, self.dr_rs1),
                        read_gpr_ex(s, slot, self.dr_rs2),
                    );
                    s.prr.write(pd, result);
                }
            }
            Op::PredAlu { op, pd, .. } => {
                if self.dr_pred {
                    s.prr.write(pd, alu::compute_pred(op, self.dr_ps1, self.dr_ps2));
                }
            }
            Op::Mts { sd, .. } => {
                if self.dr_pred {
                    let value = read_gpr_ex(s, slot, self.dr_rs1);
                    // Writing the predicate aggregate scatters to p1..p7.
                    if sd == spr::SZ {
                        s.prr.scatter(value);
                    } else {
                        s.spr.write(sd, value);
                    }
                }
            }
            Op::Mfs { .. } => {
                self.ex_result = self.dr_ss;
            }
            Op::Load { size, imm, .. } => {
                self.ex_address = read_gpr_ex(s, slot, self.dr_rs1)
                    .wrapping_add((imm * size.bytes() as i32) as u32);
            }
            Op::DecoupledLoad { size, imm, .. } => {
                self.ex_address = read_gpr_ex(s, slot, self.dr_rs1)
                    .wrapping_add((imm * size.bytes() as i32) as u32);
                if self.dr_pred {
                    debug_assert!(!s.decoupled_active);
                    s.decoupled_load = *self;
                    s.decoupled_active = true;
                }
            }
            Op::Store { size, imm, .. } => {
                self.ex_address = read_gpr_ex(s, slot, self.dr_rs1)
                    .wrapping_add((imm * size.bytes() as i32) as u32);
                self.ex_value = read_gpr_ex(s, slot, self.dr_rs2);
            }
            Op::StackCtl { .. } => {}
            Op::Call { imm } => {
                let target = imm * 4;
                self.ex_address = target;
                self.store_return_address(s, self.dr_pred, s.base, s.npc);
                self.fetch_and_dispatch(s, self.dr_pred, target, target)?;
            }
            Op::Branch { imm } => {
                let target = self.if_pc.wrapping_add((imm * 4) as u32);
                self.ex_address = target;
                self.dispatch(s, self.dr_pred, s.base, target);
            }
            Op::CallReg { .. } => {
                let target = read_gpr_ex(s, slot, self.dr_rs1);
                self.ex_address = target;
                self.store_return_address(s, self.dr_pred, s.base, s.npc);
                self.fetch_and_dispatch(s, self.dr_pred, target, target)?;
            }
            Op::BranchReg { .. } => {
                let target = self.if_pc.wrapping_add(read_gpr_ex(s, slot, self.dr_rs1));
                self.ex_address = target;
                self.dispatch(s, self.dr_pred, s.base, target);
            }
            Op::Ret { .. } => {
                if self.dr_pred && self.dr_base == 0 {
                    // Returning to address 0 halts: drain the pipeline
                    // behind this instruction until MW commit raises it.
                    s.stall(Stage::Dr);
                } else {
                    let target = self.dr_base.wrapping_add(self.dr_offset);
                    self.ex_address = target;
                    self.fetch_and_dispatch(s, self.dr_pred, self.dr_base, target)?;
                }
            }
            Op::Bne { imm, .. } => {
                let taken = read_gpr_ex(s, slot, self.dr_rs1) != read_gpr_ex(s, slot, self.dr_rs2);
                let target = s.pc.wrapping_add((imm * 4) as u32);
                self.ex_address = target;
                self.dispatch(s, taken, s.base, target);
            }
        }
        Ok(())
    }

    /// EX-commit behavior: publish the result to the EX forwarding cell.
    pub fn ex_commit(&mut self, _s: &mut Simulator, _slot: usize) -> SimResult<()> {
        if !self.dr_pred {
            return Ok(());
        }
        match self.op {
            Op::AluImm { rd, .. }
            | Op::AluLong { rd, .. }
            | Op::AluReg { rd, .. }
            | Op::AluUnary { rd, .. }
            | Op::Mfs { rd, .. } => {
                self.gpr_ex.set(rd, self.ex_result);
            }
            _ => {}
        }
        Ok(())
    }

    /// MW-stage behavior: memory accesses and register writeback.
    pub fn mw(&mut self, s: &mut Simulator, _slot: usize) -> SimResult<()> {
        match self.op {
            Op::AluImm { .. }
            | Op::AluLong { .. }
            | Op::AluReg { .. }
            | Op::AluUnary { .. }
            | Op::Mfs { .. } => {
                if self.dr_pred {
                    let (rd, value) = self.gpr_ex.pair();
                    s.gpr.write(rd, value);
                    self.gpr_mw.set(rd, value);
                    self.gpr_ex.reset();
                }
            }
            Op::AluMul { .. } => {
                if self.dr_pred {
                    s.spr.write(spr::SL, self.ex_mull);
                    s.spr.write(spr::SH, self.ex_mulh);
                }
            }
            Op::Load { area, size, signed, rd, .. } => {
                if self.dr_pred {
                    match load_from(s, area, size, signed, self.ex_address)? {
                        Some(value) => {
                            s.gpr.write(rd, value);
                            self.gpr_mw.set(rd, value);
                        }
                        None => s.stall(Stage::Mw),
                    }
                }
            }
            Op::Store { area, size, .. } => {
                if self.dr_pred && !store_to(s, area, size, self.ex_address, self.ex_value)? {
                    s.stall(Stage::Mw);
                }
            }
            Op::StackCtl { op, imm } => {
                // The stack-top update below is applied whether or not the
                // instruction's predicate held.
                let mut stack_top = self.dr_ss;
                let size = imm * s.stack_block_bytes;
                if self.dr_pred {
                    let done = match op {
                        StackOp::Reserve => {
                            s.scache.reserve(s.memory.as_mut(), size, &mut stack_top)?
                        }
                        StackOp::Ensure => {
                            s.scache.ensure(s.memory.as_mut(), size, &mut stack_top)?
                        }
                        StackOp::Free => s.scache.free(s.memory.as_mut(), size, &mut stack_top)?,
                    };
                    if !done {
                        s.stall(Stage::Mw);
                    }
                }
                s.spr.write(spr::ST, stack_top);
            }
            _ => {}
        }
        Ok(())
    }

    /// MW-commit behavior: withdraw the MW forwarding cell, raise halts.
    pub fn mw_commit(&mut self, s: &mut Simulator, _slot: usize) -> SimResult<()> {
        match self.op {
            Op::AluImm { .. }
            | Op::AluLong { .. }
            | Op::AluReg { .. }
            | Op::AluUnary { .. }
            | Op::Mfs { .. }
            | Op::Load { .. } => {
                if self.dr_pred {
                    self.gpr_mw.reset();
                }
            }
            Op::Ret { .. } => {
                if self.dr_pred && self.dr_base == 0 {
                    return Err(SimError::Halt(s.gpr.read(abi::REG_EXIT)));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Decoupled-load side channel: retries the load once per cycle and
    /// lands the result in the decoupled-result special register.
    ///
    /// Returns true when the load has retired.
    pub fn dmw(&mut self, s: &mut Simulator) -> SimResult<bool> {
        let Op::DecoupledLoad { area, size, signed, .. } = self.op else {
            debug_assert!(false, "only decoupled loads enter the side channel");
            return Ok(true);
        };
        match load_from(s, area, size, signed, self.ex_address)? {
            Some(value) => {
                s.spr.write(spr::SM, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes the return base and offset into the linkage registers.
    fn store_return_address(&mut self, s: &mut Simulator, pred: bool, base: u32, pc: u32) {
        if pred && !self.ex_discard {
            debug_assert!(base <= pc);
            s.gpr.write(abi::REG_RFB, base);
            s.gpr.write(abi::REG_RFO, pc - base);
        }
    }

    /// Dispatches to a method that may not be resident: ensures it is in
    /// the method cache, stalling EX until the transfer completes, then
    /// redirects the fetch stage.
    fn fetch_and_dispatch(
        &mut self,
        s: &mut Simulator,
        pred: bool,
        base: u32,
        address: u32,
    ) -> SimResult<()> {
        if pred && !self.ex_discard {
            if !s.mcache.is_available(s.memory.as_mut(), base)? {
                s.stall(Stage::Ex);
            } else {
                s.base = base;
                s.pc = address;
                s.npc = address;
                self.ex_discard = true;
            }
        }
        Ok(())
    }

    /// Dispatches within a method already guaranteed to be resident.
    fn dispatch(&mut self, s: &mut Simulator, pred: bool, base: u32, address: u32) {
        if pred && !self.ex_discard {
            debug_assert!(s.mcache.assert_availability(base));
            s.base = base;
            s.pc = address;
            s.npc = address;
            self.ex_discard = true;
        }
    }
}

/// Loads a value through one of the four memory areas.
///
/// Returns `None` while the access is still being serviced. Stack
/// accesses address the logical stack from its top.
fn load_from(
    s: &mut Simulator,
    area: MemArea,
    size: MemSize,
    signed: bool,
    address: u32,
) -> SimResult<Option<u32>> {
    check_aligned(address, size.bytes())?;

    let mut buf = [0u8; 4];
    let data = &mut buf[..size.bytes() as usize];
    let done = match area {
        MemArea::Stack => s.scache.read(address, data)?,
        MemArea::Local => s.local.read(address, data)?,
        MemArea::Data => s.dcache.read(s.memory.as_mut(), address, data)?,
        MemArea::Main => s.memory.read(address, data)?,
    };
    if !done {
        return Ok(None);
    }
    Ok(Some(size.extend(size.from_be(data), signed)))
}

/// Stores a value through one of the four memory areas.
///
/// Returns false while the access is still being serviced.
fn store_to(
    s: &mut Simulator,
    area: MemArea,
    size: MemSize,
    address: u32,
    value: u32,
) -> SimResult<bool> {
    check_aligned(address, size.bytes())?;

    let mut buf = [0u8; 4];
    size.to_be(value, &mut buf);
    let data = &buf[..size.bytes() as usize];
    match area {
        MemArea::Stack => s.scache.write(address, data),
        MemArea::Local => s.local.write(address, data),
        MemArea::Data => s.dcache.write(s.memory.as_mut(), address, data),
        MemArea::Main => s.memory.write(address, data),
    }
}
