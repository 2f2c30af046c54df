//! Instruction execution.
//!
//! Every decoded [`Instruction`] runs in three steps driven by the control
//! unit: [`Instruction::fetch_operand`], [`Instruction::execute`] and
//! [`Instruction::store_result`]. The steps share machine state through an
//! [`ExecutionContext`] and hand values to each other through a per-cycle
//! [`Latch`]. A step that raises a [`MachineFault`] aborts the cycle; the
//! control unit then runs the fault-dispatch protocol.

use log::debug;
use serde::{Serialize, Deserialize};
use crate::cpu::alu::{Alu, AluOp};
use crate::cpu::decode::{Instruction, MemOperand};
use crate::cpu::devices::DeviceBuffers;
use crate::cpu::fault::MachineFault;
use crate::cpu::fpu::Fpu;
use crate::cpu::memory::{Memory, FAULT_RETURN_SLOT, TRAP_RETURN_SLOT, TRAP_TABLE_POINTER};
use crate::cpu::registers::{Registers, LINK_REGISTER};
use crate::cpu::status::{ConditionCode, MachineFaultRegister, MachineStatus};
use crate::word::{Address, Word};

/// Entries in the trap table.
pub const TRAP_TABLE_SIZE: u16 = 16;

/// What the control unit should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    /// Proceed to the next phase.
    Continue,
    /// Stop the run loop (HLT).
    Halt,
    /// The device buffer is empty; suspend until the host pushes input.
    Wait(u8),
}

/// Outcome of a single step.
pub type StepResult = Result<Flow, MachineFault>;

/// Values carried between the steps of one instruction cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latch {
    /// Effective address.
    pub ea: Word,
    /// Pointer slot read when the indirect bit is set.
    pub pointer: Option<Word>,
    pub operand: Word,
    /// Second operand (vector base, conversion mode).
    pub operand2: Word,
    pub result: Word,
    /// Second result word (rx+1 for MLT/DVD).
    pub result2: Word,
    pub branch: bool,
    /// Suppress the write-back.
    pub skip: bool,
    /// Pending vector write-back as (address, value).
    pub vector: Vec<(Word, Word)>,
}

/// All machine state an instruction can reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub registers: Registers,
    pub memory: Memory,
    pub cc: ConditionCode,
    pub status: MachineStatus,
    pub mfr: MachineFaultRegister,
    pub devices: DeviceBuffers,
    pub alu: Alu,
    pub fpu: Fpu,
}

impl ExecutionContext {
    pub fn new(word_count: usize) -> Self {
        Self {
            registers: Registers::new(),
            memory: Memory::new(word_count),
            cc: ConditionCode::new(),
            status: MachineStatus::new(),
            mfr: MachineFaultRegister::new(),
            devices: DeviceBuffers::new(),
            alu: Alu::new(),
            fpu: Fpu::new(),
        }
    }

    /// Clear every register, memory and buffer. Run-mode flags survive.
    pub fn reset(&mut self) {
        let interactive = self.status.interactive();
        let debugging = self.status.debugging();

        self.registers.reset();
        self.memory.clear();
        self.cc.clear();
        self.status = MachineStatus::new();
        self.status.set_interactive(interactive);
        self.status.set_debugging(debugging);
        self.mfr.clear();
        self.devices.clear();
        self.alu = Alu::new();
        self.fpu = Fpu::new();
    }

    /// Read memory through MAR/MBR with the current privilege.
    pub fn load(&mut self, address: Word) -> Result<Word, MachineFault> {
        self.registers.mar.set(address);
        let word = self.memory.fetch(self.registers.mar, self.status.supervisor())?;
        self.registers.mbr = word;
        Ok(word)
    }

    /// Write memory through MAR/MBR with the current privilege.
    pub fn store(&mut self, address: Word, value: Word) -> Result<(), MachineFault> {
        self.registers.mar.set(address);
        self.registers.mbr = value;
        self.memory.store(self.registers.mar, value, self.status.supervisor())
    }

    /// `EA = X[ix] + address`, dereferenced once when indirect.
    fn resolve(&mut self, m: &MemOperand, indexed: bool, latch: &mut Latch) -> Result<(), MachineFault> {
        let base = if indexed {
            self.registers.indexed_address(m.ix as usize, m.address as Word)
        } else {
            m.address as Word
        };
        self.registers.iar = base;

        if m.indirect {
            latch.pointer = Some(base);
            latch.ea = self.load(base)?;
            self.registers.iar = latch.ea;
        } else {
            latch.pointer = None;
            latch.ea = base;
        }
        Ok(())
    }

    /// Supervisor return through a save slot.
    fn return_from_supervisor(&mut self, pointer: Option<Word>) {
        match pointer {
            Some(slot) if slot == TRAP_RETURN_SLOT.get() => {
                if !self.status.executing_fault_handler() {
                    debug!("return from trap to {}", self.registers.pc);
                    self.status.set_supervisor(false);
                }
            }
            Some(slot) if slot == FAULT_RETURN_SLOT.get() => {
                debug!("return from fault handler to {}", self.registers.pc);
                self.status.set_executing_fault_handler(false);
                self.mfr.clear();
                if self.status.supervisor_fault() {
                    self.status.set_supervisor_fault(false);
                } else {
                    self.status.set_supervisor(false);
                }
            }
            _ => {}
        }
    }
}

fn shift_op(left: bool, logical: bool) -> AluOp {
    match (left, logical) {
        (true, true) => AluOp::ShiftLeftLogical,
        (true, false) => AluOp::ShiftLeftArithmetic,
        (false, true) => AluOp::ShiftRightLogical,
        (false, false) => AluOp::ShiftRightArithmetic,
    }
}

fn rotate_op(left: bool, logical: bool) -> AluOp {
    match (left, logical) {
        (true, true) => AluOp::RotateLeftLogical,
        (true, false) => AluOp::RotateLeftArithmetic,
        (false, true) => AluOp::RotateRightLogical,
        (false, false) => AluOp::RotateRightArithmetic,
    }
}

impl Instruction {
    /// Operand Fetch: effective address, indirection and operand reads.
    pub fn fetch_operand(&self, ctx: &mut ExecutionContext, latch: &mut Latch) -> StepResult {
        if let Some(m) = self.mem_operand() {
            // LDX/STX name their target in the IX field, so never index.
            let indexed = !matches!(self, Instruction::Ldx(_) | Instruction::Stx(_));
            ctx.resolve(m, indexed, latch)?;
        }

        match *self {
            Instruction::Ldr(_)
            | Instruction::Amr(_)
            | Instruction::Smr(_)
            | Instruction::Ldx(_)
            | Instruction::Ldfr(_)
            | Instruction::Fadd(_)
            | Instruction::Fsub(_) => {
                latch.operand = ctx.load(latch.ea)?;
            }
            Instruction::Cnvrt(m) => {
                latch.operand = ctx.load(latch.ea)?;
                latch.operand2 = ctx.registers.gpr(m.r as usize);
            }
            Instruction::Vadd(_) | Instruction::Vsub(_) => {
                latch.operand = ctx.load(latch.ea)?;
                latch.operand2 = ctx.load(latch.ea.wrapping_add(1))?;
            }
            Instruction::Air { immediate, .. } | Instruction::Sir { immediate, .. } => {
                latch.operand = immediate as Word;
            }
            Instruction::Src(s) | Instruction::Rrc(s) => {
                latch.operand = ctx.registers.gpr(s.r as usize);
            }
            _ => {}
        }

        Ok(Flow::Continue)
    }

    /// Execute: the compute step.
    pub fn execute(&self, ctx: &mut ExecutionContext, latch: &mut Latch) -> StepResult {
        let gpr = |ctx: &ExecutionContext, r: u8| ctx.registers.gpr(r as usize);

        match *self {
            Instruction::Hlt => return Ok(Flow::Halt),

            // ==================== Load/Store ====================

            Instruction::Ldr(_) | Instruction::Ldx(_) | Instruction::Ldfr(_) => {
                latch.result = latch.operand;
            }
            Instruction::Lda(_) => latch.result = latch.ea,
            Instruction::Str(m) => latch.result = gpr(ctx, m.r),
            Instruction::Stx(m) => latch.result = ctx.registers.ixr(m.ix as usize),
            Instruction::Stfr(m) => latch.result = ctx.registers.fr(m.r as usize),

            // ==================== Arithmetic ====================

            Instruction::Amr(m) => {
                ctx.alu.compute(AluOp::Add, gpr(ctx, m.r), latch.operand, &mut ctx.cc);
                latch.result = ctx.alu.result();
            }
            Instruction::Smr(m) => {
                ctx.alu.compute(AluOp::Subtract, gpr(ctx, m.r), latch.operand, &mut ctx.cc);
                latch.result = ctx.alu.result();
            }
            Instruction::Air { r, immediate } | Instruction::Sir { r, immediate } => {
                if immediate == 0 {
                    latch.skip = true;
                } else {
                    let op = if matches!(self, Instruction::Air { .. }) { AluOp::Add } else { AluOp::Subtract };
                    ctx.alu.compute(op, gpr(ctx, r), latch.operand, &mut ctx.cc);
                    latch.result = ctx.alu.result();
                }
            }
            Instruction::Mlt(rr) => {
                ctx.alu.compute(AluOp::Multiply, gpr(ctx, rr.rx), gpr(ctx, rr.ry), &mut ctx.cc);
                latch.result = ctx.alu.result_high();
                latch.result2 = ctx.alu.result();
            }
            Instruction::Dvd(rr) => {
                ctx.alu.compute(AluOp::Divide, gpr(ctx, rr.rx), gpr(ctx, rr.ry), &mut ctx.cc);
                if ctx.cc.divide_by_zero() {
                    latch.skip = true;
                } else {
                    latch.result = ctx.alu.result();
                    latch.result2 = ctx.alu.remainder();
                }
            }
            Instruction::Trr(rr) => {
                ctx.alu.compute(AluOp::Compare, gpr(ctx, rr.rx), gpr(ctx, rr.ry), &mut ctx.cc);
            }
            Instruction::And(rr) => {
                ctx.alu.compute(AluOp::And, gpr(ctx, rr.rx), gpr(ctx, rr.ry), &mut ctx.cc);
                latch.result = ctx.alu.result();
            }
            Instruction::Orr(rr) => {
                ctx.alu.compute(AluOp::Or, gpr(ctx, rr.rx), gpr(ctx, rr.ry), &mut ctx.cc);
                latch.result = ctx.alu.result();
            }
            Instruction::Not { rx } => {
                ctx.alu.compute(AluOp::Not, gpr(ctx, rx), 0, &mut ctx.cc);
                latch.result = ctx.alu.result();
            }
            Instruction::Src(s) => {
                ctx.alu.compute(shift_op(s.left, s.logical), latch.operand, s.count as Word, &mut ctx.cc);
                latch.result = ctx.alu.result();
            }
            Instruction::Rrc(s) => {
                ctx.alu.compute(rotate_op(s.left, s.logical), latch.operand, s.count as Word, &mut ctx.cc);
                latch.result = ctx.alu.result();
            }

            // ==================== Transfer ====================

            Instruction::Jz(m) => latch.branch = gpr(ctx, m.r) == 0,
            Instruction::Jne(m) => latch.branch = gpr(ctx, m.r) != 0,
            Instruction::Jcc(m) => latch.branch = ctx.cc.select(m.r),
            Instruction::Jma(_) | Instruction::Jsr(_) => latch.branch = true,
            Instruction::Rfs { immediate } => latch.result = immediate as Word,
            Instruction::Sob(m) => {
                ctx.alu.compute(AluOp::DecrementAndCompare, gpr(ctx, m.r), 1, &mut ctx.cc);
                latch.result = ctx.alu.result();
                latch.branch = (latch.result as i16) > 0;
            }
            Instruction::Jge(m) => latch.branch = (gpr(ctx, m.r) as i16) >= 0,
            Instruction::Trap { code } => {
                if code >= TRAP_TABLE_SIZE {
                    return Err(MachineFault::IllegalTrapCode);
                }
                // Nothing changes until both table reads succeed.
                let table = ctx.memory.fetch_privileged(TRAP_TABLE_POINTER)?;
                let target = ctx.memory.fetch_privileged(Address::new(table.wrapping_add(code)))?;
                ctx.memory.store_privileged(TRAP_RETURN_SLOT, ctx.registers.pc.get())?;
                ctx.status.set_supervisor(true);
                latch.ea = target;
                latch.branch = true;
                debug!("trap {} to {:04}", code, latch.ea);
            }

            // ==================== Floating point / vector ====================

            Instruction::Fadd(m) => {
                latch.result = ctx.fpu.add(ctx.registers.fr(m.r as usize), latch.operand, &mut ctx.cc);
            }
            Instruction::Fsub(m) => {
                latch.result = ctx.fpu.subtract(ctx.registers.fr(m.r as usize), latch.operand, &mut ctx.cc);
            }
            Instruction::Vadd(m) | Instruction::Vsub(m) => {
                let op = if matches!(self, Instruction::Vadd(_)) { AluOp::Add } else { AluOp::Subtract };
                let mut scratch = ConditionCode::new();
                let length = ctx.fpu.to_fixed(ctx.registers.fr(m.r as usize), &mut scratch) as i16;

                let (v1, v2) = (latch.operand, latch.operand2);
                let (mut overflow, mut underflow) = (false, false);
                latch.vector.clear();
                for i in 0..length.max(0) as Word {
                    let a = ctx.load(v1.wrapping_add(i))?;
                    let b = ctx.load(v2.wrapping_add(i))?;
                    ctx.alu.compute(op, a, b, &mut ctx.cc);
                    overflow |= ctx.cc.overflow();
                    underflow |= ctx.cc.underflow();
                    latch.vector.push((v1.wrapping_add(i), ctx.alu.result()));
                }

                ctx.cc.clear();
                ctx.cc.set_overflow(overflow);
                ctx.cc.set_underflow(underflow);
            }
            Instruction::Cnvrt(_) => match latch.operand2 {
                0 => latch.result = ctx.fpu.to_fixed(latch.operand, &mut ctx.cc),
                1 => latch.result = ctx.fpu.to_float(latch.operand, &mut ctx.cc),
                _ => latch.skip = true,
            },

            // ==================== I/O ====================

            Instruction::In(io) => match ctx.devices.pop(io.device) {
                Some(word) => latch.result = word,
                None => return Ok(Flow::Wait(io.device)),
            },
            Instruction::Out(io) => latch.result = gpr(ctx, io.r),
            Instruction::Chk(io) => {
                latch.result = ctx.devices.size(io.device).min(Word::MAX as usize) as Word;
            }
        }

        Ok(Flow::Continue)
    }

    /// Result Store: write-back to registers or memory.
    pub fn store_result(&self, ctx: &mut ExecutionContext, latch: &mut Latch) -> StepResult {
        if latch.skip {
            return Ok(Flow::Continue);
        }

        let regs = &mut ctx.registers;
        match *self {
            Instruction::Hlt | Instruction::Trr(_) => {}

            Instruction::Ldr(m) | Instruction::Lda(m) | Instruction::Amr(m) | Instruction::Smr(m) => {
                regs.set_gpr(m.r as usize, latch.result);
            }
            Instruction::Air { r, .. } | Instruction::Sir { r, .. } => regs.set_gpr(r as usize, latch.result),
            Instruction::Str(_) | Instruction::Stx(_) | Instruction::Stfr(_) => {
                ctx.store(latch.ea, latch.result)?;
            }
            Instruction::Ldx(m) => regs.set_ixr(m.ix as usize, latch.result),

            Instruction::Mlt(rr) | Instruction::Dvd(rr) => {
                regs.set_gpr(rr.rx as usize, latch.result);
                regs.set_gpr(rr.rx as usize + 1, latch.result2);
            }
            Instruction::And(rr) | Instruction::Orr(rr) => regs.set_gpr(rr.rx as usize, latch.result),
            Instruction::Not { rx } => regs.set_gpr(rx as usize, latch.result),
            Instruction::Src(s) | Instruction::Rrc(s) => regs.set_gpr(s.r as usize, latch.result),

            Instruction::Jz(_) | Instruction::Jne(_) | Instruction::Jcc(_) | Instruction::Jge(_)
            | Instruction::Trap { .. } => {
                if latch.branch {
                    regs.jump(latch.ea);
                }
            }
            Instruction::Jma(_) => {
                regs.jump(latch.ea);
                if ctx.status.supervisor() {
                    ctx.return_from_supervisor(latch.pointer);
                }
            }
            Instruction::Jsr(_) => {
                let link = regs.pc.get();
                regs.set_gpr(LINK_REGISTER, link);
                regs.jump(latch.ea);
            }
            Instruction::Rfs { .. } => {
                regs.set_gpr(0, latch.result);
                let link = regs.gpr(LINK_REGISTER);
                regs.jump(link);
            }
            Instruction::Sob(m) => {
                regs.set_gpr(m.r as usize, latch.result);
                if latch.branch {
                    regs.jump(latch.ea);
                }
            }

            Instruction::Fadd(m) | Instruction::Fsub(m) | Instruction::Ldfr(m) => {
                regs.set_fr(m.r as usize, latch.result);
            }
            Instruction::Vadd(_) | Instruction::Vsub(_) => {
                for (address, value) in std::mem::take(&mut latch.vector) {
                    ctx.store(address, value)?;
                }
            }
            Instruction::Cnvrt(m) => {
                if latch.operand2 == 0 {
                    regs.set_gpr(m.r as usize, latch.result);
                } else {
                    regs.set_fr(0, latch.result);
                }
            }

            Instruction::In(io) | Instruction::Chk(io) => regs.set_gpr(io.r as usize, latch.result),
            Instruction::Out(io) => ctx.devices.push(io.device, latch.result),
        }

        Ok(Flow::Continue)
    }
}
