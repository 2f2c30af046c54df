//! Control unit.
//!
//! Drives the five-phase instruction cycle:
//!
//! 1. Instruction Fetch: `MAR <- PC`, `IR <- Memory(MAR)`, `PC <- PC + 1`
//! 2. Instruction Decode: select the instruction from the opcode
//! 3. Operand Fetch: effective address and operand reads
//! 4. Execute: ALU/FPU work
//! 5. Result Store: write-back
//!
//! [`Machine::single_step`] advances exactly one phase. Every other run
//! entry point is built on it. Any phase may raise a [`MachineFault`]; the
//! control unit then saves PC and R0 in low memory, puts the fault code in
//! R0 and restarts the cycle at the fault handler vector.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use log::{debug, error, info, trace, warn};
use serde::{Serialize, Deserialize};
use crate::config::MachineConfig;
use crate::cpu::decode::{decode, DecodeError, Instruction};
use crate::cpu::devices::CARD_READER;
use crate::cpu::execute::{ExecutionContext, Flow, Latch, StepResult};
use crate::cpu::fault::{MachineError, MachineFault};
use crate::cpu::memory::{FAULT_R0_SLOT, FAULT_RETURN_SLOT, FAULT_VECTOR};
use crate::word::{to_binary_string, Word};

/// Words of memory around MAR logged with each debug register dump.
const DUMP_WINDOW: usize = 8;

/// Phase of the instruction cycle. Discriminants are the phase numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    InstructionFetch = 1,
    InstructionDecode = 2,
    OperandFetch = 3,
    Execute = 4,
    ResultStore = 5,
}

impl Phase {
    /// The phase after this one, wrapping to fetch.
    pub fn next(self) -> Self {
        match self {
            Phase::InstructionFetch => Phase::InstructionDecode,
            Phase::InstructionDecode => Phase::OperandFetch,
            Phase::OperandFetch => Phase::Execute,
            Phase::Execute => Phase::ResultStore,
            Phase::ResultStore => Phase::InstructionFetch,
        }
    }

    pub const fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::InstructionFetch => "fetch",
            Phase::InstructionDecode => "decode",
            Phase::OperandFetch => "operand",
            Phase::Execute => "execute",
            Phase::ResultStore => "store",
        }
    }
}

/// The instruction in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    Empty,
    Ready(Instruction),
    /// Decoded with an illegal operand field; the remaining phases do nothing.
    Faulted,
}

/// Result of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halted,
    /// `IN` found an empty buffer on this device.
    Waiting(u8),
    /// PC left memory at instruction fetch.
    Stopped,
    /// A fault was dispatched to the handler.
    Fault(MachineFault),
    /// Fault during fault handling (interactive mode only).
    Fatal(MachineError),
}

/// Why a run loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Halted,
    Waiting(u8),
    Stopped,
    Paused,
    /// The phase budget of [`Machine::run_phases`] ran out.
    PhaseLimit,
    Fatal(MachineError),
}

/// Cross-thread pause request, observed between phases.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    flag: Arc<AtomicBool>,
}

impl PauseHandle {
    /// Ask the run loop to stop before its next phase.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// The simulated machine.
#[derive(Debug)]
pub struct Machine {
    /// Registers, memory, status and devices.
    pub ctx: ExecutionContext,
    config: MachineConfig,
    phase: Phase,
    slot: Slot,
    latch: Latch,
    pause: PauseHandle,
    /// Completed instruction cycles.
    cycles: u64,
}

impl Machine {
    /// Build a machine from a validated configuration.
    pub fn new(config: MachineConfig) -> Result<Self, MachineError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MachineConfig) -> Self {
        let mut ctx = ExecutionContext::new(config.word_count);
        ctx.status.set_interactive(config.interactive);
        ctx.status.set_debugging(config.debugging);
        Self {
            ctx,
            config,
            phase: Phase::InstructionFetch,
            slot: Slot::Empty,
            latch: Latch::default(),
            pause: PauseHandle::default(),
            cycles: 0,
        }
    }

    /// Clear all state. The configuration and pause handle survive.
    pub fn reset(&mut self) {
        self.ctx.reset();
        self.phase = Phase::InstructionFetch;
        self.slot = Slot::Empty;
        self.latch = Latch::default();
        self.cycles = 0;
        info!("machine reset");
    }

    /// Privileged bulk load at `origin`; PC is pointed at the first word.
    pub fn load_program(&mut self, program: &[Word], origin: usize) -> Result<(), MachineError> {
        self.ctx.memory.load_program(origin, program)?;
        self.ctx.registers.jump(origin as Word);
        self.phase = Phase::InstructionFetch;
        self.slot = Slot::Empty;
        info!("loaded {} words at {:04}", program.len(), origin);
        Ok(())
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The decoded instruction of the current cycle, if any.
    pub fn current_instruction(&self) -> Option<Instruction> {
        match self.slot {
            Slot::Ready(instr) => Some(instr),
            _ => None,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_running(&self) -> bool {
        self.ctx.status.running()
    }

    pub fn is_waiting(&self) -> bool {
        self.ctx.status.waiting()
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn set_interactive(&mut self, value: bool) {
        self.config.interactive = value;
        self.ctx.status.set_interactive(value);
    }

    pub fn set_debugging(&mut self, value: bool) {
        self.config.debugging = value;
        self.ctx.status.set_debugging(value);
    }

    /// Queue a word on a device and clear the matching wait flag.
    pub fn push_input(&mut self, device: u8, word: Word) {
        self.ctx.devices.push(device, word);
        if device == CARD_READER {
            self.ctx.status.set_waiting_for_card(false);
        } else {
            self.ctx.status.set_ready_for_input(false);
        }
    }

    /// Take everything the program wrote to `device`.
    pub fn take_output(&mut self, device: u8) -> Vec<Word> {
        self.ctx.devices.drain(device)
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn instruction_fetch(&mut self) -> StepResult {
        let ctx = &mut self.ctx;
        ctx.registers.mar = ctx.registers.pc;
        let word = ctx.memory.fetch(ctx.registers.mar, ctx.status.supervisor())?;
        ctx.registers.mbr = word;
        ctx.registers.ir = word;
        ctx.registers.advance_pc();
        self.latch = Latch::default();
        Ok(Flow::Continue)
    }

    fn instruction_decode(&mut self) -> StepResult {
        let word = self.ctx.registers.ir;
        match decode(word) {
            Ok(instr) => {
                trace!("decoded {}", instr);
                self.slot = Slot::Ready(instr);
                Ok(Flow::Continue)
            }
            Err(DecodeError::IllegalOpcode(op)) => {
                debug!("illegal opcode {:#04o} in {}", op, to_binary_string(word));
                Err(MachineFault::IllegalOperationCode)
            }
            Err(e) => {
                warn!("{} at {}; instruction ignored", e, self.ctx.registers.pc.prev());
                self.slot = Slot::Faulted;
                Ok(Flow::Continue)
            }
        }
    }

    fn run_slot(
        &mut self,
        step: fn(&Instruction, &mut ExecutionContext, &mut Latch) -> StepResult,
    ) -> StepResult {
        match self.slot {
            Slot::Ready(instr) => step(&instr, &mut self.ctx, &mut self.latch),
            Slot::Empty | Slot::Faulted => Ok(Flow::Continue),
        }
    }

    /// Advance exactly one phase.
    ///
    /// In batch mode a fault raised while the fault handler is running is
    /// returned as `Err(MachineError::DoubleFault)`; in interactive mode it
    /// is reported as [`StepOutcome::Fatal`].
    pub fn single_step(&mut self) -> Result<StepOutcome, MachineError> {
        let phase = self.phase;

        if phase == Phase::InstructionFetch && self.ctx.registers.pc.index() >= self.ctx.memory.word_count() {
            warn!("PC {} outside memory; stopping", self.ctx.registers.pc);
            self.ctx.status.set_running(false);
            return Ok(StepOutcome::Stopped);
        }

        trace!("phase {} ({}) PC={}", phase.number(), phase.name(), self.ctx.registers.pc);
        let result = match phase {
            Phase::InstructionFetch => self.instruction_fetch(),
            Phase::InstructionDecode => self.instruction_decode(),
            Phase::OperandFetch => self.run_slot(Instruction::fetch_operand),
            Phase::Execute => self.run_slot(Instruction::execute),
            Phase::ResultStore => self.run_slot(Instruction::store_result),
        };

        match result {
            Ok(Flow::Continue) => {
                if phase == Phase::ResultStore {
                    self.finish_cycle();
                } else {
                    self.phase = phase.next();
                }
                Ok(StepOutcome::Continue)
            }
            Ok(Flow::Halt) => {
                info!("halted at {} after {} instructions", self.ctx.registers.pc.prev(), self.cycles + 1);
                self.ctx.status.set_running(false);
                self.finish_cycle();
                Ok(StepOutcome::Halted)
            }
            Ok(Flow::Wait(device)) => {
                // Re-execute the IN once input arrives.
                self.ctx.registers.pc = self.ctx.registers.pc.prev();
                if device == CARD_READER {
                    self.ctx.status.set_waiting_for_card(true);
                } else {
                    self.ctx.status.set_ready_for_input(true);
                }
                self.ctx.status.set_running(false);
                self.restart_cycle();
                info!("waiting for input on device {}", device);
                Ok(StepOutcome::Waiting(device))
            }
            Err(fault) => self.dispatch_fault(fault),
        }
    }

    fn finish_cycle(&mut self) {
        self.cycles += 1;
        if self.ctx.status.debugging() {
            let around = self.ctx.registers.mar.index().saturating_sub(DUMP_WINDOW / 2);
            debug!("\n{}{}", self.dump_registers(), self.dump_memory(around, DUMP_WINDOW));
        }
        self.restart_cycle();
    }

    fn restart_cycle(&mut self) {
        self.phase = Phase::InstructionFetch;
        self.slot = Slot::Empty;
        self.latch = Latch::default();
    }

    /// Fault-dispatch protocol.
    fn dispatch_fault(&mut self, fault: MachineFault) -> Result<StepOutcome, MachineError> {
        let pc = self.ctx.registers.pc;
        self.restart_cycle();

        if self.ctx.status.executing_fault_handler() {
            return self.fatal(fault);
        }

        warn!("machine fault {} (code {}) at PC={}", fault, fault.code(), pc);
        let status = &mut self.ctx.status;
        self.ctx.mfr.latch(fault);
        status.set_executing_fault_handler(true);
        if status.supervisor() {
            status.set_supervisor_fault(true);
        } else {
            status.set_supervisor(true);
        }

        let r0 = self.ctx.registers.gpr(0);
        let vector = self
            .ctx
            .memory
            .store_privileged(FAULT_RETURN_SLOT, pc.get())
            .and_then(|_| self.ctx.memory.store_privileged(FAULT_R0_SLOT, r0))
            .and_then(|_| self.ctx.memory.fetch_privileged(FAULT_VECTOR));
        let vector = match vector {
            Ok(vector) => vector,
            Err(second) => return self.fatal(second),
        };

        self.ctx.registers.set_gpr(0, fault.code() as Word);
        self.ctx.registers.jump(vector);
        Ok(StepOutcome::Fault(fault))
    }

    fn fatal(&mut self, second: MachineFault) -> Result<StepOutcome, MachineError> {
        let err = MachineError::DoubleFault {
            first: self.ctx.mfr.current(),
            second,
            pc: self.ctx.registers.pc,
        };
        error!("{}", err);
        self.ctx.status.set_running(false);
        if self.ctx.status.interactive() {
            Ok(StepOutcome::Fatal(err))
        } else {
            Err(err)
        }
    }

    // ------------------------------------------------------------------
    // Run entry points
    // ------------------------------------------------------------------

    /// Run phases until the cycle is back at fetch.
    pub fn step_instruction(&mut self) -> Result<StepOutcome, MachineError> {
        loop {
            let outcome = self.single_step()?;
            if outcome != StepOutcome::Continue || self.phase == Phase::InstructionFetch {
                return Ok(outcome);
            }
        }
    }

    /// Run until the running flag clears.
    pub fn run(&mut self) -> Result<RunOutcome, MachineError> {
        self.run_until(None)
    }

    /// Run at most `limit` phases.
    pub fn run_phases(&mut self, limit: u64) -> Result<RunOutcome, MachineError> {
        self.run_until(Some(limit))
    }

    /// Continue after input arrived for a waiting `IN`.
    pub fn resume(&mut self) -> Result<RunOutcome, MachineError> {
        self.run()
    }

    fn run_until(&mut self, limit: Option<u64>) -> Result<RunOutcome, MachineError> {
        self.ctx.status.set_running(true);
        let mut phases = 0u64;

        loop {
            if self.pause.take() {
                info!("paused at {} phase {}", self.ctx.registers.pc, self.phase.name());
                self.ctx.status.set_running(false);
                return Ok(RunOutcome::Paused);
            }
            if limit.is_some_and(|n| phases >= n) {
                self.ctx.status.set_running(false);
                return Ok(RunOutcome::PhaseLimit);
            }

            let outcome = match self.single_step() {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.ctx.status.set_running(false);
                    return Err(e);
                }
            };
            phases += 1;

            match outcome {
                StepOutcome::Continue | StepOutcome::Fault(_) => {}
                StepOutcome::Halted => return Ok(RunOutcome::Halted),
                StepOutcome::Waiting(device) => return Ok(RunOutcome::Waiting(device)),
                StepOutcome::Stopped => return Ok(RunOutcome::Stopped),
                StepOutcome::Fatal(e) => return Ok(RunOutcome::Fatal(e)),
            }
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Printable register and status dump.
    pub fn dump_registers(&self) -> String {
        let ctx = &self.ctx;
        let mut out = format!("{:?}", ctx.registers);
        let stats = ctx.memory.cache_stats();
        let _ = writeln!(
            out,
            "CC  = {}   MSR = {}   MFR = {}",
            ctx.cc.to_nibble_string(),
            ctx.status.to_nibble_string(),
            ctx.mfr.to_nibble_string()
        );
        let _ = writeln!(
            out,
            "phase {} ({})   cycles {}   cache {} hits / {} misses ({:.1}% miss)",
            self.phase.number(),
            self.phase.name(),
            self.cycles,
            stats.hits,
            stats.misses,
            stats.miss_rate() * 100.0
        );
        out
    }

    /// Printable memory listing of `count` words from `start`.
    pub fn dump_memory(&self, start: usize, count: usize) -> String {
        let mut out = String::new();
        for (address, word) in self.ctx.memory.dump(start, count) {
            let _ = writeln!(out, "{:04}: {}", address, to_binary_string(word));
        }
        out
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::build(MachineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, IoOperand, MemOperand};
    use crate::cpu::devices::KEYBOARD;

    fn machine_with(program: &[Instruction]) -> Machine {
        let mut m = Machine::default();
        let words: Vec<Word> = program.iter().map(encode).collect();
        m.load_program(&words, 6).unwrap();
        m
    }

    #[test]
    fn test_phases_cycle_in_order() {
        let mut m = machine_with(&[Instruction::Air { r: 0, immediate: 1 }, Instruction::Hlt]);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(m.phase().number());
            assert_eq!(m.single_step().unwrap(), StepOutcome::Continue);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(m.phase(), Phase::InstructionFetch);
        assert_eq!(m.ctx.registers.gpr(0), 1);
        assert_eq!(m.cycles(), 1);
    }

    #[test]
    fn test_illegal_opcode_dispatch() {
        let mut m = Machine::default();
        m.ctx.memory.write(1, 500);
        m.ctx.registers.set_gpr(0, 42);
        m.load_program(&[0o77 << 10], 6).unwrap();

        assert_eq!(m.step_instruction().unwrap(), StepOutcome::Fault(MachineFault::IllegalOperationCode));
        assert_eq!(m.ctx.registers.gpr(0), 2);
        assert_eq!(m.ctx.registers.pc.get(), 500);
        assert_eq!(m.phase(), Phase::InstructionFetch);
        assert_eq!(m.ctx.memory.read(4), 7);
        assert_eq!(m.ctx.memory.read(5), 42);
        assert!(m.ctx.status.supervisor());
        assert!(m.ctx.status.executing_fault_handler());
        assert!(m.ctx.mfr.is_set(MachineFault::IllegalOperationCode));
    }

    #[test]
    fn test_fault_in_supervisor_marks_supervisor_fault() {
        let mut m = Machine::default();
        m.ctx.memory.write(1, 500);
        m.ctx.status.set_supervisor(true);
        m.load_program(&[0o77 << 10], 6).unwrap();
        m.step_instruction().unwrap();
        assert!(m.ctx.status.supervisor_fault());
    }

    #[test]
    fn test_faulted_operand_is_noop() {
        // MLT 1,2 has an illegal rx
        let mut m = Machine::default();
        m.ctx.registers.set_gpr(1, 3);
        m.load_program(&[(0o70 << 10) | (1 << 8) | (2 << 6), 0], 6).unwrap();
        assert_eq!(m.step_instruction().unwrap(), StepOutcome::Continue);
        assert_eq!(m.slot(), Slot::Empty);
        assert_eq!(m.ctx.registers.gpr(1), 3);
        assert!(!m.ctx.status.executing_fault_handler());
        assert_eq!(m.run().unwrap(), RunOutcome::Halted);
    }

    #[test]
    fn test_double_fault_batch_is_error() {
        // the handler at 500 is itself an illegal opcode
        let mut m = Machine::default();
        m.ctx.memory.write(1, 500);
        m.ctx.memory.write(500, 0o77 << 10);
        m.load_program(&[0o77 << 10], 6).unwrap();
        let err = m.run().unwrap_err();
        assert!(matches!(
            err,
            MachineError::DoubleFault { first: Some(MachineFault::IllegalOperationCode), .. }
        ));
        assert!(!m.is_running());
    }

    #[test]
    fn test_double_fault_interactive_stops() {
        let mut m = Machine::default();
        m.set_interactive(true);
        m.ctx.memory.write(1, 500);
        m.ctx.memory.write(500, 0o77 << 10);
        m.load_program(&[0o77 << 10], 6).unwrap();
        assert!(matches!(m.run().unwrap(), RunOutcome::Fatal(MachineError::DoubleFault { .. })));
    }

    #[test]
    fn test_wait_and_resume() {
        let io = IoOperand { r: 2, device: KEYBOARD };
        let mut m = machine_with(&[Instruction::In(io), Instruction::Hlt]);
        assert_eq!(m.run().unwrap(), RunOutcome::Waiting(KEYBOARD));
        assert!(m.ctx.status.ready_for_input());
        assert_eq!(m.ctx.registers.pc.get(), 6);
        assert_eq!(m.phase(), Phase::InstructionFetch);

        m.push_input(KEYBOARD, 99);
        assert!(!m.is_waiting());
        assert_eq!(m.resume().unwrap(), RunOutcome::Halted);
        assert_eq!(m.ctx.registers.gpr(2), 99);
    }

    #[test]
    fn test_card_reader_wait_flag() {
        let io = IoOperand { r: 0, device: CARD_READER };
        let mut m = machine_with(&[Instruction::In(io)]);
        m.run().unwrap();
        assert!(m.ctx.status.waiting_for_card());
        m.push_input(CARD_READER, 1);
        assert!(!m.ctx.status.waiting_for_card());
    }

    #[test]
    fn test_pause_between_phases() {
        let jump_self = Instruction::Jma(MemOperand::new(0, 0, 6, false));
        let mut m = machine_with(&[jump_self]);
        let handle = m.pause_handle();
        assert_eq!(m.run_phases(7).unwrap(), RunOutcome::PhaseLimit);
        assert_eq!(m.phase(), Phase::OperandFetch);
        handle.request();
        assert_eq!(m.run().unwrap(), RunOutcome::Paused);
        assert!(!handle.is_requested());
    }

    #[test]
    fn test_pc_outside_memory_stops() {
        let mut m = Machine::new(MachineConfig { word_count: 16, ..MachineConfig::default() }).unwrap();
        m.ctx.registers.jump(20);
        assert_eq!(m.run().unwrap(), RunOutcome::Stopped);
    }

    #[test]
    fn test_dump_registers_mentions_status() {
        let m = Machine::default();
        let dump = m.dump_registers();
        assert!(dump.contains("MFR = 0000"));
        assert!(dump.contains("phase 1 (fetch)"));
        assert!(dump.contains("(0.0% miss)"));
    }

    #[test]
    fn test_dump_memory_lists_window() {
        let mut m = machine_with(&[Instruction::Air { r: 1, immediate: 1 }, Instruction::Hlt]);
        m.ctx.memory.write(8, 5);
        m.run().unwrap();
        let dump = m.dump_memory(7, 2);
        assert_eq!(dump, "0007: 0000000000000000\n0008: 0000000000000101\n");
        assert!(m.dump_registers().contains("(50.0% miss)"));
    }
}
