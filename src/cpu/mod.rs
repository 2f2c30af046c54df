//! CPU emulation.
//!
//! Leaf to root:
//! - status, fault and register primitives
//! - ALU and FPU function units
//! - cache, memory and device buffers
//! - instruction decode and execution
//! - the control unit driving the five-phase cycle

pub mod status;
pub mod fault;
pub mod registers;
pub mod alu;
pub mod fpu;
pub mod cache;
pub mod memory;
pub mod devices;
pub mod decode;
pub mod execute;
pub mod control;

pub use status::{ConditionCode, MachineFaultRegister, MachineStatus};
pub use fault::{MachineError, MachineFault};
pub use registers::Registers;
pub use alu::{Alu, AluOp};
pub use fpu::Fpu;
pub use cache::{Cache, CacheLine, CacheStats};
pub use memory::Memory;
pub use devices::DeviceBuffers;
pub use decode::{decode, encode, DecodeError, Instruction, Opcode};
pub use execute::{ExecutionContext, Flow, Latch};
pub use control::{Machine, PauseHandle, Phase, RunOutcome, StepOutcome};
