//! # CSCI ISS
//!
//! An instruction-set simulator for a 16-bit teaching machine.
//!
//! The machine has four general registers, three index registers, two
//! floating registers and up to 4096 words of memory behind a small
//! write-through cache. Instructions run through a five-phase control
//! unit with architectural fault handling and a supervisor mode.

pub mod word;
pub mod cpu;
pub mod config;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use word::{Address, PackedFloat, Word};
pub use cpu::{Machine, MachineError, MachineFault, Memory, Registers, Instruction, Phase, RunOutcome, StepOutcome};
pub use config::MachineConfig;
pub use asm::{disassemble, load_program_file, parse_program, save_program_file, ProgramFile};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
