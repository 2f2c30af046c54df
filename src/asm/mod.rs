//! Program files and disassembly.
//!
//! This module provides:
//! - A loader for binary-word program files
//! - A disassembler (words → readable text)

pub mod disasm;
pub mod program;

pub use disasm::{disassemble, disassemble_word};
pub use program::{load_program_file, parse_program, save_program_file, ProgramFile};
