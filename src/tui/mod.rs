//! Terminal debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register and status flag panel
//! - Memory view
//! - Phase/instruction stepping, run, pause and breakpoints
//! - Keyboard input entry and printer output
//! - Disassembly view

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
