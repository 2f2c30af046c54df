//! Program file format.
//!
//! A simple text format:
//! - One 16-digit binary word per line
//! - `;` starts a comment, to the end of the line
//! - Blank lines are ignored

use std::io::Write;
use std::path::Path;
use crate::cpu::fault::MachineError;
use crate::word::{parse_binary_string, to_binary_string, Word};
use super::disasm::disassemble_word;

/// A loaded program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFile {
    /// The program words, in load order.
    pub words: Vec<Word>,
    /// Source line number of each word.
    pub lines: Vec<usize>,
}

impl ProgramFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, word: Word, line: usize) {
        self.words.push(word);
        self.lines.push(line);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Parse program text.
pub fn parse_program(text: &str) -> Result<ProgramFile, MachineError> {
    let mut program = ProgramFile::new();

    for (index, line) in text.lines().enumerate() {
        let code = match line.find(';') {
            Some(at) => &line[..at],
            None => line,
        };
        let code = code.trim();
        if code.is_empty() {
            continue;
        }

        let word = parse_binary_string(code)
            .map_err(|source| MachineError::Parse { line: index + 1, source })?;
        program.push(word, index + 1);
    }

    Ok(program)
}

/// Load a program file from disk.
pub fn load_program_file<P: AsRef<Path>>(path: P) -> Result<ProgramFile, MachineError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| MachineError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
    parse_program(&text)
}

/// Write words as a program file, annotated with their disassembly.
pub fn save_program_file<P: AsRef<Path>>(path: P, words: &[Word], origin: usize) -> Result<(), MachineError> {
    let io = |e: std::io::Error| MachineError::Io(e.to_string());
    let mut file = std::fs::File::create(path.as_ref()).map_err(io)?;

    writeln!(file, "; {} words, origin {}", words.len(), origin).map_err(io)?;
    for (i, word) in words.iter().enumerate() {
        writeln!(file, "{} ; {:04}  {}", to_binary_string(*word), origin + i, disassemble_word(*word))
            .map_err(io)?;
    }
    Ok(())
}
