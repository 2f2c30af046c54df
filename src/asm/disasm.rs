//! Disassembler.
//!
//! Converts machine words back to readable assembly.

use crate::cpu::decode::{decode, DecodeError};
use crate::word::{to_binary_string, Word};

/// Disassemble a single word.
pub fn disassemble_word(word: Word) -> String {
    match decode(word) {
        Ok(instr) => instr.to_string(),
        Err(DecodeError::IllegalOpcode(op)) => format!("??? ({:02o})", op),
        Err(e @ DecodeError::IllegalOperand { .. }) => format!("??? ({})", e),
    }
}

/// Disassemble a listing of words loaded at `origin`.
pub fn disassemble(words: &[Word], origin: usize) -> String {
    let mut output = String::new();
    output.push_str("; addr  word              instruction\n");

    for (i, word) in words.iter().enumerate() {
        output.push_str(&format!(
            "{:04}:  {}  {}\n",
            origin + i,
            to_binary_string(*word),
            disassemble_word(*word)
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Instruction, MemOperand};

    #[test]
    fn test_disassemble_hlt() {
        assert_eq!(disassemble_word(0), "HLT");
    }

    #[test]
    fn test_disassemble_indirect() {
        let word = encode(&Instruction::Str(MemOperand::new(2, 1, 9, true)));
        assert_eq!(disassemble_word(word), "STR 2,1,9,I");
    }

    #[test]
    fn test_disassemble_illegal() {
        assert!(disassemble_word(0o77 << 10).starts_with("???"));
        assert!(disassemble_word(0o70 << 10 | 1 << 8).contains("illegal register rx"));
    }

    #[test]
    fn test_listing() {
        let listing = disassemble(&[0x0C05, 0], 6);
        assert!(listing.contains("0006:  0000110000000101  LDA 0,0,5"));
        assert!(listing.contains("0007:  0000000000000000  HLT"));
    }
}
