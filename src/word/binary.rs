//! Word to binary-string conversion for diagnostics and program text.

use thiserror::Error;
use crate::word::{Word, WORD_BITS};

/// Format a word as 16 zero-padded binary digits, most significant first.
pub fn to_binary_string(word: Word) -> String {
    format!("{:016b}", word)
}

/// Parse exactly 16 binary digits into a word.
///
/// Surrounding whitespace is ignored; anything else that is not `0`/`1`
/// is rejected.
pub fn parse_binary_string(text: &str) -> Result<Word, BinaryParseError> {
    let digits = text.trim();
    if digits.len() != WORD_BITS as usize {
        return Err(BinaryParseError::Length(digits.len()));
    }

    let mut word: Word = 0;
    for (pos, c) in digits.chars().enumerate() {
        let bit = match c {
            '0' => 0,
            '1' => 1,
            other => return Err(BinaryParseError::Digit { pos, found: other }),
        };
        word = (word << 1) | bit;
    }

    Ok(word)
}

/// Errors produced when parsing a binary word.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryParseError {
    #[error("expected 16 binary digits, found {0}")]
    Length(usize),

    #[error("invalid binary digit '{found}' at position {pos}")]
    Digit { pos: usize, found: char },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_pads() {
        assert_eq!(to_binary_string(0), "0000000000000000");
        assert_eq!(to_binary_string(5), "0000000000000101");
        assert_eq!(to_binary_string(0x8001), "1000000000000001");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_binary_string("0101"), Err(BinaryParseError::Length(4)));
        assert_eq!(
            parse_binary_string("000000000000002 "),
            Err(BinaryParseError::Length(15)),
        );
        assert_eq!(
            parse_binary_string("0000000000000020"),
            Err(BinaryParseError::Digit { pos: 14, found: '2' }),
        );
    }

    proptest! {
        #[test]
        fn prop_parse_inverts_format(w in any::<u16>()) {
            prop_assert_eq!(parse_binary_string(&to_binary_string(w)), Ok(w));
        }
    }
}
