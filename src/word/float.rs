//! The machine's packed floating-point format.
//!
//! One word holds a sign bit, an exponent sign bit, a six-bit exponent
//! magnitude and an eight-bit integer mantissa:
//!
//! ```text
//!  15   14   13..8      7..0
//! | S | ES | exponent | mantissa |
//! ```
//!
//! The value is `(-1)^S * mantissa * 2^(±exponent)`. This is not IEEE-754.

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::word::Word;

const SIGN_MASK: Word = 0x8000;
const EXPONENT_SIGN_MASK: Word = 0x4000;
const EXPONENT_SHIFT: u32 = 8;
const EXPONENT_MASK: Word = 0x3F;
const MANTISSA_MASK: Word = 0xFF;

/// A decomposed floating-point word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PackedFloat {
    /// Sign of the value.
    pub negative: bool,
    /// Signed exponent in `[MIN_EXPONENT, MAX_EXPONENT]`.
    pub exponent: i8,
    /// Unsigned integer mantissa.
    pub mantissa: u8,
}

impl PackedFloat {
    /// Largest exponent.
    pub const MAX_EXPONENT: i8 = 63;

    /// Smallest exponent.
    pub const MIN_EXPONENT: i8 = -63;

    /// Largest mantissa.
    pub const MAX_MANTISSA: u32 = 0xFF;

    /// Canonical zero.
    pub const fn zero() -> Self {
        Self { negative: false, exponent: 0, mantissa: 0 }
    }

    /// Build from parts.
    ///
    /// # Panics
    /// Panics if the exponent is outside `[-63, 63]`.
    pub fn new(negative: bool, exponent: i8, mantissa: u8) -> Self {
        assert!(
            (Self::MIN_EXPONENT..=Self::MAX_EXPONENT).contains(&exponent),
            "exponent {} out of range [{}, {}]",
            exponent, Self::MIN_EXPONENT, Self::MAX_EXPONENT
        );
        Self { negative, exponent, mantissa }
    }

    /// Unpack a word.
    pub fn from_word(word: Word) -> Self {
        let magnitude = ((word >> EXPONENT_SHIFT) & EXPONENT_MASK) as i8;
        let exponent = if word & EXPONENT_SIGN_MASK != 0 { -magnitude } else { magnitude };
        Self {
            negative: word & SIGN_MASK != 0,
            exponent,
            mantissa: (word & MANTISSA_MASK) as u8,
        }
    }

    /// Pack into a word. A zero exponent is always stored with a clear
    /// exponent sign.
    pub fn to_word(self) -> Word {
        let mut word = self.mantissa as Word;
        word |= (self.exponent.unsigned_abs() as Word & EXPONENT_MASK) << EXPONENT_SHIFT;
        if self.exponent < 0 {
            word |= EXPONENT_SIGN_MASK;
        }
        if self.negative {
            word |= SIGN_MASK;
        }
        word
    }

    /// True when the mantissa is zero, whatever the sign and exponent.
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Approximate host value, for display only.
    pub fn to_f64(self) -> f64 {
        let magnitude = self.mantissa as f64 * 2f64.powi(self.exponent as i32);
        if self.negative { -magnitude } else { magnitude }
    }
}

impl From<Word> for PackedFloat {
    fn from(word: Word) -> Self {
        Self::from_word(word)
    }
}

impl fmt::Debug for PackedFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}*2^{} ({})",
            if self.negative { "-" } else { "" },
            self.mantissa,
            self.exponent,
            self.to_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_layout() {
        let f = PackedFloat::new(true, -3, 0x2A);
        assert_eq!(f.to_word(), 0x8000 | 0x4000 | (3 << 8) | 0x2A);
        assert_eq!(PackedFloat::from_word(f.to_word()), f);
    }

    #[test]
    fn test_value() {
        assert_eq!(PackedFloat::new(false, 2, 3).to_f64(), 12.0);
        assert_eq!(PackedFloat::new(true, -1, 3).to_f64(), -1.5);
        assert!(PackedFloat::from_word(0x4000).is_zero());
    }

    #[test]
    fn test_negative_zero_exponent_normalizes() {
        // exponent sign set with zero magnitude decodes as exponent 0
        let f = PackedFloat::from_word(0x4005);
        assert_eq!(f.exponent, 0);
        assert_eq!(f.to_word(), 0x0005);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_exponent_range_checked() {
        PackedFloat::new(false, 64, 1);
    }
}
