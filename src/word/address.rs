//! 12-bit address register values.

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::word::Word;

/// A 12-bit address as held by the program counter and the memory address
/// register. The top four bits of any value written are discarded.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(u16);

impl Address {
    /// Number of significant bits.
    pub const BITS: u32 = 12;

    /// Mask applied on every write.
    pub const MASK: u16 = 0x0FFF;

    /// Size of the addressable space.
    pub const SPACE: usize = 1 << Self::BITS;

    /// Create a masked address.
    #[inline]
    pub const fn new(value: Word) -> Self {
        Self(value & Self::MASK)
    }

    /// The zero address.
    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Replace the value, discarding the top four bits.
    #[inline]
    pub fn set(&mut self, value: Word) {
        self.0 = value & Self::MASK;
    }

    /// Raw value.
    #[inline]
    pub const fn get(self) -> Word {
        self.0
    }

    /// Value as an index into memory.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The next address, wrapping inside the 12-bit space.
    #[inline]
    pub const fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }

    /// The previous address, wrapping inside the 12-bit space.
    #[inline]
    pub const fn prev(self) -> Self {
        Self::new(self.0.wrapping_sub(1))
    }
}

impl From<Word> for Address {
    fn from(value: Word) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:04})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_masks_top_bits() {
        let mut addr = Address::zero();
        addr.set(0xF123);
        assert_eq!(addr.get(), 0x0123);
        assert_eq!(Address::new(0xFFFF).get(), 0x0FFF);
    }

    #[test]
    fn test_next_wraps() {
        assert_eq!(Address::new(0x0FFF).next().get(), 0);
        assert_eq!(Address::new(0).prev().get(), 0x0FFF);
        assert_eq!(Address::new(6).next().index(), 7);
    }
}
