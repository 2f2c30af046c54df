//! Machine word primitives.
//!
//! This module provides the value types every other component is built on:
//! - [`Word`] - the 16-bit unsigned machine word
//! - [`Address`] - a 12-bit masked address register value (PC, MAR)
//! - [`PackedFloat`] - the machine's sign/exponent/mantissa floating format
//! - binary-string formatting used by register dumps and program files

mod address;
mod binary;
mod float;

pub use address::Address;
pub use binary::{parse_binary_string, to_binary_string, BinaryParseError};
pub use float::PackedFloat;

/// A 16-bit machine word. All arithmetic is unsigned mod 2^16 unless an
/// instruction says otherwise.
pub type Word = u16;

/// Number of bits in a machine word.
pub const WORD_BITS: u32 = 16;

/// Mask of the sign bit (bit 15).
pub const SIGN_BIT: Word = 0x8000;

/// Mask of the 15 magnitude bits below the sign bit.
pub const MAGNITUDE_MASK: Word = 0x7FFF;
