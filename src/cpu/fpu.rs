//! Floating-point unit.
//!
//! Operates on [`PackedFloat`] words through two input latches (A, B) and
//! one output latch (Y). Like the ALU, every operation rewrites all five
//! condition flags.
//!
//! Add and subtract follow the machine's pipeline:
//! 1. align exponents by shifting the smaller operand's mantissa right
//! 2. convert negative mantissas to two's complement
//! 3. add the mantissas
//! 4. convert a negative sum back to sign-magnitude
//! 5. shift an oversized mantissa right, bumping the exponent, until it
//!    fits or the exponent saturates (OVERFLOW)
//! 6. pack the result

use serde::{Serialize, Deserialize};
use crate::cpu::status::ConditionCode;
use crate::word::{PackedFloat, Word};

/// The FPU and its latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fpu {
    /// Input latch A.
    pub a: Word,
    /// Input latch B.
    pub b: Word,
    /// Output latch.
    pub y: Word,
}

impl Fpu {
    /// An FPU with cleared latches.
    pub fn new() -> Self {
        Self::default()
    }

    /// `Y = A + B`.
    pub fn add(&mut self, a: Word, b: Word, cc: &mut ConditionCode) -> Word {
        self.a = a;
        self.b = b;
        self.y = add_packed(PackedFloat::from_word(a), PackedFloat::from_word(b), cc);
        self.y
    }

    /// `Y = A - B`.
    pub fn subtract(&mut self, a: Word, b: Word, cc: &mut ConditionCode) -> Word {
        self.a = a;
        self.b = b;
        let mut negated = PackedFloat::from_word(b);
        negated.negative = !negated.negative;
        self.y = add_packed(PackedFloat::from_word(a), negated, cc);
        self.y
    }

    /// Floating to fixed: `mantissa * 2^exponent`, rounded half up and
    /// saturated to the signed 16-bit range.
    pub fn to_fixed(&mut self, a: Word, cc: &mut ConditionCode) -> Word {
        cc.clear();
        self.a = a;
        self.b = 0;

        let f = PackedFloat::from_word(a);
        let m = f.mantissa as u64;
        let magnitude: Option<u64> = if f.exponent >= 0 {
            let e = f.exponent as u32;
            if m == 0 {
                Some(0)
            } else if e >= 16 {
                None
            } else {
                Some(m << e)
            }
        } else {
            let s = f.exponent.unsigned_abs() as u32;
            Some((m + (1u64 << (s - 1))) >> s)
        };

        let limit: u64 = if f.negative { 0x8000 } else { 0x7FFF };
        let magnitude = match magnitude {
            Some(v) if v <= limit => v,
            _ => {
                cc.set_overflow(true);
                limit
            }
        };

        let value = if f.negative { -(magnitude as i32) } else { magnitude as i32 };
        self.y = value as i16 as Word;
        self.y
    }

    /// Fixed to floating. The fixed word is read as signed 16-bit; the
    /// mantissa is truncated while the exponent grows.
    pub fn to_float(&mut self, a: Word, cc: &mut ConditionCode) -> Word {
        cc.clear();
        self.a = a;
        self.b = 0;

        let value = a as i16 as i32;
        let mut magnitude = value.unsigned_abs();
        let mut exponent: i8 = 0;
        while magnitude > PackedFloat::MAX_MANTISSA {
            magnitude >>= 1;
            exponent += 1;
        }

        self.y = if magnitude == 0 {
            PackedFloat::zero().to_word()
        } else {
            PackedFloat::new(value < 0, exponent, magnitude as u8).to_word()
        };
        self.y
    }
}

fn align(mantissa: i32, shift: i32, cc: &mut ConditionCode) -> i32 {
    let aligned = if shift >= 31 { 0 } else { mantissa >> shift };
    if mantissa != 0 && aligned == 0 {
        cc.set_underflow(true);
    }
    aligned
}

fn add_packed(a: PackedFloat, b: PackedFloat, cc: &mut ConditionCode) -> Word {
    cc.clear();

    let (mut ma, ea) = (a.mantissa as i32, a.exponent as i32);
    let (mut mb, eb) = (b.mantissa as i32, b.exponent as i32);

    let mut exponent = ea.max(eb);
    if ea < eb {
        ma = align(ma, eb - ea, cc);
    } else if eb < ea {
        mb = align(mb, ea - eb, cc);
    }

    let sa = if a.negative { -ma } else { ma };
    let sb = if b.negative { -mb } else { mb };
    let sum = sa + sb;

    let negative = sum < 0;
    let mut magnitude = sum.unsigned_abs();

    while magnitude > PackedFloat::MAX_MANTISSA {
        if exponent == PackedFloat::MAX_EXPONENT as i32 {
            cc.set_overflow(true);
            magnitude = PackedFloat::MAX_MANTISSA;
            break;
        }
        magnitude >>= 1;
        exponent += 1;
    }

    if magnitude == 0 {
        return PackedFloat::zero().to_word();
    }

    PackedFloat::new(negative, exponent as i8, magnitude as u8).to_word()
}
