//! Arithmetic logic unit.
//!
//! The ALU holds two 16-bit input latches (A, B) and two output latches
//! with 32-bit capacity (Y, and Y2 for the divide remainder). Every
//! operation computes its outputs and rewrites all five condition flags in
//! one step; flags that mean nothing for an operation are cleared.
//!
//! All arithmetic is unsigned.

use serde::{Serialize, Deserialize};
use crate::cpu::status::ConditionCode;
use crate::word::{Word, MAGNITUDE_MASK, SIGN_BIT, WORD_BITS};

/// Results above this value set OVERFLOW for add and multiply.
pub const OVERFLOW_LIMIT: u32 = MAGNITUDE_MASK as u32;

/// ALU operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    // Arithmetic
    Add,
    Subtract,
    Compare,
    DecrementAndCompare,
    Multiply,
    Divide,
    // Logical
    And,
    Or,
    Not,
    // Shift (B holds the count)
    ShiftLeftArithmetic,
    ShiftLeftLogical,
    ShiftRightArithmetic,
    ShiftRightLogical,
    // Rotate (B holds the count)
    RotateLeftArithmetic,
    RotateLeftLogical,
    RotateRightArithmetic,
    RotateRightLogical,
}

/// The ALU and its latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Alu {
    /// Input latch A.
    pub a: Word,
    /// Input latch B.
    pub b: Word,
    /// Primary output latch.
    pub y: u32,
    /// Secondary output latch (divide remainder).
    pub y2: u32,
}

impl Alu {
    /// An ALU with cleared latches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both input latches.
    pub fn load(&mut self, a: Word, b: Word) {
        self.a = a;
        self.b = b;
    }

    /// Load the inputs and run `op`, returning Y.
    pub fn compute(&mut self, op: AluOp, a: Word, b: Word, cc: &mut ConditionCode) -> u32 {
        self.load(a, b);
        self.execute(op, cc)
    }

    /// Low word of Y.
    pub fn result(&self) -> Word {
        self.y as Word
    }

    /// High word of Y (multiply).
    pub fn result_high(&self) -> Word {
        (self.y >> WORD_BITS) as Word
    }

    /// Low word of Y2.
    pub fn remainder(&self) -> Word {
        self.y2 as Word
    }

    /// Run `op` on the current latches, returning Y.
    pub fn execute(&mut self, op: AluOp, cc: &mut ConditionCode) -> u32 {
        cc.clear();
        let a = self.a;
        let b = self.b;
        self.y2 = 0;

        match op {
            AluOp::Add => {
                self.y = a as u32 + b as u32;
                cc.set_overflow(self.y > OVERFLOW_LIMIT);
            }

            AluOp::Subtract => {
                self.y = a.wrapping_sub(b) as u32;
                cc.set_underflow(a < b);
            }

            AluOp::Compare => {
                self.y = a.wrapping_sub(b) as u32;
                cc.set_equal(a == b);
                cc.set_greater_than(a > b);
            }

            AluOp::DecrementAndCompare => {
                let result = a.wrapping_sub(1);
                self.y = result as u32;
                cc.set_underflow(a < 1);
                cc.set_equal(result == 0);
                cc.set_greater_than(result > 0);
            }

            AluOp::Multiply => {
                self.y = a as u32 * b as u32;
                cc.set_overflow(self.y > OVERFLOW_LIMIT);
            }

            AluOp::Divide => {
                if b == 0 {
                    self.y = 0;
                    cc.set_divide_by_zero(true);
                } else {
                    self.y = (a / b) as u32;
                    self.y2 = (a % b) as u32;
                }
            }

            AluOp::And => self.y = (a & b) as u32,
            AluOp::Or => self.y = (a | b) as u32,
            AluOp::Not => self.y = !a as u32,

            AluOp::ShiftLeftArithmetic => {
                let (result, lost) = shift_left_arithmetic(a, b);
                self.y = result as u32;
                cc.set_overflow(lost);
            }
            AluOp::ShiftLeftLogical => {
                let (result, lost) = shift_left_logical(a, b);
                self.y = result as u32;
                cc.set_overflow(lost);
            }
            // Right shifts never report underflow.
            AluOp::ShiftRightArithmetic => self.y = shift_right_arithmetic(a, b) as u32,
            AluOp::ShiftRightLogical => self.y = shift_right_logical(a, b) as u32,

            AluOp::RotateLeftArithmetic => self.y = rotate_left_arithmetic(a, b) as u32,
            AluOp::RotateLeftLogical => self.y = rotate_left_logical(a, b) as u32,
            AluOp::RotateRightArithmetic => self.y = rotate_right_arithmetic(a, b) as u32,
            AluOp::RotateRightLogical => self.y = rotate_right_logical(a, b) as u32,
        }

        self.y
    }
}

/// Shift and rotate counts are taken modulo the word size.
#[inline]
fn count(n: Word) -> u32 {
    n as u32 % WORD_BITS
}

/// Shift left keeping bit 15; returns the result and whether a set
/// magnitude bit was shifted out.
pub fn shift_left_arithmetic(a: Word, n: Word) -> (Word, bool) {
    let wide = ((a & MAGNITUDE_MASK) as u32) << count(n);
    let lost = wide & !(MAGNITUDE_MASK as u32) != 0;
    ((a & SIGN_BIT) | (wide as Word & MAGNITUDE_MASK), lost)
}

/// Shift left over all 16 bits; returns the result and whether a set bit
/// was shifted out.
pub fn shift_left_logical(a: Word, n: Word) -> (Word, bool) {
    let wide = (a as u32) << count(n);
    (wide as Word, wide > Word::MAX as u32)
}

/// Shift right replicating the sign bit.
pub fn shift_right_arithmetic(a: Word, n: Word) -> Word {
    ((a as i16) >> count(n)) as Word
}

/// Shift right filling with zeros.
pub fn shift_right_logical(a: Word, n: Word) -> Word {
    a >> count(n)
}

/// Rotate all 16 bits left.
pub fn rotate_left_logical(a: Word, n: Word) -> Word {
    a.rotate_left(count(n))
}

/// Rotate all 16 bits right.
pub fn rotate_right_logical(a: Word, n: Word) -> Word {
    a.rotate_right(count(n))
}

/// Rotate the low 15 bits left, leaving bit 15 in place.
pub fn rotate_left_arithmetic(a: Word, n: Word) -> Word {
    (a & SIGN_BIT) | rotate_magnitude_left(a & MAGNITUDE_MASK, count(n) % 15)
}

/// Rotate the low 15 bits right, leaving bit 15 in place.
pub fn rotate_right_arithmetic(a: Word, n: Word) -> Word {
    let k = count(n) % 15;
    let left = if k == 0 { 0 } else { 15 - k };
    (a & SIGN_BIT) | rotate_magnitude_left(a & MAGNITUDE_MASK, left)
}

fn rotate_magnitude_left(v: Word, k: u32) -> Word {
    if k == 0 {
        return v;
    }
    ((v << k) | (v >> (15 - k))) & MAGNITUDE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(op: AluOp, a: Word, b: Word) -> (Alu, ConditionCode) {
        let mut alu = Alu::new();
        let mut cc = ConditionCode::new();
        alu.compute(op, a, b, &mut cc);
        (alu, cc)
    }

    #[test]
    fn test_add_overflow_past_sign_bit() {
        let (alu, cc) = run(AluOp::Add, 0x7FFF, 1);
        assert_eq!(alu.y, 0x8000);
        assert!(cc.overflow());
        assert!(!cc.underflow());
    }

    #[test]
    fn test_add_carry_kept_in_wide_latch() {
        let (alu, cc) = run(AluOp::Add, 0xFFFF, 1);
        assert_eq!(alu.y, 0x1_0000);
        assert_eq!(alu.result(), 0);
        assert!(cc.overflow());
    }

    #[test]
    fn test_add_small_no_flags() {
        let (alu, cc) = run(AluOp::Add, 5, 10);
        assert_eq!(alu.result(), 15);
        assert_eq!(cc.bits(), 0);
    }

    #[test]
    fn test_subtract_underflow_is_unsigned() {
        let (alu, cc) = run(AluOp::Subtract, 3, 5);
        assert_eq!(alu.result(), 0xFFFE);
        assert!(cc.underflow());

        let (_, cc) = run(AluOp::Subtract, 5, 3);
        assert!(!cc.underflow());
    }

    #[test]
    fn test_compare_sets_equal_and_greater() {
        let (_, cc) = run(AluOp::Compare, 7, 7);
        assert!(cc.equal());
        assert!(!cc.greater_than());

        let (_, cc) = run(AluOp::Compare, 9, 7);
        assert!(cc.greater_than());
        assert!(!cc.less_than());

        let (_, cc) = run(AluOp::Compare, 2, 7);
        assert!(cc.less_than());
    }

    #[test]
    fn test_decrement_and_compare() {
        let (alu, cc) = run(AluOp::DecrementAndCompare, 1, 0);
        assert_eq!(alu.result(), 0);
        assert!(cc.equal());

        let (alu, cc) = run(AluOp::DecrementAndCompare, 0, 0);
        assert_eq!(alu.result(), 0xFFFF);
        assert!(cc.underflow());
    }

    #[test]
    fn test_multiply_wide_result() {
        let (alu, cc) = run(AluOp::Multiply, 300, 300);
        assert_eq!(alu.y, 90_000);
        assert_eq!(alu.result_high(), (90_000u32 >> 16) as Word);
        assert_eq!(alu.result(), (90_000u32 & 0xFFFF) as Word);
        assert!(cc.overflow());
    }

    #[test]
    fn test_divide() {
        let (alu, cc) = run(AluOp::Divide, 17, 5);
        assert_eq!(alu.result(), 3);
        assert_eq!(alu.remainder(), 2);
        assert!(!cc.divide_by_zero());
    }

    #[test]
    fn test_divide_by_zero_does_not_panic() {
        let (alu, cc) = run(AluOp::Divide, 5, 0);
        assert!(cc.divide_by_zero());
        assert_eq!(alu.y, 0);
        assert_eq!(alu.y2, 0);
    }

    #[test]
    fn test_flags_never_stale() {
        let mut alu = Alu::new();
        let mut cc = ConditionCode::new();
        alu.compute(AluOp::Divide, 1, 0, &mut cc);
        assert!(cc.divide_by_zero());
        alu.compute(AluOp::And, 0xF0F0, 0xFF00, &mut cc);
        assert_eq!(cc.bits(), 0);
        assert_eq!(alu.result(), 0xF000);
    }

    #[test]
    fn test_logic_ops() {
        assert_eq!(run(AluOp::Or, 0x00F0, 0x0F00).0.result(), 0x0FF0);
        assert_eq!(run(AluOp::Not, 0x00FF, 0).0.result(), 0xFF00);
    }

    #[test]
    fn test_shift_left_arithmetic_keeps_sign() {
        assert_eq!(shift_left_arithmetic(0x8001, 3), (0x8008, false));
        assert_eq!(shift_left_arithmetic(0x4000, 1), (0x0000, true));
    }

    #[test]
    fn test_shift_left_logical_reports_lost_bits() {
        assert_eq!(shift_left_logical(0x8001, 1), (0x0002, true));
        assert_eq!(shift_left_logical(0x0001, 4), (0x0010, false));
    }

    #[test]
    fn test_shift_right() {
        assert_eq!(shift_right_arithmetic(0x8000, 3), 0xF000);
        assert_eq!(shift_right_logical(0x8000, 3), 0x1000);
    }

    #[test]
    fn test_shift_right_never_underflows() {
        // A non-zero count on a value not divisible by 10 still clears
        // underflow; right shifts do not report it at all.
        let (_, cc) = run(AluOp::ShiftRightLogical, 7, 1);
        assert!(!cc.underflow());
        let (_, cc) = run(AluOp::ShiftRightArithmetic, 0x8003, 2);
        assert!(!cc.underflow());
    }

    #[test]
    fn test_count_is_modulo_word_size() {
        assert_eq!(shift_right_logical(0x0100, 16 + 4), 0x0010);
        assert_eq!(rotate_left_logical(0x0001, 17), 0x0002);
        assert_eq!(run(AluOp::ShiftLeftLogical, 3, 16).0.result(), 3);
    }

    #[test]
    fn test_rotate_logical() {
        assert_eq!(rotate_left_logical(0x8001, 1), 0x0003);
        assert_eq!(rotate_right_logical(0x0003, 1), 0x8001);
    }

    #[test]
    fn test_rotate_arithmetic_wraps_inside_fifteen_bits() {
        // bit 14 wraps to bit 0, the sign bit is untouched
        assert_eq!(rotate_left_arithmetic(0xC000, 1), 0x8001);
        assert_eq!(rotate_right_arithmetic(0x8001, 1), 0xC000);
        assert_eq!(rotate_left_arithmetic(0x4000, 1), 0x0001);
        // rotating by 15 returns the original magnitude
        assert_eq!(rotate_left_arithmetic(0x1234, 15), 0x1234);
    }

    #[test]
    fn test_rotate_clears_flags() {
        let mut alu = Alu::new();
        let mut cc = ConditionCode::new();
        cc.set_overflow(true);
        alu.compute(AluOp::RotateLeftLogical, 0xFFFF, 3, &mut cc);
        assert_eq!(cc.bits(), 0);
    }

    proptest! {
        #[test]
        fn prop_rotate_arithmetic_preserves_sign(a in any::<u16>(), n in 0u16..64) {
            prop_assert_eq!(rotate_left_arithmetic(a, n) & SIGN_BIT, a & SIGN_BIT);
            prop_assert_eq!(rotate_right_arithmetic(rotate_left_arithmetic(a, n), n), a);
        }

        #[test]
        fn prop_rotate_logical_inverts(a in any::<u16>(), n in 0u16..64) {
            prop_assert_eq!(rotate_right_logical(rotate_left_logical(a, n), n), a);
        }

        #[test]
        fn prop_subtract_underflow_iff_less(a in any::<u16>(), b in any::<u16>()) {
            let (alu, cc) = run(AluOp::Subtract, a, b);
            prop_assert_eq!(cc.underflow(), a < b);
            prop_assert_eq!(alu.result(), a.wrapping_sub(b));
        }
    }
}
