//! Register file.
//!
//! The machine has:
//! - R0..R3: general purpose registers
//! - X1..X3: index registers (X0 reads as constant 0 and is not storable)
//! - FR0, FR1: floating-point registers
//! - PC, MAR: 12-bit address registers
//! - MBR, IR, IAR: staging registers for memory data, the fetched
//!   instruction and intermediate addresses

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::word::{to_binary_string, Address, PackedFloat, Word};

/// Number of general purpose registers.
pub const GENERAL_REGISTER_COUNT: usize = 4;

/// Number of index register ids, including the constant X0.
pub const INDEX_REGISTER_COUNT: usize = 4;

/// Number of floating-point registers.
pub const FLOATING_REGISTER_COUNT: usize = 2;

/// Implicit link register used by `JSR`/`RFS`.
pub const LINK_REGISTER: usize = 3;

/// The register file.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    gpr: [Word; GENERAL_REGISTER_COUNT],
    /// Slot 0 is never written.
    ixr: [Word; INDEX_REGISTER_COUNT],
    fr: [Word; FLOATING_REGISTER_COUNT],

    /// Program counter.
    pub pc: Address,
    /// Memory address register.
    pub mar: Address,
    /// Memory buffer register.
    pub mbr: Word,
    /// Instruction register.
    pub ir: Word,
    /// Internal address register.
    pub iar: Word,
}

impl Registers {
    /// Create a register file with every register zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every register to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Read general purpose register `id`.
    ///
    /// # Panics
    /// Panics if `id` is not in `0..4`.
    pub fn gpr(&self, id: usize) -> Word {
        assert!(id < GENERAL_REGISTER_COUNT, "invalid general register R{}", id);
        self.gpr[id]
    }

    /// Write general purpose register `id`.
    ///
    /// # Panics
    /// Panics if `id` is not in `0..4`.
    pub fn set_gpr(&mut self, id: usize, value: Word) {
        assert!(id < GENERAL_REGISTER_COUNT, "invalid general register R{}", id);
        self.gpr[id] = value;
    }

    /// Read index register `id`. X0 always reads as zero.
    ///
    /// # Panics
    /// Panics if `id` is not in `0..4`.
    pub fn ixr(&self, id: usize) -> Word {
        assert!(id < INDEX_REGISTER_COUNT, "invalid index register X{}", id);
        if id == 0 { 0 } else { self.ixr[id] }
    }

    /// Write index register `id`.
    ///
    /// # Panics
    /// Panics if `id` is not in `1..4`; X0 is not storable.
    pub fn set_ixr(&mut self, id: usize, value: Word) {
        assert!(
            (1..INDEX_REGISTER_COUNT).contains(&id),
            "invalid index register X{} for write",
            id
        );
        self.ixr[id] = value;
    }

    /// Read floating-point register `id`.
    ///
    /// # Panics
    /// Panics if `id` is not 0 or 1.
    pub fn fr(&self, id: usize) -> Word {
        assert!(id < FLOATING_REGISTER_COUNT, "invalid floating register FR{}", id);
        self.fr[id]
    }

    /// Write floating-point register `id`.
    ///
    /// # Panics
    /// Panics if `id` is not 0 or 1.
    pub fn set_fr(&mut self, id: usize, value: Word) {
        assert!(id < FLOATING_REGISTER_COUNT, "invalid floating register FR{}", id);
        self.fr[id] = value;
    }

    /// Advance the program counter by one, returning the old value.
    pub fn advance_pc(&mut self) -> Address {
        let old = self.pc;
        self.pc = self.pc.next();
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, target: Word) {
        self.pc.set(target);
    }

    /// Index-relative address: `X[ix] + displacement`, wrapping mod 2^16.
    pub fn indexed_address(&self, ix: usize, displacement: Word) -> Word {
        self.ixr(ix).wrapping_add(displacement)
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PC  = {:04}   MAR = {:04}", self.pc.get(), self.mar.get())?;
        writeln!(f, "IR  = {}   MBR = {}", to_binary_string(self.ir), to_binary_string(self.mbr))?;
        for (i, value) in self.gpr.iter().enumerate() {
            writeln!(f, "R{}  = {} ({})", i, to_binary_string(*value), value)?;
        }
        for i in 1..INDEX_REGISTER_COUNT {
            writeln!(f, "X{}  = {} ({})", i, to_binary_string(self.ixr[i]), self.ixr[i])?;
        }
        for (i, value) in self.fr.iter().enumerate() {
            writeln!(f, "FR{} = {} {:?}", i, to_binary_string(*value), PackedFloat::from_word(*value))?;
        }
        Ok(())
    }
}
