//! Instruction decoder.
//!
//! Every instruction is one 16-bit word. The top six bits select the
//! opcode; the remaining ten bits are laid out by operand family:
//!
//! ```text
//!  15      10  9  8  7  6  5  4          0
//! | opcode  |  R  | IX  | I |  address   |   load/store
//! | opcode  |  R  |A/L|L/R| - |  count   |   shift/rotate
//! | opcode  |  R  |   -      |  device   |   I/O
//! | opcode  |  rx | ry  |       -        |   register/register
//! | opcode  |          trap code         |   TRAP
//! ```

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::word::Word;

const OPCODE_SHIFT: u32 = 10;

#[inline]
fn field(word: Word, shift: u32, width: u32) -> u8 {
    ((word >> shift) & ((1 << width) - 1)) as u8
}

/// Opcode catalog. Discriminants are the 6-bit opcode values (octal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0o00,
    Ldr = 0o01,
    Str = 0o02,
    Lda = 0o03,
    Amr = 0o04,
    Smr = 0o05,
    Air = 0o06,
    Sir = 0o07,
    Jz = 0o10,
    Jne = 0o11,
    Jcc = 0o12,
    Jma = 0o13,
    Jsr = 0o14,
    Rfs = 0o15,
    Sob = 0o16,
    Jge = 0o17,
    Trap = 0o30,
    Src = 0o31,
    Rrc = 0o32,
    Fadd = 0o33,
    Fsub = 0o34,
    Vadd = 0o35,
    Vsub = 0o36,
    Cnvrt = 0o37,
    Ldx = 0o41,
    Stx = 0o42,
    Ldfr = 0o50,
    Stfr = 0o51,
    In = 0o61,
    Out = 0o62,
    Chk = 0o63,
    Mlt = 0o70,
    Dvd = 0o71,
    Trr = 0o72,
    And = 0o73,
    Orr = 0o74,
    Not = 0o75,
}

impl Opcode {
    /// Every opcode in numeric order.
    pub const ALL: [Opcode; 37] = [
        Opcode::Hlt, Opcode::Ldr, Opcode::Str, Opcode::Lda, Opcode::Amr,
        Opcode::Smr, Opcode::Air, Opcode::Sir, Opcode::Jz, Opcode::Jne,
        Opcode::Jcc, Opcode::Jma, Opcode::Jsr, Opcode::Rfs, Opcode::Sob,
        Opcode::Jge, Opcode::Trap, Opcode::Src, Opcode::Rrc, Opcode::Fadd,
        Opcode::Fsub, Opcode::Vadd, Opcode::Vsub, Opcode::Cnvrt, Opcode::Ldx,
        Opcode::Stx, Opcode::Ldfr, Opcode::Stfr, Opcode::In, Opcode::Out,
        Opcode::Chk, Opcode::Mlt, Opcode::Dvd, Opcode::Trr, Opcode::And,
        Opcode::Orr, Opcode::Not,
    ];

    /// Look up a 6-bit opcode value.
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.bits() == bits)
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Opcode of a raw instruction word.
    pub fn of(word: Word) -> Option<Self> {
        Self::from_bits(field(word, OPCODE_SHIFT, 6))
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "HLT",
            Opcode::Ldr => "LDR",
            Opcode::Str => "STR",
            Opcode::Lda => "LDA",
            Opcode::Amr => "AMR",
            Opcode::Smr => "SMR",
            Opcode::Air => "AIR",
            Opcode::Sir => "SIR",
            Opcode::Jz => "JZ",
            Opcode::Jne => "JNE",
            Opcode::Jcc => "JCC",
            Opcode::Jma => "JMA",
            Opcode::Jsr => "JSR",
            Opcode::Rfs => "RFS",
            Opcode::Sob => "SOB",
            Opcode::Jge => "JGE",
            Opcode::Trap => "TRAP",
            Opcode::Src => "SRC",
            Opcode::Rrc => "RRC",
            Opcode::Fadd => "FADD",
            Opcode::Fsub => "FSUB",
            Opcode::Vadd => "VADD",
            Opcode::Vsub => "VSUB",
            Opcode::Cnvrt => "CNVRT",
            Opcode::Ldx => "LDX",
            Opcode::Stx => "STX",
            Opcode::Ldfr => "LDFR",
            Opcode::Stfr => "STFR",
            Opcode::In => "IN",
            Opcode::Out => "OUT",
            Opcode::Chk => "CHK",
            Opcode::Mlt => "MLT",
            Opcode::Dvd => "DVD",
            Opcode::Trr => "TRR",
            Opcode::And => "AND",
            Opcode::Orr => "ORR",
            Opcode::Not => "NOT",
        }
    }

    /// Bits of a word that this opcode's layout gives meaning to.
    pub fn operand_mask(self) -> Word {
        let opcode = 0b111111 << OPCODE_SHIFT;
        opcode
            | match self {
                Opcode::Hlt => 0,
                Opcode::Air | Opcode::Sir => 0x031F,
                Opcode::Rfs => 0x001F,
                Opcode::Src | Opcode::Rrc => 0x03CF,
                Opcode::In | Opcode::Out | Opcode::Chk => 0x031F,
                Opcode::Mlt | Opcode::Dvd | Opcode::Trr | Opcode::And | Opcode::Orr => 0x03C0,
                Opcode::Not => 0x0300,
                _ => 0x03FF,
            }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// ============================================================================
// Operand layouts
// ============================================================================

/// Load/store operand: register (or selector), index register, indirect
/// bit and 5-bit address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemOperand {
    pub r: u8,
    pub ix: u8,
    pub indirect: bool,
    pub address: u8,
}

impl MemOperand {
    pub fn new(r: u8, ix: u8, address: u8, indirect: bool) -> Self {
        Self { r, ix, indirect, address }
    }

    fn decode(word: Word) -> Self {
        Self {
            r: field(word, 8, 2),
            ix: field(word, 6, 2),
            indirect: field(word, 5, 1) == 1,
            address: field(word, 0, 5),
        }
    }

    fn encode(&self) -> Word {
        ((self.r as Word & 0b11) << 8)
            | ((self.ix as Word & 0b11) << 6)
            | ((self.indirect as Word) << 5)
            | (self.address as Word & 0x1F)
    }
}

/// Shift/rotate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftOperand {
    pub r: u8,
    pub count: u8,
    pub left: bool,
    pub logical: bool,
}

impl ShiftOperand {
    fn decode(word: Word) -> Self {
        Self {
            r: field(word, 8, 2),
            logical: field(word, 7, 1) == 1,
            left: field(word, 6, 1) == 1,
            count: field(word, 0, 4),
        }
    }

    fn encode(&self) -> Word {
        ((self.r as Word & 0b11) << 8)
            | ((self.logical as Word) << 7)
            | ((self.left as Word) << 6)
            | (self.count as Word & 0xF)
    }
}

/// I/O operand: register and 5-bit device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoOperand {
    pub r: u8,
    pub device: u8,
}

/// Register/register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegOperand {
    pub rx: u8,
    pub ry: u8,
}

// ============================================================================
// Instruction
// ============================================================================

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Hlt,

    // ==================== Load/Store ====================

    /// r := c(EA)
    Ldr(MemOperand),
    /// Memory(EA) := c(r)
    Str(MemOperand),
    /// r := EA
    Lda(MemOperand),
    /// Xx := c(EA), x taken from the IX field
    Ldx(MemOperand),
    /// Memory(EA) := c(Xx)
    Stx(MemOperand),

    // ==================== Arithmetic ====================

    Amr(MemOperand),
    Smr(MemOperand),
    /// r := c(r) + immediate
    Air { r: u8, immediate: u8 },
    /// r := c(r) - immediate
    Sir { r: u8, immediate: u8 },
    /// (rx, rx+1) := c(rx) * c(ry)
    Mlt(RegOperand),
    /// rx := quotient, rx+1 := remainder
    Dvd(RegOperand),
    /// EQUAL := c(rx) = c(ry)
    Trr(RegOperand),
    And(RegOperand),
    Orr(RegOperand),
    Not { rx: u8 },
    Src(ShiftOperand),
    Rrc(ShiftOperand),

    // ==================== Transfer ====================

    Jz(MemOperand),
    Jne(MemOperand),
    /// Jump if the condition bit selected by the R field is set.
    Jcc(MemOperand),
    Jma(MemOperand),
    /// R3 := PC; PC := EA
    Jsr(MemOperand),
    /// R0 := immediate; PC := c(R3)
    Rfs { immediate: u8 },
    /// Subtract one and branch while positive.
    Sob(MemOperand),
    Jge(MemOperand),
    Trap { code: u16 },

    // ==================== Floating point / vector ====================

    Fadd(MemOperand),
    Fsub(MemOperand),
    Vadd(MemOperand),
    Vsub(MemOperand),
    Cnvrt(MemOperand),
    Ldfr(MemOperand),
    Stfr(MemOperand),

    // ==================== I/O ====================

    In(IoOperand),
    Out(IoOperand),
    Chk(IoOperand),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Hlt => Opcode::Hlt,
            Instruction::Ldr(_) => Opcode::Ldr,
            Instruction::Str(_) => Opcode::Str,
            Instruction::Lda(_) => Opcode::Lda,
            Instruction::Ldx(_) => Opcode::Ldx,
            Instruction::Stx(_) => Opcode::Stx,
            Instruction::Amr(_) => Opcode::Amr,
            Instruction::Smr(_) => Opcode::Smr,
            Instruction::Air { .. } => Opcode::Air,
            Instruction::Sir { .. } => Opcode::Sir,
            Instruction::Mlt(_) => Opcode::Mlt,
            Instruction::Dvd(_) => Opcode::Dvd,
            Instruction::Trr(_) => Opcode::Trr,
            Instruction::And(_) => Opcode::And,
            Instruction::Orr(_) => Opcode::Orr,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Src(_) => Opcode::Src,
            Instruction::Rrc(_) => Opcode::Rrc,
            Instruction::Jz(_) => Opcode::Jz,
            Instruction::Jne(_) => Opcode::Jne,
            Instruction::Jcc(_) => Opcode::Jcc,
            Instruction::Jma(_) => Opcode::Jma,
            Instruction::Jsr(_) => Opcode::Jsr,
            Instruction::Rfs { .. } => Opcode::Rfs,
            Instruction::Sob(_) => Opcode::Sob,
            Instruction::Jge(_) => Opcode::Jge,
            Instruction::Trap { .. } => Opcode::Trap,
            Instruction::Fadd(_) => Opcode::Fadd,
            Instruction::Fsub(_) => Opcode::Fsub,
            Instruction::Vadd(_) => Opcode::Vadd,
            Instruction::Vsub(_) => Opcode::Vsub,
            Instruction::Cnvrt(_) => Opcode::Cnvrt,
            Instruction::Ldfr(_) => Opcode::Ldfr,
            Instruction::Stfr(_) => Opcode::Stfr,
            Instruction::In(_) => Opcode::In,
            Instruction::Out(_) => Opcode::Out,
            Instruction::Chk(_) => Opcode::Chk,
        }
    }

    /// The load/store operand, for instructions that compute an effective
    /// address.
    pub fn mem_operand(&self) -> Option<&MemOperand> {
        match self {
            Instruction::Ldr(m) | Instruction::Str(m) | Instruction::Lda(m)
            | Instruction::Ldx(m) | Instruction::Stx(m) | Instruction::Amr(m)
            | Instruction::Smr(m) | Instruction::Jz(m) | Instruction::Jne(m)
            | Instruction::Jcc(m) | Instruction::Jma(m) | Instruction::Jsr(m)
            | Instruction::Sob(m) | Instruction::Jge(m) | Instruction::Fadd(m)
            | Instruction::Fsub(m) | Instruction::Vadd(m) | Instruction::Vsub(m)
            | Instruction::Cnvrt(m) | Instruction::Ldfr(m) | Instruction::Stfr(m) => Some(m),
            _ => None,
        }
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The opcode is not in the catalog.
    #[error("illegal opcode {0:#04o}")]
    IllegalOpcode(u8),

    /// An operand field holds a value its opcode does not accept.
    #[error("{opcode}: illegal {field} {value}")]
    IllegalOperand {
        opcode: Opcode,
        field: &'static str,
        value: u8,
    },
}

fn require(opcode: Opcode, field: &'static str, value: u8, ok: bool) -> Result<(), DecodeError> {
    if ok {
        Ok(())
    } else {
        Err(DecodeError::IllegalOperand { opcode, field, value })
    }
}

/// Decode one instruction word.
pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    let bits = field(word, OPCODE_SHIFT, 6);
    let opcode = Opcode::from_bits(bits).ok_or(DecodeError::IllegalOpcode(bits))?;

    let mem = MemOperand::decode(word);
    let shift = ShiftOperand::decode(word);
    let io = IoOperand { r: field(word, 8, 2), device: field(word, 0, 5) };
    let regs = RegOperand { rx: field(word, 8, 2), ry: field(word, 6, 2) };

    let instruction = match opcode {
        Opcode::Hlt => Instruction::Hlt,
        Opcode::Ldr => Instruction::Ldr(mem),
        Opcode::Str => Instruction::Str(mem),
        Opcode::Lda => Instruction::Lda(mem),
        Opcode::Amr => Instruction::Amr(mem),
        Opcode::Smr => Instruction::Smr(mem),
        Opcode::Air => Instruction::Air { r: mem.r, immediate: mem.address },
        Opcode::Sir => Instruction::Sir { r: mem.r, immediate: mem.address },
        Opcode::Jz => Instruction::Jz(mem),
        Opcode::Jne => Instruction::Jne(mem),
        Opcode::Jcc => Instruction::Jcc(mem),
        Opcode::Jma => Instruction::Jma(mem),
        Opcode::Jsr => Instruction::Jsr(mem),
        Opcode::Rfs => Instruction::Rfs { immediate: mem.address },
        Opcode::Sob => Instruction::Sob(mem),
        Opcode::Jge => Instruction::Jge(mem),
        Opcode::Trap => Instruction::Trap { code: word & 0x03FF },
        Opcode::Src => Instruction::Src(shift),
        Opcode::Rrc => Instruction::Rrc(shift),
        Opcode::Cnvrt => Instruction::Cnvrt(mem),
        Opcode::Fadd | Opcode::Fsub | Opcode::Vadd | Opcode::Vsub | Opcode::Ldfr | Opcode::Stfr => {
            require(opcode, "floating register", mem.r, mem.r < 2)?;
            match opcode {
                Opcode::Fadd => Instruction::Fadd(mem),
                Opcode::Fsub => Instruction::Fsub(mem),
                Opcode::Vadd => Instruction::Vadd(mem),
                Opcode::Vsub => Instruction::Vsub(mem),
                Opcode::Ldfr => Instruction::Ldfr(mem),
                _ => Instruction::Stfr(mem),
            }
        }
        Opcode::Ldx | Opcode::Stx => {
            require(opcode, "index register", mem.ix, mem.ix != 0)?;
            if opcode == Opcode::Ldx { Instruction::Ldx(mem) } else { Instruction::Stx(mem) }
        }
        Opcode::In => Instruction::In(io),
        Opcode::Out => Instruction::Out(io),
        Opcode::Chk => Instruction::Chk(io),
        Opcode::Mlt | Opcode::Dvd => {
            require(opcode, "register rx", regs.rx, regs.rx % 2 == 0)?;
            require(opcode, "register ry", regs.ry, regs.ry % 2 == 0)?;
            if opcode == Opcode::Mlt { Instruction::Mlt(regs) } else { Instruction::Dvd(regs) }
        }
        Opcode::Trr => Instruction::Trr(regs),
        Opcode::And => Instruction::And(regs),
        Opcode::Orr => Instruction::Orr(regs),
        Opcode::Not => Instruction::Not { rx: regs.rx },
    };

    Ok(instruction)
}

/// Encode an instruction back to a word.
pub fn encode(instr: &Instruction) -> Word {
    let operand = match instr {
        Instruction::Hlt => 0,
        Instruction::Air { r, immediate } | Instruction::Sir { r, immediate } => {
            MemOperand::new(*r, 0, *immediate, false).encode()
        }
        Instruction::Rfs { immediate } => MemOperand::new(0, 0, *immediate, false).encode(),
        Instruction::Trap { code } => code & 0x03FF,
        Instruction::Src(s) | Instruction::Rrc(s) => s.encode(),
        Instruction::In(io) | Instruction::Out(io) | Instruction::Chk(io) => {
            ((io.r as Word & 0b11) << 8) | (io.device as Word & 0x1F)
        }
        Instruction::Mlt(rr) | Instruction::Dvd(rr) | Instruction::Trr(rr)
        | Instruction::And(rr) | Instruction::Orr(rr) => {
            ((rr.rx as Word & 0b11) << 8) | ((rr.ry as Word & 0b11) << 6)
        }
        Instruction::Not { rx } => (*rx as Word & 0b11) << 8,
        other => other.mem_operand().map(MemOperand::encode).unwrap_or(0),
    };

    ((instr.opcode().bits() as Word) << OPCODE_SHIFT) | operand
}

impl fmt::Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.ix, self.address)?;
        if self.indirect {
            f.write_str(",I")?;
        }
        Ok(())
    }
}

fn write_ix_address(f: &mut fmt::Formatter<'_>, m: &MemOperand) -> fmt::Result {
    write!(f, "{},{}", m.ix, m.address)?;
    if m.indirect {
        f.write_str(",I")?;
    }
    Ok(())
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode().mnemonic();
        match self {
            Instruction::Hlt => f.write_str(op),
            Instruction::Jma(m) | Instruction::Jsr(m) | Instruction::Ldx(m) | Instruction::Stx(m) => {
                write!(f, "{} ", op)?;
                write_ix_address(f, m)
            }
            Instruction::Air { r, immediate } | Instruction::Sir { r, immediate } => {
                write!(f, "{} {},{}", op, r, immediate)
            }
            Instruction::Rfs { immediate } => write!(f, "{} {}", op, immediate),
            Instruction::Trap { code } => write!(f, "{} {}", op, code),
            Instruction::Src(s) | Instruction::Rrc(s) => {
                write!(f, "{} {},{},{},{}", op, s.r, s.count, s.left as u8, s.logical as u8)
            }
            Instruction::In(io) | Instruction::Out(io) | Instruction::Chk(io) => {
                write!(f, "{} {},{}", op, io.r, io.device)
            }
            Instruction::Mlt(rr) | Instruction::Dvd(rr) | Instruction::Trr(rr)
            | Instruction::And(rr) | Instruction::Orr(rr) => write!(f, "{} {},{}", op, rr.rx, rr.ry),
            Instruction::Not { rx } => write!(f, "{} {}", op, rx),
            other => match other.mem_operand() {
                Some(m) => write!(f, "{} {}", op, m),
                None => f.write_str(op),
            },
        }
    }
}
