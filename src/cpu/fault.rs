//! Fault taxonomy.
//!
//! Two disjoint kinds of failure exist:
//! - [`MachineFault`]: part of the simulated architecture. Raised by a
//!   phase, latched in the Machine Fault Register and handled by the
//!   fault-dispatch protocol.
//! - [`MachineError`]: host-level failures the simulated machine cannot
//!   recover from (double faults, bad programs, bad configuration).

use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::word::{Address, BinaryParseError};

/// Architectural machine fault. The discriminant is the code copied into
/// R0 by the fault-dispatch protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[repr(u8)]
pub enum MachineFault {
    /// Access to the reserved low region outside supervisor mode.
    #[error("illegal memory address to reserved locations")]
    IllegalMemoryAddressToReservedLocations = 0,

    /// TRAP code outside the trap table.
    #[error("illegal trap code")]
    IllegalTrapCode = 1,

    /// Opcode not present in the instruction catalog.
    #[error("illegal operation code")]
    IllegalOperationCode = 2,

    /// Address at or beyond the configured word count.
    #[error("illegal memory address beyond limit")]
    IllegalMemoryAddressBeyondLimit = 3,
}

impl MachineFault {
    /// Every fault kind in code order.
    pub const ALL: [MachineFault; 4] = [
        MachineFault::IllegalMemoryAddressToReservedLocations,
        MachineFault::IllegalTrapCode,
        MachineFault::IllegalOperationCode,
        MachineFault::IllegalMemoryAddressBeyondLimit,
    ];

    /// Fault code as stored in R0 on dispatch.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`MachineFault::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Host-level errors raised by the engine or its loaders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("fault '{second}' raised at PC={pc} while handling fault {first:?}")]
    DoubleFault {
        first: Option<MachineFault>,
        second: MachineFault,
        pc: Address,
    },

    #[error("program of {size} words at origin {origin} exceeds memory ({available} words available)")]
    ProgramTooLarge {
        origin: usize,
        size: usize,
        available: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: BinaryParseError,
    },

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for fault in MachineFault::ALL {
            assert_eq!(MachineFault::from_code(fault.code()), Some(fault));
        }
        assert_eq!(MachineFault::from_code(4), None);
    }

    #[test]
    fn test_codes_match_dispatch_contract() {
        assert_eq!(MachineFault::IllegalMemoryAddressToReservedLocations.code(), 0);
        assert_eq!(MachineFault::IllegalTrapCode.code(), 1);
        assert_eq!(MachineFault::IllegalOperationCode.code(), 2);
        assert_eq!(MachineFault::IllegalMemoryAddressBeyondLimit.code(), 3);
    }
}
