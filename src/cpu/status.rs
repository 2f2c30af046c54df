//! Condition code, machine status and machine fault registers.
//!
//! All three are small bit-packed flag sets. Diagnostics render each as
//! the low nibble of its binary value.

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::cpu::fault::MachineFault;

fn nibble_string(bits: u8) -> String {
    format!("{:04b}", bits & 0x0F)
}

// ============================================================================
// Condition Code
// ============================================================================

/// Condition code flags set by every ALU and FPU operation.
///
/// Bit layout (low nibble in `cc(0)..cc(3)` order, most significant first):
/// overflow, underflow, divide-by-zero, equal. Greater-than lives above the
/// nibble. "Less-than" is never stored; see [`ConditionCode::less_than`].
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConditionCode {
    bits: u8,
}

impl ConditionCode {
    const OVERFLOW: u8 = 0b0_1000;
    const UNDERFLOW: u8 = 0b0_0100;
    const DIVIDE_BY_ZERO: u8 = 0b0_0010;
    const EQUAL: u8 = 0b0_0001;
    const GREATER_THAN: u8 = 0b1_0000;

    /// All flags clear.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Raw bits.
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Clear every flag.
    pub fn clear(&mut self) {
        self.bits = 0;
    }

    fn get(&self, mask: u8) -> bool {
        self.bits & mask != 0
    }

    fn put(&mut self, mask: u8, value: bool) {
        if value {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    pub fn overflow(&self) -> bool {
        self.get(Self::OVERFLOW)
    }

    pub fn set_overflow(&mut self, value: bool) {
        self.put(Self::OVERFLOW, value);
    }

    pub fn underflow(&self) -> bool {
        self.get(Self::UNDERFLOW)
    }

    pub fn set_underflow(&mut self, value: bool) {
        self.put(Self::UNDERFLOW, value);
    }

    pub fn divide_by_zero(&self) -> bool {
        self.get(Self::DIVIDE_BY_ZERO)
    }

    pub fn set_divide_by_zero(&mut self, value: bool) {
        self.put(Self::DIVIDE_BY_ZERO, value);
    }

    pub fn equal(&self) -> bool {
        self.get(Self::EQUAL)
    }

    pub fn set_equal(&mut self, value: bool) {
        self.put(Self::EQUAL, value);
    }

    pub fn greater_than(&self) -> bool {
        self.get(Self::GREATER_THAN)
    }

    pub fn set_greater_than(&mut self, value: bool) {
        self.put(Self::GREATER_THAN, value);
    }

    /// Derived flag: neither equal nor greater-than.
    pub fn less_than(&self) -> bool {
        !self.equal() && !self.greater_than()
    }

    /// Flag selected by a `JCC` condition field:
    /// 0 = overflow, 1 = underflow, 2 = divide-by-zero, 3 = equal.
    ///
    /// # Panics
    /// Panics if `selector > 3`; the field is two bits wide.
    pub fn select(&self, selector: u8) -> bool {
        match selector {
            0 => self.overflow(),
            1 => self.underflow(),
            2 => self.divide_by_zero(),
            3 => self.equal(),
            _ => panic!("invalid condition code selector {}", selector),
        }
    }

    /// Low nibble as four binary digits.
    pub fn to_nibble_string(&self) -> String {
        nibble_string(self.bits)
    }
}

impl fmt::Debug for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CC[{}{}{}{}{}]",
            if self.overflow() { 'O' } else { '-' },
            if self.underflow() { 'U' } else { '-' },
            if self.divide_by_zero() { 'Z' } else { '-' },
            if self.equal() { 'E' } else { '-' },
            if self.greater_than() { 'G' } else { '-' },
        )
    }
}

// ============================================================================
// Machine Status
// ============================================================================

/// Machine status flags owned by the control unit.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    bits: u8,
}

impl MachineStatus {
    const SUPERVISOR: u8 = 0b0000_1000;
    const EXECUTING_FAULT_HANDLER: u8 = 0b0000_0100;
    const SUPERVISOR_FAULT: u8 = 0b0000_0010;
    const READY_FOR_INPUT: u8 = 0b0000_0001;
    const WAITING_FOR_CARD: u8 = 0b0001_0000;
    const RUNNING: u8 = 0b0010_0000;
    const INTERACTIVE: u8 = 0b0100_0000;
    const DEBUGGING: u8 = 0b1000_0000;

    /// All flags clear.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Raw bits.
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    fn get(&self, mask: u8) -> bool {
        self.bits & mask != 0
    }

    fn put(&mut self, mask: u8, value: bool) {
        if value {
            self.bits |= mask;
        } else {
            self.bits &= !mask;
        }
    }

    /// Privileged mode; permits access to the reserved low memory.
    pub fn supervisor(&self) -> bool {
        self.get(Self::SUPERVISOR)
    }

    pub fn set_supervisor(&mut self, value: bool) {
        self.put(Self::SUPERVISOR, value);
    }

    pub fn executing_fault_handler(&self) -> bool {
        self.get(Self::EXECUTING_FAULT_HANDLER)
    }

    pub fn set_executing_fault_handler(&mut self, value: bool) {
        self.put(Self::EXECUTING_FAULT_HANDLER, value);
    }

    /// A fault arrived while the machine was already in supervisor mode.
    pub fn supervisor_fault(&self) -> bool {
        self.get(Self::SUPERVISOR_FAULT)
    }

    pub fn set_supervisor_fault(&mut self, value: bool) {
        self.put(Self::SUPERVISOR_FAULT, value);
    }

    pub fn ready_for_input(&self) -> bool {
        self.get(Self::READY_FOR_INPUT)
    }

    pub fn set_ready_for_input(&mut self, value: bool) {
        self.put(Self::READY_FOR_INPUT, value);
    }

    pub fn waiting_for_card(&self) -> bool {
        self.get(Self::WAITING_FOR_CARD)
    }

    pub fn set_waiting_for_card(&mut self, value: bool) {
        self.put(Self::WAITING_FOR_CARD, value);
    }

    pub fn running(&self) -> bool {
        self.get(Self::RUNNING)
    }

    pub fn set_running(&mut self, value: bool) {
        self.put(Self::RUNNING, value);
    }

    /// A debugger or UI is attached; fatal conditions stop the loop
    /// instead of ending the host process.
    pub fn interactive(&self) -> bool {
        self.get(Self::INTERACTIVE)
    }

    pub fn set_interactive(&mut self, value: bool) {
        self.put(Self::INTERACTIVE, value);
    }

    /// Dump registers after every completed instruction.
    pub fn debugging(&self) -> bool {
        self.get(Self::DEBUGGING)
    }

    pub fn set_debugging(&mut self, value: bool) {
        self.put(Self::DEBUGGING, value);
    }

    /// Either device wait flag is set.
    pub fn waiting(&self) -> bool {
        self.ready_for_input() || self.waiting_for_card()
    }

    /// Low nibble: supervisor, fault handler, supervisor fault, ready for input.
    pub fn to_nibble_string(&self) -> String {
        nibble_string(self.bits)
    }
}

impl fmt::Debug for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineStatus")
            .field("supervisor", &self.supervisor())
            .field("executing_fault_handler", &self.executing_fault_handler())
            .field("supervisor_fault", &self.supervisor_fault())
            .field("ready_for_input", &self.ready_for_input())
            .field("waiting_for_card", &self.waiting_for_card())
            .field("running", &self.running())
            .field("interactive", &self.interactive())
            .field("debugging", &self.debugging())
            .finish()
    }
}

// ============================================================================
// Machine Fault Register
// ============================================================================

/// One flag per machine fault kind. The nibble reads in fault-code order,
/// so code 0 is the leftmost digit.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineFaultRegister {
    bits: u8,
}

impl MachineFaultRegister {
    /// No fault latched.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Raw bits.
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    fn mask(fault: MachineFault) -> u8 {
        0b1000 >> fault.code()
    }

    /// Clear every flag.
    pub fn clear(&mut self) {
        self.bits = 0;
    }

    /// Latch exactly one fault kind, clearing any other.
    pub fn latch(&mut self, fault: MachineFault) {
        self.bits = Self::mask(fault);
    }

    pub fn is_set(&self, fault: MachineFault) -> bool {
        self.bits & Self::mask(fault) != 0
    }

    /// The latched fault, if any.
    pub fn current(&self) -> Option<MachineFault> {
        MachineFault::ALL.into_iter().find(|f| self.is_set(*f))
    }

    pub fn to_nibble_string(&self) -> String {
        nibble_string(self.bits)
    }
}

impl fmt::Debug for MachineFaultRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MFR[{}] {:?}", self.to_nibble_string(), self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_less_than_is_derived() {
        let mut cc = ConditionCode::new();
        assert!(cc.less_than());
        cc.set_equal(true);
        assert!(!cc.less_than());
        cc.set_equal(false);
        cc.set_greater_than(true);
        assert!(!cc.less_than());
    }

    #[test]
    fn test_condition_nibble() {
        let mut cc = ConditionCode::new();
        cc.set_overflow(true);
        cc.set_equal(true);
        cc.set_greater_than(true);
        assert_eq!(cc.to_nibble_string(), "1001");
        assert!(cc.select(0));
        assert!(!cc.select(1));
        assert!(cc.select(3));
    }

    #[test]
    fn test_status_flags_independent() {
        let mut msr = MachineStatus::new();
        msr.set_supervisor(true);
        msr.set_running(true);
        msr.set_debugging(true);
        assert!(msr.supervisor());
        assert!(msr.running());
        assert!(!msr.interactive());
        assert_eq!(msr.to_nibble_string(), "1000");

        msr.set_supervisor(false);
        assert!(!msr.supervisor());
        assert!(msr.running());
        assert!(msr.debugging());
    }

    #[test]
    fn test_fault_register_latches_one_kind() {
        let mut mfr = MachineFaultRegister::new();
        mfr.latch(MachineFault::IllegalTrapCode);
        mfr.latch(MachineFault::IllegalOperationCode);
        assert_eq!(mfr.current(), Some(MachineFault::IllegalOperationCode));
        assert!(!mfr.is_set(MachineFault::IllegalTrapCode));
        assert_eq!(mfr.to_nibble_string(), "0010");
        mfr.clear();
        assert_eq!(mfr.current(), None);
    }
}
