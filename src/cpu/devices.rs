//! Device I/O buffers.
//!
//! Each device id owns a FIFO of words. The engine consumes on `IN`/`CHK`
//! and produces on `OUT`; the host does the opposite.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};
use crate::word::Word;

/// Device ids are five bits wide.
pub const DEVICE_COUNT: usize = 32;

pub const KEYBOARD: u8 = 0;
pub const PRINTER: u8 = 1;
pub const CARD_READER: u8 = 2;

/// FIFOs for every device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBuffers {
    queues: Vec<VecDeque<Word>>,
}

impl DeviceBuffers {
    pub fn new() -> Self {
        Self {
            queues: vec![VecDeque::new(); DEVICE_COUNT],
        }
    }

    fn queue(&self, device: u8) -> &VecDeque<Word> {
        assert!((device as usize) < DEVICE_COUNT, "invalid device id {}", device);
        &self.queues[device as usize]
    }

    fn queue_mut(&mut self, device: u8) -> &mut VecDeque<Word> {
        assert!((device as usize) < DEVICE_COUNT, "invalid device id {}", device);
        &mut self.queues[device as usize]
    }

    /// Append a word to `device`.
    ///
    /// # Panics
    /// Panics if `device` is not a 5-bit id.
    pub fn push(&mut self, device: u8, word: Word) {
        self.queue_mut(device).push_back(word);
    }

    /// Remove the oldest word from `device`.
    pub fn pop(&mut self, device: u8) -> Option<Word> {
        self.queue_mut(device).pop_front()
    }

    pub fn is_empty(&self, device: u8) -> bool {
        self.queue(device).is_empty()
    }

    /// Number of words queued on `device`.
    pub fn size(&self, device: u8) -> usize {
        self.queue(device).len()
    }

    /// Take every queued word from `device`.
    pub fn drain(&mut self, device: u8) -> Vec<Word> {
        self.queue_mut(device).drain(..).collect()
    }

    /// Empty every buffer.
    pub fn clear(&mut self) {
        self.queues.iter_mut().for_each(VecDeque::clear);
    }
}

impl Default for DeviceBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut devices = DeviceBuffers::new();
        devices.push(KEYBOARD, 1);
        devices.push(KEYBOARD, 2);
        assert_eq!(devices.size(KEYBOARD), 2);
        assert_eq!(devices.pop(KEYBOARD), Some(1));
        assert_eq!(devices.pop(KEYBOARD), Some(2));
        assert_eq!(devices.pop(KEYBOARD), None);
        assert!(devices.is_empty(KEYBOARD));
    }

    #[test]
    fn test_devices_are_independent() {
        let mut devices = DeviceBuffers::new();
        devices.push(PRINTER, b'H' as Word);
        devices.push(31, 9);
        assert!(devices.is_empty(CARD_READER));
        assert_eq!(devices.drain(PRINTER), vec![b'H' as Word]);
        assert_eq!(devices.size(31), 1);
    }

    #[test]
    #[should_panic(expected = "invalid device id 32")]
    fn test_invalid_device_panics() {
        DeviceBuffers::new().push(32, 0);
    }
}
