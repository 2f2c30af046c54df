//! Memory subsystem.
//!
//! A linear array of 16-bit words (2048 by default) behind a 16-line
//! write-through cache. The first six words are reserved for the trap and
//! fault protocols and are only reachable in supervisor mode:
//!
//! | Address | Use                         |
//! |---------|-----------------------------|
//! | 0       | trap table pointer          |
//! | 1       | fault handler vector        |
//! | 2       | trap return PC              |
//! | 3       | reserved                    |
//! | 4       | fault return PC             |
//! | 5       | R0 saved on fault           |
//! | 6       | bootloader pointer / origin |

use log::debug;
use serde::{Serialize, Deserialize};
use crate::cpu::cache::{block_base, Cache, CacheStats, WORDS_PER_LINE};
use crate::cpu::fault::{MachineError, MachineFault};
use crate::word::{Address, Word};

/// Default number of words.
pub const DEFAULT_WORD_COUNT: usize = 2048;

/// Number of low words reserved for the supervisor.
pub const RESERVED_WORDS: usize = 6;

pub const TRAP_TABLE_POINTER: Address = Address::new(0);
pub const FAULT_VECTOR: Address = Address::new(1);
pub const TRAP_RETURN_SLOT: Address = Address::new(2);
pub const FAULT_RETURN_SLOT: Address = Address::new(4);
pub const FAULT_R0_SLOT: Address = Address::new(5);
pub const BOOT_POINTER: Address = Address::new(6);

/// Linear memory with cache and protection checks.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    word_count: usize,
    cells: Vec<Word>,
    cache: Cache,
}

impl Memory {
    /// Create a zeroed memory of `word_count` words.
    ///
    /// # Panics
    /// Panics if `word_count` does not fit the 12-bit address space.
    pub fn new(word_count: usize) -> Self {
        assert!(
            word_count <= Address::SPACE,
            "word count {} exceeds address space ({})",
            word_count,
            Address::SPACE
        );
        Self {
            word_count,
            cells: vec![0; word_count],
            cache: Cache::new(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Check an access to `address`.
    fn check(&self, address: Address, supervisor: bool) -> Result<usize, MachineFault> {
        let index = address.index();
        if index >= self.word_count {
            return Err(MachineFault::IllegalMemoryAddressBeyondLimit);
        }
        if index < RESERVED_WORDS && !supervisor {
            return Err(MachineFault::IllegalMemoryAddressToReservedLocations);
        }
        Ok(index)
    }

    /// Fetch a word through the cache.
    pub fn fetch(&mut self, address: Address, supervisor: bool) -> Result<Word, MachineFault> {
        let index = self.check(address, supervisor)?;
        if let Some(word) = self.cache.read(index) {
            return Ok(word);
        }

        let base = block_base(index);
        let mut block = [0; WORDS_PER_LINE];
        for (i, slot) in block.iter_mut().enumerate() {
            *slot = self.cells.get(base + i).copied().unwrap_or(0);
        }
        if let Some(evicted) = self.cache.fill(index, &block) {
            debug!("cache miss at {:04}, evicted tag {}", index, evicted);
        } else {
            debug!("cache miss at {:04}", index);
        }
        Ok(block[index - base])
    }

    /// Store a word, updating any cached copy.
    pub fn store(&mut self, address: Address, value: Word, supervisor: bool) -> Result<(), MachineFault> {
        let index = self.check(address, supervisor)?;
        self.cells[index] = value;
        self.cache.write(index, value);
        Ok(())
    }

    /// Fetch bypassing the reserved-region check.
    pub fn fetch_privileged(&mut self, address: Address) -> Result<Word, MachineFault> {
        self.fetch(address, true)
    }

    /// Store bypassing the reserved-region check.
    pub fn store_privileged(&mut self, address: Address, value: Word) -> Result<(), MachineFault> {
        self.store(address, value, true)
    }

    /// Read a cell directly, without cache or checks.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn read(&self, index: usize) -> Word {
        assert!(index < self.word_count, "memory address {} out of range (0-{})", index, self.word_count - 1);
        self.cells[index]
    }

    /// Write a cell directly, keeping the cache coherent.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn write(&mut self, index: usize, value: Word) {
        assert!(index < self.word_count, "memory address {} out of range (0-{})", index, self.word_count - 1);
        self.cells[index] = value;
        self.cache.write(index, value);
    }

    /// Bulk-load `program` at `origin`, bypassing protection.
    pub fn load_program(&mut self, origin: usize, program: &[Word]) -> Result<(), MachineError> {
        if origin > self.word_count || program.len() > self.word_count - origin {
            return Err(MachineError::ProgramTooLarge {
                origin,
                size: program.len(),
                available: self.word_count.saturating_sub(origin),
            });
        }

        for (i, &word) in program.iter().enumerate() {
            self.write(origin + i, word);
        }
        Ok(())
    }

    /// Zero every cell and empty the cache.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = 0);
        self.cache.clear();
    }

    /// Dump `count` cells from `start`.
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.word_count);
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_WORD_COUNT)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|cell| **cell != 0).count();
        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.word_count)
            .field("cache", &self.cache)
            .finish()
    }
}
