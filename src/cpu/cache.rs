//! Fully-associative cache in front of linear memory.
//!
//! 16 lines of 4 words each. An address splits into
//!
//! ```text
//! | tag (10 bits) | offset (2 bits) |
//! ```
//!
//! Lookup scans every line for a valid line with a matching tag. A read
//! miss loads the whole aligned block; when the cache is full the oldest
//! line (insertion order) is evicted. Writes are write-through: a present
//! line is updated in place and memory is always written, so no line is
//! ever dirty.

use std::collections::VecDeque;
use std::fmt;
use serde::{Serialize, Deserialize};
use crate::word::{to_binary_string, Word};

/// Number of lines.
pub const CACHE_LINES: usize = 16;

/// Words per line.
pub const WORDS_PER_LINE: usize = 4;

const OFFSET_BITS: u32 = 2;
const OFFSET_MASK: usize = WORDS_PER_LINE - 1;

/// Tag of the line holding `address`.
#[inline]
pub fn tag_of(address: usize) -> u16 {
    (address >> OFFSET_BITS) as u16
}

/// Word offset of `address` within its line.
#[inline]
pub fn offset_of(address: usize) -> usize {
    address & OFFSET_MASK
}

/// First address of the block holding `address`.
#[inline]
pub fn block_base(address: usize) -> usize {
    address & !OFFSET_MASK
}

// ============================================================================
// Cache Line
// ============================================================================

/// One cache line: tag, valid bit and four words.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLine {
    tag: u16,
    valid: bool,
    words: [Word; WORDS_PER_LINE],
}

impl CacheLine {
    /// Build a valid line from exactly four words.
    ///
    /// # Panics
    /// Panics if `words` does not hold exactly four words.
    pub fn new(tag: u16, words: &[Word]) -> Self {
        assert!(
            words.len() == WORDS_PER_LINE,
            "cache line needs {} words, got {}",
            WORDS_PER_LINE,
            words.len()
        );
        let mut line = [0; WORDS_PER_LINE];
        line.copy_from_slice(words);
        Self { tag, valid: true, words: line }
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the line invalid; it will never match again.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// True if the line is valid and holds `tag`.
    pub fn matches(&self, tag: u16) -> bool {
        self.valid && self.tag == tag
    }

    /// Read the word at `offset`.
    ///
    /// # Panics
    /// Panics if `offset >= 4`.
    pub fn word(&self, offset: usize) -> Word {
        assert!(offset < WORDS_PER_LINE, "cache line offset {} out of range", offset);
        self.words[offset]
    }

    /// Overwrite the word at `offset`.
    ///
    /// # Panics
    /// Panics if `offset >= 4`.
    pub fn set_word(&mut self, offset: usize, value: Word) {
        assert!(offset < WORDS_PER_LINE, "cache line offset {} out of range", offset);
        self.words[offset] = value;
    }

    pub fn words(&self) -> &[Word; WORDS_PER_LINE] {
        &self.words
    }
}

impl fmt::Debug for CacheLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}tag={:04}", if self.valid { 'V' } else { '-' }, self.tag)?;
        for w in &self.words {
            write!(f, " {}", to_binary_string(*w))?;
        }
        Ok(())
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Hit/miss counters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of reads that missed.
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.misses as f64 / total as f64 }
    }
}

/// The cache. Lines are kept in insertion order; the front is the oldest.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cache {
    lines: VecDeque<CacheLine>,
    capacity: usize,
    stats: CacheStats,
}

impl Cache {
    /// A cache with the architectural 16 lines.
    pub fn new() -> Self {
        Self::with_capacity(CACHE_LINES)
    }

    /// A cache with `capacity` lines.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "cache needs at least one line");
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            stats: CacheStats::default(),
        }
    }

    fn position(&self, tag: u16) -> Option<usize> {
        self.lines.iter().position(|line| line.matches(tag))
    }

    /// True if a valid line holds `address`. Does not touch the counters.
    pub fn contains(&self, address: usize) -> bool {
        self.position(tag_of(address)).is_some()
    }

    /// Read `address` if its line is present, recording a hit or a miss.
    pub fn read(&mut self, address: usize) -> Option<Word> {
        match self.position(tag_of(address)) {
            Some(i) => {
                self.stats.hits += 1;
                Some(self.lines[i].word(offset_of(address)))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert the block holding `address`, evicting the oldest line when
    /// full. Returns the evicted tag.
    pub fn fill(&mut self, address: usize, block: &[Word]) -> Option<u16> {
        let tag = tag_of(address);
        if let Some(i) = self.position(tag) {
            self.lines.remove(i);
        }

        // Invalid lines are dropped first so they never hold a slot.
        self.lines.retain(CacheLine::is_valid);

        let mut evicted = None;
        if self.lines.len() >= self.capacity {
            evicted = self.lines.pop_front().map(|line| line.tag());
            self.stats.evictions += 1;
        }

        self.lines.push_back(CacheLine::new(tag, block));
        evicted
    }

    /// Write-through update. Returns true if a line was updated.
    pub fn write(&mut self, address: usize, value: Word) -> bool {
        match self.position(tag_of(address)) {
            Some(i) => {
                self.lines[i].set_word(offset_of(address), value);
                true
            }
            None => false,
        }
    }

    /// Invalidate every line.
    pub fn invalidate_all(&mut self) {
        for line in self.lines.iter_mut() {
            line.invalidate();
        }
    }

    /// Drop every line and reset the counters.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.stats = CacheStats::default();
    }

    /// Lines from oldest to newest.
    pub fn lines(&self) -> impl Iterator<Item = &CacheLine> {
        self.lines.iter()
    }

    /// Number of lines currently held.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("lines", &self.lines.len())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(seed: Word) -> [Word; 4] {
        [seed, seed + 1, seed + 2, seed + 3]
    }

    #[test]
    fn test_address_split() {
        assert_eq!(tag_of(0x3FF), 0xFF);
        assert_eq!(offset_of(0x3FF), 3);
        assert_eq!(block_base(13), 12);
        assert_eq!(tag_of(4095), 1023);
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache = Cache::new();
        assert_eq!(cache.read(41), None);
        cache.fill(41, &block(100));
        assert_eq!(cache.read(41), Some(101));
        assert_eq!(cache.read(43), Some(103));
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1, evictions: 0 });
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = Cache::new();
        for tag in 0..CACHE_LINES {
            assert_eq!(cache.fill(tag * 4, &block(tag as Word)), None);
        }
        // touching the oldest line does not protect it
        assert!(cache.read(0).is_some());
        assert_eq!(cache.fill(16 * 4, &block(16)), Some(0));
        assert!(!cache.contains(0));
        assert!(cache.contains(4));
        assert_eq!(cache.len(), CACHE_LINES);
    }

    #[test]
    fn test_write_through_updates_present_line_only() {
        let mut cache = Cache::new();
        cache.fill(8, &block(0));
        assert!(cache.write(10, 77));
        assert_eq!(cache.read(10), Some(77));
        assert!(!cache.write(100, 5));
        assert!(!cache.contains(100));
    }

    #[test]
    fn test_invalid_lines_never_match() {
        let mut cache = Cache::new();
        cache.fill(8, &block(0));
        cache.invalidate_all();
        assert_eq!(cache.read(8), None);
        assert!(!cache.write(8, 1));
    }

    #[test]
    #[should_panic(expected = "cache line needs 4 words")]
    fn test_malformed_line_panics() {
        CacheLine::new(0, &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "offset 4 out of range")]
    fn test_line_offset_out_of_range_panics() {
        CacheLine::new(0, &[1, 2, 3, 4]).word(4);
    }
}
