//! Bank-interleaved filter store.
//!
//! Words are written round-robin across the banks, then down the rows:
//!
//! ```text
//!            bank 0   bank 1   bank 2   bank 3
//! offset 0   w0       w1       w2       w3
//! offset 1   w4       w5       w6       w7
//! ...
//! ```
//!
//! Reads walk the same layout. The read cursor wraps at the filter size of
//! the current batch (`batch_size × input_depth_words`), so every pixel of the
//! batch replays the same filter sequence.

use crate::error::SequencingFault;
use cfu_chip::geometry::bank_address;

/// Filter memory with linear write and read cursors over `(bank, offset)`.
#[derive(Debug, Clone)]
pub struct FilterStore {
    banks: Vec<Vec<u32>>,
    bank_words: usize,
    write_pos: usize,
    read_pos: usize,
}

impl FilterStore {
    /// Zeroed store of `banks × bank_words` words.
    pub fn new(banks: usize, bank_words: usize) -> Self {
        Self {
            banks: vec![vec![0; bank_words]; banks],
            bank_words,
            write_pos: 0,
            read_pos: 0,
        }
    }

    /// Rewind both cursors for a new batch. Contents are left in place.
    pub fn restart(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Total capacity in words.
    pub fn capacity(&self) -> usize {
        self.banks.len() * self.bank_words
    }

    /// Words written since the last restart.
    pub fn written(&self) -> usize {
        self.write_pos
    }

    /// Linear read position.
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Physical location of linear word `index`.
    pub fn address(&self, index: usize) -> (usize, usize) {
        bank_address(index, self.banks.len())
    }

    /// Word at a physical location, for layout inspection.
    pub fn word_at(&self, bank: usize, offset: usize) -> Option<u32> {
        self.banks.get(bank)?.get(offset).copied()
    }

    /// Append one word at the write cursor.
    ///
    /// # Errors
    ///
    /// `FilterOverflow` when every bank is full; the word is dropped.
    pub fn push(&mut self, word: u32) -> Result<(), SequencingFault> {
        if self.write_pos >= self.capacity() {
            return Err(SequencingFault::FilterOverflow { capacity: self.capacity() });
        }
        let (bank, offset) = self.address(self.write_pos);
        self.banks[bank][offset] = word;
        self.write_pos += 1;
        Ok(())
    }

    /// Read the word under the read cursor, wrapping after `wrap_words`.
    ///
    /// A `wrap_words` of zero, or one beyond what was written, falls back to
    /// wrapping at the write cursor.
    ///
    /// # Errors
    ///
    /// `FilterReadPastWrite` when the cursor is not behind the write cursor.
    pub fn read(&mut self, wrap_words: usize) -> Result<u32, SequencingFault> {
        if self.read_pos >= self.write_pos {
            return Err(SequencingFault::FilterReadPastWrite {
                read: self.read_pos,
                written: self.write_pos,
            });
        }
        let (bank, offset) = self.address(self.read_pos);
        let word = self.banks[bank][offset];
        let wrap = if wrap_words == 0 || wrap_words > self.write_pos {
            self.write_pos
        } else {
            wrap_words
        };
        self.read_pos += 1;
        if self.read_pos >= wrap {
            self.read_pos = 0;
        }
        Ok(word)
    }
}
