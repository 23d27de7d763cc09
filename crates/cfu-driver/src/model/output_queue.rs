//! Circular FIFO of packed result words.

use crate::error::SequencingFault;

/// Fixed-capacity ring buffer. Never blocks; overflow and underflow are faults.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    data: Vec<u32>,
    read: usize,
    write: usize,
    len: usize,
}

impl OutputQueue {
    /// Empty queue of `capacity` words.
    pub fn new(capacity: usize) -> Self {
        Self { data: vec![0; capacity], read: 0, write: 0, len: 0 }
    }

    /// Drop all queued words.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }

    /// Words waiting to be drained.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Enqueue one word.
    ///
    /// # Errors
    ///
    /// `OutputOverflow` when full; the word is dropped.
    pub fn push(&mut self, word: u32) -> Result<(), SequencingFault> {
        if self.len == self.data.len() {
            return Err(SequencingFault::OutputOverflow { capacity: self.data.len() });
        }
        self.data[self.write] = word;
        self.write = (self.write + 1) % self.data.len();
        self.len += 1;
        Ok(())
    }

    /// Dequeue the oldest word.
    ///
    /// # Errors
    ///
    /// `OutputUnderflow` when empty.
    pub fn pop(&mut self) -> Result<u32, SequencingFault> {
        if self.len == 0 {
            return Err(SequencingFault::OutputUnderflow);
        }
        let word = self.data[self.read];
        self.read = (self.read + 1) % self.data.len();
        self.len -= 1;
        Ok(word)
    }
}
