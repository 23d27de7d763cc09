//! Per-channel parameter store (bias, multiplier or shift).
//!
//! Append-only during batch configuration; reads cycle `0..count` so each
//! pixel of a batch sees the same sequence of channel parameters.

use crate::error::SequencingFault;

/// Fixed-capacity parameter FIFO with a wrapping read cursor.
#[derive(Debug, Clone)]
pub struct ParamStore {
    name: &'static str,
    params: Vec<i32>,
    capacity: usize,
    read_index: usize,
}

impl ParamStore {
    /// Empty store holding at most `capacity` entries.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            params: Vec::with_capacity(capacity),
            capacity,
            read_index: 0,
        }
    }

    /// Forget all entries and rewind the read cursor.
    pub fn restart(&mut self) {
        self.params.clear();
        self.read_index = 0;
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// `ParamOverflow` when the store is full; the value is dropped.
    pub fn push(&mut self, value: i32) -> Result<(), SequencingFault> {
        if self.params.len() == self.capacity {
            return Err(SequencingFault::ParamOverflow {
                store: self.name,
                capacity: self.capacity,
            });
        }
        self.params.push(value);
        Ok(())
    }

    /// Consume the entry under the read cursor, wrapping after the last one.
    ///
    /// # Errors
    ///
    /// `ParamEmpty` when nothing has been stored since the last restart.
    pub fn read(&mut self) -> Result<i32, SequencingFault> {
        let Some(&value) = self.params.get(self.read_index) else {
            return Err(SequencingFault::ParamEmpty { store: self.name });
        };
        self.read_index += 1;
        if self.read_index == self.params.len() {
            self.read_index = 0;
        }
        Ok(value)
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.params.len()
    }

    /// Current read cursor.
    pub fn read_index(&self) -> usize {
        self.read_index
    }
}
