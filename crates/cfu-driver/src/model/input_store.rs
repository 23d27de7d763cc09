//! Double-buffered input store.
//!
//! The writer fills one buffer while the MACC pipeline reads the other.
//! Each buffer is in exactly one state at a time:
//!
//! ```text
//!            fill completes
//!  Writable ───────────────► Readable
//!     ▲                         │
//!     └─────────────────────────┘
//!        mark_read_finished
//! ```
//!
//! A write to a `Readable` buffer or a read from a `Writable` one is a
//! sequencing fault: in the gateware it would be a stall.

use crate::error::SequencingFault;

/// Access state of one side of the double buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Owned by the writer; may be filled
    Writable,
    /// Full; owned by the reader until marked finished
    Readable,
}

/// Two buffers of one pixel's activations each.
#[derive(Debug, Clone)]
pub struct InputStore {
    buffers: [Vec<u32>; 2],
    state: [BufferState; 2],
    capacity: usize,
    depth_words: usize,
    curr_write: usize,
    curr_read: usize,
    write_addr: usize,
    read_addr: usize,
}

impl InputStore {
    /// Two zeroed buffers of `capacity` words, both writable.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: [vec![0; capacity], vec![0; capacity]],
            state: [BufferState::Writable; 2],
            capacity,
            depth_words: 0,
            curr_write: 0,
            curr_read: 0,
            write_addr: 0,
            read_addr: 0,
        }
    }

    /// Reset both buffers to writable and set the per-pixel depth.
    ///
    /// # Errors
    ///
    /// `InputDepthTooLarge` when `depth_words` exceeds one buffer side; the
    /// depth is clamped to the side capacity.
    pub fn restart(&mut self, depth_words: usize) -> Result<(), SequencingFault> {
        self.state = [BufferState::Writable; 2];
        self.curr_write = 0;
        self.curr_read = 0;
        self.write_addr = 0;
        self.read_addr = 0;
        if depth_words > self.capacity {
            self.depth_words = self.capacity;
            return Err(SequencingFault::InputDepthTooLarge {
                words: depth_words,
                capacity: self.capacity,
            });
        }
        self.depth_words = depth_words;
        Ok(())
    }

    /// Words per pixel.
    pub fn depth_words(&self) -> usize {
        self.depth_words
    }

    /// State of buffer `index` (0 or 1).
    pub fn state(&self, index: usize) -> BufferState {
        self.state[index]
    }

    /// Buffer the next write goes to.
    pub fn write_buffer(&self) -> usize {
        self.curr_write
    }

    /// Buffer the next read comes from.
    pub fn read_buffer(&self) -> usize {
        self.curr_read
    }

    /// Whether the current read buffer holds a complete pixel.
    pub fn readable(&self) -> bool {
        self.state[self.curr_read] == BufferState::Readable
    }

    /// Write one word into the current write buffer.
    ///
    /// Returns `true` when this write completed the buffer, which then turns
    /// readable and hands the writer over to the other side.
    ///
    /// # Errors
    ///
    /// `InputDepthUnset` before a depth is configured; `InputWriteRefused`
    /// when the write buffer still awaits its reader. The word is dropped.
    pub fn write(&mut self, word: u32) -> Result<bool, SequencingFault> {
        if self.depth_words == 0 {
            return Err(SequencingFault::InputDepthUnset);
        }
        let buffer = self.curr_write;
        if self.state[buffer] != BufferState::Writable {
            return Err(SequencingFault::InputWriteRefused { buffer });
        }
        self.buffers[buffer][self.write_addr] = word;
        self.write_addr += 1;
        if self.write_addr == self.depth_words {
            self.write_addr = 0;
            self.state[buffer] = BufferState::Readable;
            self.curr_write = 1 - buffer;
            return Ok(true);
        }
        Ok(false)
    }

    /// Read the next word of the current read buffer, wrapping at the depth.
    ///
    /// # Errors
    ///
    /// `InputDepthUnset` before a depth is configured; `InputReadRefused`
    /// when the read buffer has not been filled.
    pub fn read(&mut self) -> Result<u32, SequencingFault> {
        if self.depth_words == 0 {
            return Err(SequencingFault::InputDepthUnset);
        }
        let buffer = self.curr_read;
        if self.state[buffer] != BufferState::Readable {
            return Err(SequencingFault::InputReadRefused { buffer });
        }
        let word = self.buffers[buffer][self.read_addr];
        self.read_addr += 1;
        if self.read_addr == self.depth_words {
            self.read_addr = 0;
        }
        Ok(word)
    }

    /// Return the current read buffer to the writer and switch sides.
    ///
    /// # Errors
    ///
    /// `InputReadRefused` when the read buffer was never filled; nothing changes.
    pub fn mark_read_finished(&mut self) -> Result<(), SequencingFault> {
        let buffer = self.curr_read;
        if self.state[buffer] != BufferState::Readable {
            return Err(SequencingFault::InputReadRefused { buffer });
        }
        self.read_addr = 0;
        self.state[buffer] = BufferState::Writable;
        self.curr_read = 1 - buffer;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(depth: usize) -> InputStore {
        let mut is = InputStore::new(8);
        is.restart(depth).unwrap();
        is
    }

    #[test]
    fn fill_flips_to_readable() {
        let mut is = store(2);
        assert!(!is.write(1).unwrap());
        assert!(is.write(2).unwrap());
        assert_eq!(is.state(0), BufferState::Readable);
        assert_eq!(is.state(1), BufferState::Writable);
        assert_eq!(is.write_buffer(), 1);
        assert!(is.readable());
    }

    #[test]
    fn reader_and_writer_ping_pong() {
        let mut is = store(2);
        for w in [1, 2, 3, 4] {
            is.write(w).unwrap();
        }
        assert_eq!(is.read().unwrap(), 1);
        assert_eq!(is.read().unwrap(), 2);
        // wraps within the pixel
        assert_eq!(is.read().unwrap(), 1);
        is.mark_read_finished().unwrap();
        assert_eq!(is.state(0), BufferState::Writable);
        assert_eq!(is.read_buffer(), 1);
        assert_eq!(is.read().unwrap(), 3);
        // buffer 0 free again for the third pixel
        is.write(5).unwrap();
        assert!(is.write(6).unwrap());
    }

    #[test]
    fn write_to_readable_buffer_refused() {
        let mut is = store(1);
        is.write(1).unwrap();
        is.write(2).unwrap();
        // both sides full, writer is back at buffer 0
        assert_eq!(is.write(3), Err(SequencingFault::InputWriteRefused { buffer: 0 }));
        assert_eq!(is.read().unwrap(), 1);
    }

    #[test]
    fn read_from_writable_buffer_refused() {
        let mut is = store(2);
        is.write(1).unwrap();
        assert_eq!(is.read(), Err(SequencingFault::InputReadRefused { buffer: 0 }));
        assert_eq!(is.mark_read_finished(), Err(SequencingFault::InputReadRefused { buffer: 0 }));
    }

    #[test]
    fn depth_larger_than_side_is_clamped() {
        let mut is = InputStore::new(4);
        assert_eq!(
            is.restart(5),
            Err(SequencingFault::InputDepthTooLarge { words: 5, capacity: 4 })
        );
        assert_eq!(is.depth_words(), 4);
    }

    #[test]
    fn unset_depth_refuses_access() {
        let mut is = InputStore::new(4);
        assert_eq!(is.write(1), Err(SequencingFault::InputDepthUnset));
        assert_eq!(is.read(), Err(SequencingFault::InputDepthUnset));
    }
}
