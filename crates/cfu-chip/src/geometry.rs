//! On-chip memory geometry.
//!
//! Every store is built from 16 Kbit EBRAMs:
//!
//! ```text
//! Store          EBRAMs  Layout                        Capacity
//! ─────────────  ──────  ────────────────────────────  ──────────────
//! Filter         4       4 banks × 512 words           2048 words
//! Input          4       2 buffers × 1024 words        1024 words/side
//! Param (×3)     1 each  512 × i32                     512 channels
//! Output queue   1       512 words, circular           512 words
//! ```
//!
//! Words are 32 bits and carry four int8 lanes.

/// Bits per EBRAM.
pub const EBRAM_DEPTH_BITS: usize = 16 * 1024;
/// Bytes per EBRAM.
pub const EBRAM_DEPTH_BYTES: usize = EBRAM_DEPTH_BITS / 8;
/// 32-bit words per EBRAM.
pub const EBRAM_DEPTH_WORDS: usize = EBRAM_DEPTH_BYTES / 4;

/// int8 lanes per word; also the MACC width.
pub const LANES: usize = 4;

/// Filter store bank count (round-robin interleaved).
pub const NUM_FILTER_BANKS: usize = 4;
/// Words per filter bank.
pub const FILTER_BANK_WORDS: usize = EBRAM_DEPTH_WORDS;
/// Total filter store capacity in words.
pub const FILTER_CAPACITY_WORDS: usize = NUM_FILTER_BANKS * FILTER_BANK_WORDS;

/// EBRAMs behind the input store.
pub const NUM_INPUT_EBRAMS: usize = 4;
/// Words per side of the input double buffer.
pub const INPUT_BUFFER_WORDS: usize = NUM_INPUT_EBRAMS * EBRAM_DEPTH_WORDS / 2;

/// Entries per param store (bias, multiplier, shift).
pub const PARAM_CAPACITY: usize = EBRAM_DEPTH_WORDS;
/// Words in the output queue.
pub const OUTPUT_QUEUE_WORDS: usize = EBRAM_DEPTH_WORDS;

/// Split a linear word index into `(bank, offset)` for a store interleaved
/// across `banks` banks.
#[must_use]
pub const fn bank_address(index: usize, banks: usize) -> (usize, usize) {
    (index % banks, index / banks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_capacities() {
        assert_eq!(EBRAM_DEPTH_WORDS, 512);
        assert_eq!(FILTER_CAPACITY_WORDS, 2048);
        assert_eq!(INPUT_BUFFER_WORDS, 1024);
        assert_eq!(PARAM_CAPACITY, 512);
    }

    #[test]
    fn bank_address_round_robin() {
        assert_eq!(bank_address(0, 4), (0, 0));
        assert_eq!(bank_address(3, 4), (3, 0));
        assert_eq!(bank_address(4, 4), (0, 1));
        assert_eq!(bank_address(9, 4), (1, 2));
    }
}
