//! Error types for CFU driver operations

use thiserror::Error;

/// Result type alias for CFU operations
pub type Result<T> = std::result::Result<T, CfuError>;

/// Errors that can occur while driving the CFU
#[derive(Debug, Error)]
pub enum CfuError {
    /// No custom-instruction hardware on this target
    #[error("CFU hardware unavailable: {reason}")]
    HardwareUnavailable {
        /// Why the hardware binding could not be opened
        reason: String,
    },

    /// A layer does not fit the on-chip stores
    #[error("Capacity overflow: {what} needs {required}, store holds {available}")]
    CapacityOverflow {
        /// Which store or quantity overflowed
        what: String,
        /// Required amount
        required: usize,
        /// Available amount
        available: usize,
    },

    /// Tensor shapes or buffer lengths are inconsistent
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Description of the mismatch
        reason: String,
    },

    /// Accelerator or layer configuration is unusable
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem
        reason: String,
    },

    /// The completion poll never reported finished
    #[error("Accelerator still busy after {polls} polls")]
    Timeout {
        /// Number of polls issued
        polls: u32,
    },
}

impl CfuError {
    /// Create a hardware unavailable error
    pub fn hardware_unavailable(reason: impl Into<String>) -> Self {
        Self::HardwareUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a capacity overflow error
    pub fn capacity_overflow(what: impl Into<String>, required: usize, available: usize) -> Self {
        Self::CapacityOverflow {
            what: what.into(),
            required,
            available,
        }
    }

    /// Create an invalid shape error
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Out-of-sequence access inside the software twin.
///
/// Real hardware has no exception path, so these are never returned to the
/// caller of `dispatch`. The model logs them, counts them, and answers 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequencingFault {
    /// Write to an input buffer that is still waiting to be read
    #[error("input buffer {buffer} is readable, write refused")]
    InputWriteRefused {
        /// Buffer index (0 or 1)
        buffer: usize,
    },

    /// Read from an input buffer that has not been filled
    #[error("input buffer {buffer} is writable, read refused")]
    InputReadRefused {
        /// Buffer index (0 or 1)
        buffer: usize,
    },

    /// Input store used before its depth was configured
    #[error("input depth not configured")]
    InputDepthUnset,

    /// Input depth larger than one side of the double buffer
    #[error("input depth {words} words exceeds buffer side of {capacity}")]
    InputDepthTooLarge {
        /// Requested depth in words
        words: usize,
        /// Words per buffer side
        capacity: usize,
    },

    /// Filter read beyond the words written for this batch
    #[error("filter read at {read} past write cursor {written}")]
    FilterReadPastWrite {
        /// Linear read position
        read: usize,
        /// Words written so far
        written: usize,
    },

    /// Filter store full
    #[error("filter store overflow ({capacity} words)")]
    FilterOverflow {
        /// Capacity in words
        capacity: usize,
    },

    /// Param store full
    #[error("{store} param store overflow ({capacity} entries)")]
    ParamOverflow {
        /// Which store (bias / multiplier / shift)
        store: &'static str,
        /// Capacity in entries
        capacity: usize,
    },

    /// Param read with nothing stored
    #[error("{store} param store is empty")]
    ParamEmpty {
        /// Which store (bias / multiplier / shift)
        store: &'static str,
    },

    /// Output queue full
    #[error("output queue overflow ({capacity} words)")]
    OutputOverflow {
        /// Capacity in words
        capacity: usize,
    },

    /// Output queue empty
    #[error("output queue underflow")]
    OutputUnderflow,

    /// Stored shift outside the supported [-31, 31] range
    #[error("output shift {shift} outside [-31, 31]")]
    ShiftOutOfRange {
        /// Offending shift
        shift: i32,
    },
}
