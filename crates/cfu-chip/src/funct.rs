//! Function ids and sub-function numbers.
//!
//! Function 0 is the accelerator control plane; its sub-functions follow
//! the register numbers of the gateware register file. Functions 6 and 7
//! expose the fixed-point primitives directly so they can be checked in
//! isolation.
//!
//! ```text
//! fn  sub       phase    action
//! ──  ────────  ───────  ─────────────────────────────────────────────
//!  0  0         CONFIG   reset everything
//!  0  10..=15   CONFIG   SET scalar registers
//!  0  20        CONFIG   SET batch size, restart param + filter stores
//!  0  21..=25   LOAD     append multiplier/shift/bias/filter/input
//!  0  30, 31    COMPUTE  single MACC4 (explicit / from stores)
//!  0  33        COMPUTE  run a whole pixel into the output queue
//!  0  34        DRAIN    pop output queue
//!  0  35        -        completion poll
//!  0  40..=46   -        GET scalar registers
//!  0  110..=120 -        incremental-development commands
//!  6  -         -        rounding divide by power of two
//!  7  -         -        saturating rounding doubling high mul
//! ```

// ── Function ids ─────────────────────────────────────────────────────────────

/// Accelerator control plane.
pub const FN_CONTROL: u8 = 0;
/// `rounding_divide_by_pot(a, b & 31)`.
pub const FN_RDBPOT: u8 = 6;
/// `saturating_rounding_doubling_high_mul(a, b)`.
pub const FN_SRDHM: u8 = 7;

// ── CONFIG ───────────────────────────────────────────────────────────────────

/// Return the whole block to its power-on state.
pub const RESET: u8 = 0;
/// Input depth in 32-bit words per pixel. Also restarts the input store.
pub const SET_INPUT_DEPTH_WORDS: u8 = 10;
/// Output depth (total channels of the layer).
pub const SET_OUTPUT_DEPTH: u8 = 11;
/// Added to every input activation before multiplication.
pub const SET_INPUT_OFFSET: u8 = 12;
/// Added to every requantized output.
pub const SET_OUTPUT_OFFSET: u8 = 13;
/// Lower clamp bound.
pub const SET_ACTIVATION_MIN: u8 = 14;
/// Upper clamp bound.
pub const SET_ACTIVATION_MAX: u8 = 15;
/// Channels in the current batch. Restarts param and filter stores.
pub const SET_OUTPUT_BATCH_SIZE: u8 = 20;

// ── LOAD ─────────────────────────────────────────────────────────────────────

/// Append a per-channel quantized multiplier.
pub const STORE_OUTPUT_MULTIPLIER: u8 = 21;
/// Append a per-channel shift (negative = right shift).
pub const STORE_OUTPUT_SHIFT: u8 = 22;
/// Append a per-channel bias.
pub const STORE_OUTPUT_BIAS: u8 = 23;
/// Append one word (4 lanes) of filter data.
pub const STORE_FILTER_VALUE: u8 = 24;
/// Append one word (4 lanes) of input data. Returns 1 when a buffer fills.
pub const STORE_INPUT_VALUE: u8 = 25;

// ── COMPUTE / DRAIN ──────────────────────────────────────────────────────────

/// MACC over four lanes supplied in the operands.
pub const MACC4_EXPLICIT: u8 = 30;
/// MACC over four lanes read from the input and filter stores.
pub const MACC4_IMPLICIT: u8 = 31;
/// Compute every channel of the batch for one pixel.
pub const MACC_RUN: u8 = 33;
/// Pop one packed word from the output queue.
pub const GET_OUTPUT: u8 = 34;
/// Non-blocking completion poll (1 = finished).
pub const IS_FINISHED: u8 = 35;

// ── Register readback ────────────────────────────────────────────────────────

/// Read back input depth words.
pub const GET_INPUT_DEPTH_WORDS: u8 = 40;
/// Read back output depth.
pub const GET_OUTPUT_DEPTH: u8 = 41;
/// Read back input offset.
pub const GET_INPUT_OFFSET: u8 = 42;
/// Read back output offset.
pub const GET_OUTPUT_OFFSET: u8 = 43;
/// Read back activation min.
pub const GET_ACTIVATION_MIN: u8 = 44;
/// Read back activation max.
pub const GET_ACTIVATION_MAX: u8 = 45;
/// Read back output batch size.
pub const GET_OUTPUT_BATCH_SIZE: u8 = 46;

// ── Incremental development commands ─────────────────────────────────────────

/// Read the next filter word through the read cursor.
pub const GET_FILTER_VALUE: u8 = 110;
/// Read the next input word from the current read buffer.
pub const GET_INPUT_VALUE: u8 = 111;
/// Hand the current read buffer back to the writer.
pub const MARK_INPUT_READ_FINISHED: u8 = 112;
/// Post-process operand `a` as an accumulator.
pub const POST_PROCESS: u8 = 120;

/// Offset between a `SET_*` scalar and its `GET_*` readback, for the
/// registers 10..=15.
pub const GET_FROM_SET_DELTA: u8 = GET_INPUT_DEPTH_WORDS - SET_INPUT_DEPTH_WORDS;
