//! Software twin of the convolution CFU
//!
//! `AcceleratorModel` implements [`CommandProtocol`] with the same state
//! machine the gateware builds, so a command stream produces bit-identical
//! results on either side. This enables:
//!
//! 1. **Equivalence checks**: run the same commands through hardware and the
//!    twin and report the first divergence.
//!
//! 2. **Development without hardware**: the convolution scheduler runs
//!    unchanged against the twin on any host.
//!
//! ## Pipeline
//!
//! ```text
//! CONFIG   SET 10..=15, 20       registers, restart stores
//! LOAD     SET 21..=25           param stores, filter store, input store
//! COMPUTE  GET 33                Σ filter·(input + offset) per channel, post-process
//! DRAIN    GET 34                pop packed int8×4 words
//! ```
//!
//! ## Failure policy
//!
//! Out-of-sequence access never aborts. Each [`SequencingFault`] is logged,
//! counted, and the command answers 0, so a broken command stream shows up
//! as a wrong answer rather than a crash.

mod filter_store;
mod input_store;
mod output_queue;
mod param_store;
mod registers;

pub use filter_store::FilterStore;
pub use input_store::{BufferState, InputStore};
pub use output_queue::OutputQueue;
pub use param_store::ParamStore;
pub use registers::{Register, RegisterFile};

use crate::config::AcceleratorConfig;
use crate::error::{Result, SequencingFault};
use crate::fixed_point;
use crate::protocol::{BindingType, CommandProtocol};
use cfu_chip::{funct, geometry::LANES};
use tracing::{debug, trace, warn};

/// Four signed int8 lanes of `input` and `filter`, multiplied and summed.
///
/// Each input lane is offset by `input_offset` first. Arithmetic wraps like
/// the 32-bit hardware accumulator.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn macc4(input: u32, filter: u32, input_offset: i32) -> i32 {
    (0..LANES).fold(0_i32, |acc, lane| {
        let i = i32::from((input >> (8 * lane)) as u8 as i8);
        let f = i32::from((filter >> (8 * lane)) as u8 as i8);
        acc.wrapping_add(f.wrapping_mul(i.wrapping_add(input_offset)))
    })
}

/// Stateful software accelerator.
///
/// Owns its register file and every store; two instances never share state.
#[derive(Debug, Clone)]
pub struct AcceleratorModel {
    config: AcceleratorConfig,
    regs: RegisterFile,
    multiplier: ParamStore,
    shift: ParamStore,
    bias: ParamStore,
    filters: FilterStore,
    inputs: InputStore,
    outputs: OutputQueue,
    faults: u64,
    last_fault: Option<SequencingFault>,
}

impl Default for AcceleratorModel {
    fn default() -> Self {
        Self::build(AcceleratorConfig::default())
    }
}

impl AcceleratorModel {
    /// Twin with the reference gateware geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Twin with a custom geometry.
    ///
    /// # Errors
    ///
    /// Returns error if any store in `config` has zero capacity.
    pub fn with_config(config: AcceleratorConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "AcceleratorModel: filter {}×{} words, input 2×{} words, params {}, queue {}",
            config.filter_banks,
            config.filter_bank_words,
            config.input_buffer_words,
            config.param_capacity,
            config.output_queue_words
        );
        Ok(Self::build(config))
    }

    fn build(config: AcceleratorConfig) -> Self {
        Self {
            config,
            regs: RegisterFile::default(),
            multiplier: ParamStore::new("multiplier", config.param_capacity),
            shift: ParamStore::new("shift", config.param_capacity),
            bias: ParamStore::new("bias", config.param_capacity),
            filters: FilterStore::new(config.filter_banks, config.filter_bank_words),
            inputs: InputStore::new(config.input_buffer_words),
            outputs: OutputQueue::new(config.output_queue_words),
            faults: 0,
            last_fault: None,
        }
    }

    /// Geometry this twin was built with.
    pub fn config(&self) -> &AcceleratorConfig {
        &self.config
    }

    /// Register file snapshot.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Input store, for protocol inspection.
    pub fn input_store(&self) -> &InputStore {
        &self.inputs
    }

    /// Filter store, for layout inspection.
    pub fn filter_store(&self) -> &FilterStore {
        &self.filters
    }

    /// Words waiting in the output queue.
    pub fn pending_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Sequencing faults since construction or the last `RESET`.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Most recent sequencing fault.
    pub fn last_fault(&self) -> Option<SequencingFault> {
        self.last_fault
    }

    /// Return to power-on state. Fault counters are cleared too.
    pub fn reset(&mut self) {
        *self = Self::build(self.config);
    }

    fn fault(&mut self, fault: SequencingFault) -> u32 {
        warn!("AcceleratorModel: {fault}");
        self.faults += 1;
        self.last_fault = Some(fault);
        0
    }

    fn absorb<T: Default>(&mut self, result: std::result::Result<T, SequencingFault>) -> T {
        result.unwrap_or_else(|f| {
            self.fault(f);
            T::default()
        })
    }

    // ── CONFIG ────────────────────────────────────────────────────────────

    fn set_register(&mut self, reg: Register, value: u32) -> u32 {
        let previous = self.regs.set(reg, value);
        match reg {
            Register::InputDepthWords => {
                let restarted = self.inputs.restart(value as usize);
                self.absorb(restarted);
            }
            Register::OutputBatchSize => {
                self.multiplier.restart();
                self.shift.restart();
                self.bias.restart();
                self.filters.restart();
                if value as usize > self.config.param_capacity {
                    self.fault(SequencingFault::ParamOverflow {
                        store: "batch",
                        capacity: self.config.param_capacity,
                    });
                }
                trace!("batch opened: {value} channels");
            }
            _ => {}
        }
        previous
    }

    // ── LOAD ──────────────────────────────────────────────────────────────

    #[allow(clippy::cast_possible_wrap)]
    fn store_param(&mut self, sub_function: u8, value: u32) -> u32 {
        let store = match sub_function {
            funct::STORE_OUTPUT_MULTIPLIER => &mut self.multiplier,
            funct::STORE_OUTPUT_SHIFT => &mut self.shift,
            _ => &mut self.bias,
        };
        let pushed = store.push(value as i32);
        self.absorb(pushed);
        0
    }

    fn store_filter(&mut self, word: u32) -> u32 {
        let pushed = self.filters.push(word);
        self.absorb(pushed);
        0
    }

    fn store_input(&mut self, word: u32) -> u32 {
        let written = self.inputs.write(word);
        u32::from(self.absorb(written))
    }

    // ── COMPUTE ───────────────────────────────────────────────────────────

    fn batch_filter_words(&self) -> usize {
        self.regs.output_batch_size().saturating_mul(self.regs.input_depth_words())
    }

    fn read_input(&mut self) -> u32 {
        let read = self.inputs.read();
        self.absorb(read)
    }

    fn read_filter(&mut self) -> u32 {
        let read = self.filters.read(self.batch_filter_words());
        self.absorb(read)
    }

    fn read_param(&mut self, which: u8) -> i32 {
        let read = match which {
            funct::STORE_OUTPUT_MULTIPLIER => self.multiplier.read(),
            funct::STORE_OUTPUT_SHIFT => self.shift.read(),
            _ => self.bias.read(),
        };
        self.absorb(read)
    }

    /// Requantize `acc` with the next bias, multiplier and shift.
    ///
    /// Any faulted param read makes the result 0.
    fn post_process(&mut self, acc: i32) -> i32 {
        let before = self.faults;
        let bias = self.read_param(funct::STORE_OUTPUT_BIAS);
        let multiplier = self.read_param(funct::STORE_OUTPUT_MULTIPLIER);
        let shift = self.read_param(funct::STORE_OUTPUT_SHIFT);
        if self.faults != before {
            return 0;
        }
        if !(-31..=31).contains(&shift) {
            self.fault(SequencingFault::ShiftOutOfRange { shift });
            return 0;
        }
        fixed_point::post_process(
            acc,
            bias,
            multiplier,
            shift,
            self.regs.output_offset(),
            self.regs.activation_min(),
            self.regs.activation_max(),
        )
    }

    /// One implicit multiply-accumulate; 0 if either read faults.
    #[allow(clippy::cast_sign_loss)]
    fn macc4_implicit(&mut self) -> u32 {
        let before = self.faults;
        let input = self.read_input();
        let filter = self.read_filter();
        if self.faults != before {
            return 0;
        }
        macc4(input, filter, self.regs.input_offset()) as u32
    }

    fn accumulate_channel(&mut self) -> i32 {
        let offset = self.regs.input_offset();
        let mut acc = 0_i32;
        for _ in 0..self.regs.input_depth_words() {
            let input = self.read_input();
            let filter = self.read_filter();
            acc = acc.wrapping_add(macc4(input, filter, offset));
        }
        acc
    }

    /// Compute every channel of the batch for the pixel in the read buffer.
    ///
    /// Four channels pack into one little-endian word; a final partial word
    /// leaves its upper lanes zero.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn macc_run(&mut self) -> u32 {
        if self.regs.input_depth_words() == 0 {
            return self.fault(SequencingFault::InputDepthUnset);
        }
        if !self.inputs.readable() {
            let buffer = self.inputs.read_buffer();
            return self.fault(SequencingFault::InputReadRefused { buffer });
        }
        let needed = self.batch_filter_words();
        if self.filters.written() < needed {
            return self.fault(SequencingFault::FilterReadPastWrite {
                read: needed,
                written: self.filters.written(),
            });
        }
        if self.multiplier.count() == 0 {
            return self.fault(SequencingFault::ParamEmpty { store: "multiplier" });
        }

        let batch = self.regs.output_batch_size();
        let mut word = 0_u32;
        for channel in 0..batch {
            let acc = self.accumulate_channel();
            let out = self.post_process(acc);
            let lane = channel % LANES;
            word |= u32::from(out as u8) << (8 * lane);
            if lane == LANES - 1 || channel == batch - 1 {
                let pushed = self.outputs.push(word);
                self.absorb(pushed);
                word = 0;
            }
        }
        let finished = self.inputs.mark_read_finished();
        self.absorb(finished);
        trace!("pixel done: {batch} channels, {} words queued", self.outputs.len());
        0
    }

    // ── DRAIN ─────────────────────────────────────────────────────────────

    fn get_output(&mut self) -> u32 {
        let popped = self.outputs.pop();
        self.absorb(popped)
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn control(&mut self, sub_function: u8, a: u32, b: u32) -> u32 {
        if let Some(reg) = Register::from_set(sub_function) {
            return self.set_register(reg, a);
        }
        if let Some(reg) = Register::from_get(sub_function) {
            return self.regs.get(reg);
        }
        match sub_function {
            funct::RESET => {
                self.reset();
                0
            }
            funct::STORE_OUTPUT_MULTIPLIER
            | funct::STORE_OUTPUT_SHIFT
            | funct::STORE_OUTPUT_BIAS => self.store_param(sub_function, a),
            funct::STORE_FILTER_VALUE => self.store_filter(a),
            funct::STORE_INPUT_VALUE => self.store_input(a),
            funct::MACC4_EXPLICIT => macc4(a, b, self.regs.input_offset()) as u32,
            funct::MACC4_IMPLICIT => self.macc4_implicit(),
            funct::MACC_RUN => self.macc_run(),
            funct::GET_OUTPUT => self.get_output(),
            // synchronous: compute already finished when MACC_RUN returned
            funct::IS_FINISHED => 1,
            funct::GET_FILTER_VALUE => self.read_filter(),
            funct::GET_INPUT_VALUE => self.read_input(),
            funct::MARK_INPUT_READ_FINISHED => {
                let finished = self.inputs.mark_read_finished();
                self.absorb(finished);
                0
            }
            funct::POST_PROCESS => self.post_process(a as i32) as u32,
            _ => {
                trace!("unmapped control sub-function {sub_function}");
                0
            }
        }
    }
}

impl CommandProtocol for AcceleratorModel {
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn dispatch(&mut self, function_id: u8, sub_function: u8, a: u32, b: u32) -> u32 {
        let sub_function = sub_function & 0x7f;
        match function_id & 0x7 {
            funct::FN_CONTROL => self.control(sub_function, a, b),
            funct::FN_RDBPOT => fixed_point::rounding_divide_by_pot(a as i32, b & 31) as u32,
            funct::FN_SRDHM => {
                fixed_point::saturating_rounding_doubling_high_mul(a as i32, b as i32) as u32
            }
            other => {
                trace!("unmapped function {other}");
                0
            }
        }
    }

    fn binding_type(&self) -> BindingType {
        BindingType::Software
    }
}
