//! Convolution scheduling over the command protocol
//!
//! Drives one NHWC convolution layer (batch 1) through any
//! [`CommandProtocol`] binding. Output channels are split into batches that
//! fit the filter and param stores; every batch re-streams the input, one
//! im2col patch per output pixel.
//!
//! ```text
//! layer   RESET, SET depth / offsets / clamp
//! batch   SET batch size, STORE params, STORE filters
//! pixel   STORE patch p+1 ─┐  (double buffered)
//!         MACC_RUN patch p ┘  poll IS_FINISHED, drain ⌈batch/4⌉ words
//! ```

use crate::config::AcceleratorConfig;
use crate::error::{CfuError, Result};
use crate::fixed_point;
use crate::protocol::{Command, CommandProtocol};
use cfu_chip::{funct, geometry::LANES};
use std::ops::Range;
use tracing::{debug, trace};

/// Polls of `IS_FINISHED` before giving up on a pixel.
pub const DEFAULT_POLL_LIMIT: u32 = 1 << 20;

/// Height × width × depth of an NHWC tensor with batch 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Rows
    pub height: usize,
    /// Columns
    pub width: usize,
    /// Channels
    pub depth: usize,
}

impl Shape {
    /// New shape.
    pub const fn new(height: usize, width: usize, depth: usize) -> Self {
        Self { height, width, depth }
    }

    /// Element count.
    pub const fn len(&self) -> usize {
        self.height * self.width * self.depth
    }

    /// True when any extent is zero.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output channels × kernel rows × kernel columns × input depth (OHWI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterShape {
    /// Output channels
    pub out_channels: usize,
    /// Kernel rows
    pub kernel_height: usize,
    /// Kernel columns
    pub kernel_width: usize,
    /// Input channels
    pub depth: usize,
}

impl FilterShape {
    /// New filter shape.
    pub const fn new(
        out_channels: usize,
        kernel_height: usize,
        kernel_width: usize,
        depth: usize,
    ) -> Self {
        Self { out_channels, kernel_height, kernel_width, depth }
    }

    /// Int8 values per output channel.
    pub const fn values_per_channel(&self) -> usize {
        self.kernel_height * self.kernel_width * self.depth
    }

    /// Element count.
    pub const fn len(&self) -> usize {
        self.out_channels * self.values_per_channel()
    }
}

/// Scalar quantization and geometry parameters of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    /// Step between output pixels, both axes
    pub stride: usize,
    /// Zero padding on every edge
    pub padding: usize,
    /// Added to each input value before multiplication
    pub input_offset: i32,
    /// Added after requantization
    pub output_offset: i32,
    /// Lower clamp
    pub activation_min: i32,
    /// Upper clamp
    pub activation_max: i32,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            input_offset: 0,
            output_offset: 0,
            activation_min: i32::from(i8::MIN),
            activation_max: i32::from(i8::MAX),
        }
    }
}

/// One convolution layer: tensors, per-channel params and scalars.
#[derive(Debug, Clone, Copy)]
pub struct ConvLayer<'a> {
    /// Input shape
    pub input_shape: Shape,
    /// Input values, NHWC
    pub input: &'a [i8],
    /// Filter shape
    pub filter_shape: FilterShape,
    /// Filter values, OHWI
    pub filters: &'a [i8],
    /// Per-channel bias
    pub bias: &'a [i32],
    /// Per-channel Q31 multiplier
    pub multiplier: &'a [i32],
    /// Per-channel shift, negative shifts right
    pub shift: &'a [i32],
    /// Scalars
    pub params: ConvParams,
}

impl ConvLayer<'_> {
    /// Shape of the result tensor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` when the kernel does not fit the padded input
    /// or the stride is zero.
    pub fn output_shape(&self) -> Result<Shape> {
        let p = self.params;
        let f = self.filter_shape;
        if p.stride == 0 {
            return Err(CfuError::invalid_shape("stride must be non-zero"));
        }
        if f.kernel_height == 0 || f.kernel_width == 0 {
            return Err(CfuError::invalid_shape("kernel extent must be non-zero"));
        }
        let padded_h = self.input_shape.height + 2 * p.padding;
        let padded_w = self.input_shape.width + 2 * p.padding;
        if padded_h < f.kernel_height || padded_w < f.kernel_width {
            return Err(CfuError::invalid_shape(format!(
                "{}×{} kernel larger than padded {padded_h}×{padded_w} input",
                f.kernel_height, f.kernel_width
            )));
        }
        Ok(Shape::new(
            (padded_h - f.kernel_height) / p.stride + 1,
            (padded_w - f.kernel_width) / p.stride + 1,
            f.out_channels,
        ))
    }

    /// Check buffer lengths and parameter ranges.
    ///
    /// # Errors
    ///
    /// `InvalidShape` for inconsistent buffers or a depth that is not a
    /// multiple of the lane width; `InvalidConfig` for unusable scalars.
    pub fn validate(&self) -> Result<Shape> {
        let out = self.output_shape()?;
        let f = self.filter_shape;
        if f.depth != self.input_shape.depth {
            return Err(CfuError::invalid_shape(format!(
                "filter depth {} != input depth {}",
                f.depth, self.input_shape.depth
            )));
        }
        if f.depth == 0 || f.depth % LANES != 0 {
            return Err(CfuError::invalid_shape(format!(
                "input depth {} is not a non-zero multiple of {LANES}",
                f.depth
            )));
        }
        if self.input.len() != self.input_shape.len() {
            return Err(CfuError::invalid_shape(format!(
                "input has {} values, shape needs {}",
                self.input.len(),
                self.input_shape.len()
            )));
        }
        if self.filters.len() != f.len() {
            return Err(CfuError::invalid_shape(format!(
                "filters have {} values, shape needs {}",
                self.filters.len(),
                f.len()
            )));
        }
        let per_channel =
            [("bias", self.bias), ("multiplier", self.multiplier), ("shift", self.shift)];
        for (name, values) in per_channel {
            if values.len() != f.out_channels {
                return Err(CfuError::invalid_shape(format!(
                    "{name} has {} entries for {} channels",
                    values.len(),
                    f.out_channels
                )));
            }
        }
        if let Some(s) = self.shift.iter().find(|s| !(-31..=31).contains(*s)) {
            return Err(CfuError::invalid_config(format!("shift {s} outside [-31, 31]")));
        }
        if self.params.padding > 0 && self.pad_value().is_none() {
            return Err(CfuError::invalid_config(format!(
                "input offset {} leaves no int8 padding value",
                self.params.input_offset
            )));
        }
        Ok(out)
    }

    /// Input value that contributes zero once offset.
    fn pad_value(&self) -> Option<i8> {
        i8::try_from(self.params.input_offset.checked_neg()?).ok()
    }

    /// im2col patch of the output pixel at `(oy, ox)`, in (row, col, depth) order.
    #[allow(clippy::cast_possible_wrap)]
    fn patch(&self, oy: usize, ox: usize, out: &mut Vec<i8>) {
        let f = self.filter_shape;
        let p = self.params;
        let pad = self.pad_value().unwrap_or(0);
        out.clear();
        for ky in 0..f.kernel_height {
            for kx in 0..f.kernel_width {
                let iy = (oy * p.stride + ky) as isize - p.padding as isize;
                let ix = (ox * p.stride + kx) as isize - p.padding as isize;
                match (usize::try_from(iy), usize::try_from(ix)) {
                    (Ok(iy), Ok(ix))
                        if iy < self.input_shape.height && ix < self.input_shape.width =>
                    {
                        let start = (iy * self.input_shape.width + ix) * f.depth;
                        out.extend_from_slice(&self.input[start..start + f.depth]);
                    }
                    _ => out.extend(std::iter::repeat(pad).take(f.depth)),
                }
            }
        }
    }
}

/// Little-endian pack of int8 values, four per word.
#[allow(clippy::cast_sign_loss)]
pub fn pack_words(values: &[i8]) -> impl Iterator<Item = u32> + '_ {
    values.chunks(LANES).map(|chunk| {
        let mut bytes = [0_u8; LANES];
        for (b, &v) in bytes.iter_mut().zip(chunk) {
            *b = v as u8;
        }
        u32::from_le_bytes(bytes)
    })
}

/// Output channel split for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Channels per full batch.
    ///
    /// The capacity bound is rounded down to a multiple of four before it is
    /// capped at the layer's output depth, so a layer narrower than the
    /// stores keeps all its channels in one batch (37 stays 37, 3 stays 3).
    pub channels_per_batch: usize,
    /// Filter words per output channel
    pub filter_words_per_channel: usize,
    /// Channel range of each batch
    pub batches: Vec<Range<usize>>,
}

impl BatchPlan {
    /// Channel count of each batch.
    pub fn sizes(&self) -> Vec<usize> {
        self.batches.iter().map(ExactSizeIterator::len).collect()
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// True when there is nothing to compute.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Runs convolution layers on a binding with the given store geometry.
#[derive(Debug, Clone)]
pub struct ConvolutionScheduler {
    config: AcceleratorConfig,
    max_channels_per_batch: Option<usize>,
    poll_limit: u32,
}

impl ConvolutionScheduler {
    /// Scheduler for an accelerator built with `config`.
    pub fn new(config: AcceleratorConfig) -> Self {
        Self {
            config,
            max_channels_per_batch: None,
            poll_limit: DEFAULT_POLL_LIMIT,
        }
    }

    /// Cap batch width below what the stores allow.
    #[must_use]
    pub fn with_max_channels_per_batch(mut self, channels: usize) -> Self {
        self.max_channels_per_batch = Some(channels);
        self
    }

    /// Override the completion poll bound.
    #[must_use]
    pub fn with_poll_limit(mut self, polls: u32) -> Self {
        self.poll_limit = polls.max(1);
        self
    }

    /// Split the layer's output channels into batches.
    ///
    /// # Errors
    ///
    /// `CapacityOverflow` when one patch exceeds an input buffer side or not
    /// even four channels fit the stores; shape errors from validation.
    pub fn plan(&self, layer: &ConvLayer<'_>) -> Result<BatchPlan> {
        layer.validate()?;
        let f = layer.filter_shape;
        let fwpc = f.values_per_channel() / LANES;
        if fwpc > self.config.input_buffer_words {
            return Err(CfuError::capacity_overflow(
                "input patch words",
                fwpc,
                self.config.input_buffer_words,
            ));
        }

        let mut capacity = (self.config.filter_capacity_words() / fwpc)
            .min(self.config.param_capacity)
            .min(self.config.output_queue_words * LANES);
        if let Some(cap) = self.max_channels_per_batch {
            capacity = capacity.min(cap);
        }
        let channels_per_batch = f.out_channels.min(capacity / LANES * LANES);
        if channels_per_batch == 0 {
            return Err(CfuError::capacity_overflow(
                "filter words for one channel group",
                fwpc * LANES,
                self.config.filter_capacity_words(),
            ));
        }

        let batches = (0..f.out_channels)
            .step_by(channels_per_batch)
            .map(|start| start..(start + channels_per_batch).min(f.out_channels))
            .collect();
        Ok(BatchPlan { channels_per_batch, filter_words_per_channel: fwpc, batches })
    }

    /// Compute the layer on `cfu` and return the NHWC int8 output.
    ///
    /// # Errors
    ///
    /// Planning errors, or `Timeout` if a pixel never reports finished.
    pub fn run(
        &self,
        cfu: &mut (impl CommandProtocol + ?Sized),
        layer: &ConvLayer<'_>,
    ) -> Result<Vec<i8>> {
        let out_shape = layer.validate()?;
        let plan = self.plan(layer)?;
        debug!(
            "conv {:?} → {:?}: {} batches of ≤{} channels, {} words/channel",
            layer.input_shape,
            out_shape,
            plan.len(),
            plan.channels_per_batch,
            plan.filter_words_per_channel
        );

        configure_layer(cfu, layer, plan.filter_words_per_channel);

        let mut output = vec![0_i8; out_shape.len()];
        for channels in &plan.batches {
            self.run_batch(cfu, layer, out_shape, channels.clone(), &mut output)?;
        }
        Ok(output)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn run_batch(
        &self,
        cfu: &mut (impl CommandProtocol + ?Sized),
        layer: &ConvLayer<'_>,
        out_shape: Shape,
        channels: Range<usize>,
        output: &mut [i8],
    ) -> Result<()> {
        let batch_len = channels.len();
        trace!("batch channels {channels:?}");
        set(cfu, funct::SET_OUTPUT_BATCH_SIZE, batch_len as u32);
        for ch in channels.clone() {
            set(cfu, funct::STORE_OUTPUT_MULTIPLIER, layer.multiplier[ch] as u32);
            set(cfu, funct::STORE_OUTPUT_SHIFT, layer.shift[ch] as u32);
            set(cfu, funct::STORE_OUTPUT_BIAS, layer.bias[ch] as u32);
        }
        let per_channel = layer.filter_shape.values_per_channel();
        let filters = &layer.filters[channels.start * per_channel..channels.end * per_channel];
        for word in pack_words(filters) {
            set(cfu, funct::STORE_FILTER_VALUE, word);
        }

        let pixels = out_shape.height * out_shape.width;
        let mut patch = Vec::with_capacity(per_channel);

        for p in 0..pixels {
            if p == 0 {
                load_pixel(cfu, layer, out_shape.width, 0, &mut patch);
            }
            if p + 1 < pixels {
                load_pixel(cfu, layer, out_shape.width, p + 1, &mut patch);
            }
            Command::control(funct::MACC_RUN, 0, 0).issue(cfu);
            self.wait_finished(cfu)?;

            let base = p * out_shape.depth + channels.start;
            for lanes in output[base..base + batch_len].chunks_mut(LANES) {
                let word = Command::control(funct::GET_OUTPUT, 0, 0).issue(cfu);
                for (slot, byte) in lanes.iter_mut().zip(word.to_le_bytes()) {
                    *slot = byte as i8;
                }
            }
        }
        Ok(())
    }

    fn wait_finished(&self, cfu: &mut (impl CommandProtocol + ?Sized)) -> Result<()> {
        for _ in 0..self.poll_limit {
            if Command::control(funct::IS_FINISHED, 0, 0).issue(cfu) != 0 {
                return Ok(());
            }
        }
        Err(CfuError::Timeout { polls: self.poll_limit })
    }
}

fn set(cfu: &mut (impl CommandProtocol + ?Sized), sub_function: u8, value: u32) -> u32 {
    Command::control(sub_function, value, 0).issue(cfu)
}

fn load_pixel(
    cfu: &mut (impl CommandProtocol + ?Sized),
    layer: &ConvLayer<'_>,
    out_width: usize,
    pixel: usize,
    patch: &mut Vec<i8>,
) {
    layer.patch(pixel / out_width, pixel % out_width, patch);
    for word in pack_words(patch) {
        set(cfu, funct::STORE_INPUT_VALUE, word);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn configure_layer(
    cfu: &mut (impl CommandProtocol + ?Sized),
    layer: &ConvLayer<'_>,
    depth_words: usize,
) {
    let p = layer.params;
    Command::control(funct::RESET, 0, 0).issue(cfu);
    set(cfu, funct::SET_INPUT_DEPTH_WORDS, depth_words as u32);
    set(cfu, funct::SET_OUTPUT_DEPTH, layer.filter_shape.out_channels as u32);
    set(cfu, funct::SET_INPUT_OFFSET, p.input_offset as u32);
    set(cfu, funct::SET_OUTPUT_OFFSET, p.output_offset as u32);
    set(cfu, funct::SET_ACTIVATION_MIN, p.activation_min as u32);
    set(cfu, funct::SET_ACTIVATION_MAX, p.activation_max as u32);
}

/// Direct, unbatched convolution with the same arithmetic as the accelerator.
///
/// Reads `layer.input` by NHWC index; padded taps contribute nothing.
///
/// # Errors
///
/// Validation errors of [`ConvLayer::validate`].
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn reference_conv(layer: &ConvLayer<'_>) -> Result<Vec<i8>> {
    let out_shape = layer.validate()?;
    let (input, f, p) = (layer.input_shape, layer.filter_shape, layer.params);
    let mut output = Vec::with_capacity(out_shape.len());
    for oy in 0..out_shape.height {
        for ox in 0..out_shape.width {
            for ch in 0..f.out_channels {
                let mut acc = 0_i32;
                for ky in 0..f.kernel_height {
                    let iy = (oy * p.stride + ky) as isize - p.padding as isize;
                    for kx in 0..f.kernel_width {
                        let ix = (ox * p.stride + kx) as isize - p.padding as isize;
                        if iy < 0
                            || ix < 0
                            || iy as usize >= input.height
                            || ix as usize >= input.width
                        {
                            continue;
                        }
                        let (iy, ix) = (iy as usize, ix as usize);
                        let x_base = (iy * input.width + ix) * input.depth;
                        let w_base = ((ch * f.kernel_height + ky) * f.kernel_width + kx) * f.depth;
                        for d in 0..f.depth {
                            let x = i32::from(layer.input[x_base + d]);
                            let w = i32::from(layer.filters[w_base + d]);
                            acc = acc.wrapping_add(w.wrapping_mul(x.wrapping_add(p.input_offset)));
                        }
                    }
                }
                let out = fixed_point::post_process(
                    acc,
                    layer.bias[ch],
                    layer.multiplier[ch],
                    layer.shift[ch],
                    p.output_offset,
                    p.activation_min,
                    p.activation_max,
                );
                output.push(out as i8);
            }
        }
    }
    Ok(output)
}
