//! Convolution scheduler tests
//!
//! Batched execution on the software twin must match the direct reference
//! convolution bit for bit.

use cfu_driver::fixed_point::Q31_ONE;
use cfu_driver::{
    reference_conv, AcceleratorConfig, AcceleratorModel, CfuError, ConvLayer, ConvParams,
    ConvolutionScheduler, FilterShape, Shape,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct LayerData {
    input_shape: Shape,
    input: Vec<i8>,
    filter_shape: FilterShape,
    filters: Vec<i8>,
    bias: Vec<i32>,
    multiplier: Vec<i32>,
    shift: Vec<i32>,
    params: ConvParams,
}

impl LayerData {
    fn layer(&self) -> ConvLayer<'_> {
        ConvLayer {
            input_shape: self.input_shape,
            input: &self.input,
            filter_shape: self.filter_shape,
            filters: &self.filters,
            bias: &self.bias,
            multiplier: &self.multiplier,
            shift: &self.shift,
            params: self.params,
        }
    }

    fn patterned(height: usize, width: usize, depth: usize, out_channels: usize) -> Self {
        let input_len = height * width * depth;
        let filter_len = out_channels * depth;
        Self {
            input_shape: Shape::new(height, width, depth),
            input: (0..input_len).map(|i| ((i * 37 + 11) % 256) as u8 as i8).collect(),
            filter_shape: FilterShape::new(out_channels, 1, 1, depth),
            filters: (0..filter_len).map(|i| ((i * 53 + 5) % 256) as u8 as i8).collect(),
            bias: (0..out_channels).map(|c| c as i32 * 97 - 1500).collect(),
            multiplier: vec![1 << 28; out_channels],
            shift: vec![-2; out_channels],
            params: ConvParams { input_offset: 7, output_offset: -3, ..ConvParams::default() },
        }
    }
}

fn run_on_model(scheduler: &ConvolutionScheduler, data: &LayerData) -> Vec<i8> {
    let mut model = AcceleratorModel::new();
    let out = scheduler.run(&mut model, &data.layer()).expect("scheduled conv");
    assert_eq!(model.faults(), 0, "last fault: {:?}", model.last_fault());
    out
}

#[test]
fn test_bias_passthrough() {
    let data = LayerData {
        input_shape: Shape::new(1, 1, 4),
        input: vec![0; 4],
        filter_shape: FilterShape::new(3, 1, 1, 4),
        filters: vec![0; 12],
        bias: vec![5, -5, 0],
        multiplier: vec![Q31_ONE; 3],
        shift: vec![0; 3],
        params: ConvParams::default(),
    };
    let out = run_on_model(&ConvolutionScheduler::new(AcceleratorConfig::default()), &data);
    assert_eq!(out, vec![5, -5, 0]);
}

#[test]
fn test_partial_word_drains_every_channel() {
    let data = LayerData {
        input_shape: Shape::new(1, 1, 4),
        input: vec![0; 4],
        filter_shape: FilterShape::new(5, 1, 1, 4),
        filters: vec![0; 20],
        bias: vec![1, 2, 3, 4, 5],
        multiplier: vec![Q31_ONE; 5],
        shift: vec![0; 5],
        params: ConvParams::default(),
    };
    let out = run_on_model(&ConvolutionScheduler::new(AcceleratorConfig::default()), &data);
    assert_eq!(out, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_37_channels_batch_as_16_16_5() {
    let data = LayerData::patterned(2, 3, 8, 37);
    let scheduler =
        ConvolutionScheduler::new(AcceleratorConfig::default()).with_max_channels_per_batch(16);
    let plan = scheduler.plan(&data.layer()).expect("plan");
    assert_eq!(plan.sizes(), vec![16, 16, 5]);
    assert_eq!(plan.batches[2], 32..37);

    let batched = run_on_model(&scheduler, &data);
    assert_eq!(batched, reference_conv(&data.layer()).expect("reference"));
}

#[test]
fn test_store_capacity_forces_batching() {
    let data = LayerData::patterned(3, 3, 16, 20);
    // 4 words per channel against 4×4 words of filter store → 4 channels per batch
    let config = AcceleratorConfig::default().with_filter_store(4, 4);
    let scheduler = ConvolutionScheduler::new(config);
    assert_eq!(scheduler.plan(&data.layer()).expect("plan").sizes(), vec![4; 5]);

    let mut model = AcceleratorModel::with_config(config).expect("model");
    let out = scheduler.run(&mut model, &data.layer()).expect("conv");
    assert_eq!(out, reference_conv(&data.layer()).expect("reference"));
    assert_eq!(model.faults(), 0);
}

#[test]
fn test_batched_equals_unbatched() {
    let data = LayerData::patterned(4, 4, 8, 13);
    let unbatched = run_on_model(&ConvolutionScheduler::new(AcceleratorConfig::default()), &data);
    let batched = run_on_model(
        &ConvolutionScheduler::new(AcceleratorConfig::default()).with_max_channels_per_batch(4),
        &data,
    );
    assert_eq!(batched, unbatched);
}

#[test]
fn test_channel_budget_too_small_is_fatal() {
    let data = LayerData::patterned(1, 1, 4, 8);
    let scheduler =
        ConvolutionScheduler::new(AcceleratorConfig::default()).with_max_channels_per_batch(3);
    let mut model = AcceleratorModel::new();
    assert!(matches!(
        scheduler.run(&mut model, &data.layer()),
        Err(CfuError::CapacityOverflow { .. })
    ));
}

#[test]
fn test_shape_mismatch_rejected() {
    let mut data = LayerData::patterned(2, 2, 4, 4);
    data.bias.pop();
    assert!(matches!(
        reference_conv(&data.layer()),
        Err(CfuError::InvalidShape { .. })
    ));
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    depth: usize,
    extent: usize,
    out_channels: usize,
    kernel: usize,
    padding: usize,
    stride: usize,
}

fn geometry() -> impl Strategy<Value = Geometry> {
    (
        prop::sample::select(vec![4_usize, 8, 16]),
        prop::sample::select(vec![1_usize, 4, 9]),
        1_usize..=40,
        prop::sample::select(vec![(1_usize, 0_usize), (3, 1), (3, 0)]),
        1_usize..=2,
    )
        .prop_map(|(depth, extent, out_channels, (kernel, padding), stride)| {
            let (kernel, padding) =
                if kernel > extent + 2 * padding { (1, 0) } else { (kernel, padding) };
            Geometry { depth, extent, out_channels, kernel, padding, stride }
        })
}

fn spatial_layer() -> impl Strategy<Value = LayerData> {
    geometry().prop_flat_map(|g| {
        let channels = g.out_channels;
        (
            prop::collection::vec(any::<i8>(), g.extent * g.extent * g.depth),
            prop::collection::vec(any::<i8>(), channels * g.kernel * g.kernel * g.depth),
            prop::collection::vec(-5000_i32..5000, channels),
            prop::collection::vec((1_i32 << 29)..i32::MAX, channels),
            prop::collection::vec(-12_i32..=1, channels),
            -127_i32..=127,
            -128_i32..=127,
        )
            .prop_map(move |values| {
                let (input, filters, bias, multiplier, shift, input_offset, output_offset) = values;
                LayerData {
                    input_shape: Shape::new(g.extent, g.extent, g.depth),
                    input,
                    filter_shape: FilterShape::new(channels, g.kernel, g.kernel, g.depth),
                    filters,
                    bias,
                    multiplier,
                    shift,
                    params: ConvParams {
                        stride: g.stride,
                        padding: g.padding,
                        input_offset,
                        output_offset,
                        ..ConvParams::default()
                    },
                }
            })
    })
}

fn batch_cap() -> impl Strategy<Value = Option<usize>> {
    prop_oneof![Just(None), Just(Some(4)), Just(Some(8)), Just(Some(16))]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn batched_conv_matches_reference(data in spatial_layer(), cap in batch_cap()) {
        let mut scheduler = ConvolutionScheduler::new(AcceleratorConfig::default());
        if let Some(cap) = cap {
            scheduler = scheduler.with_max_channels_per_batch(cap);
        }
        let mut model = AcceleratorModel::new();
        let out = scheduler.run(&mut model, &data.layer()).expect("scheduled conv");
        prop_assert_eq!(model.faults(), 0);
        prop_assert_eq!(model.pending_outputs(), 0);
        prop_assert_eq!(out, reference_conv(&data.layer()).expect("reference"));
    }
}
