//! `cfu`: command-line harness for the convolution CFU.
//!
//! ```text
//! USAGE:
//!   cfu sweep fixed                      Extremal operands on every math channel
//!   cfu sweep random [--count N]         LCG-driven srdhm / rdbpot / macc4 sweeps
//!   cfu case <fn> <sub> <a> <b>          Issue one command on both bindings
//!   cfu conv                             Scheduled convolution vs direct reference
//!   cfu encode <fn> <sub>                Print the CUSTOM-0 instruction word
//!   cfu info                             Selected binding and store geometry
//! ```
//!
//! The left binding is chosen with `--binding` or `CFU_BINDING`; the right
//! binding is always the software twin.

use anyhow::{bail, Result};
use cfu_driver::chip::Insn;
use cfu_driver::harness::sweep;
use cfu_driver::{
    reference_conv, select_binding, AcceleratorConfig, AcceleratorModel, BindingSelection,
    Command, CommandProtocol, ConvLayer, ConvParams, ConvolutionScheduler, EquivalenceHarness,
    EquivalenceReport, FilterShape, Shape,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfu", about = "Convolution CFU equivalence harness", version)]
struct Cli {
    /// Binding under test: auto, hw or sw (default: $CFU_BINDING, then auto).
    #[arg(long, global = true)]
    binding: Option<BindingSelection>,

    /// Mismatches printed per report.
    #[arg(long, global = true, default_value_t = 10)]
    max_reported: usize,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run an equivalence sweep against the software twin.
    Sweep {
        #[command(subcommand)]
        kind: SweepCmd,
    },
    /// Issue a single command on both bindings.
    Case {
        /// Function id (0..=7).
        function_id: u8,
        /// Sub-function (0..=127).
        sub_function: u8,
        /// First operand, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_word)]
        a: u32,
        /// Second operand, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_word)]
        b: u32,
    },
    /// Run a convolution through the scheduler and check it against the reference.
    Conv {
        /// Output channels.
        #[arg(long, default_value_t = 37)]
        channels: usize,
        /// Input depth, a multiple of 4.
        #[arg(long, default_value_t = 8)]
        depth: usize,
        /// Input height and width.
        #[arg(long, default_value_t = 4)]
        extent: usize,
        /// Square kernel size.
        #[arg(long, default_value_t = 3)]
        kernel: usize,
        /// Cap on channels per batch.
        #[arg(long)]
        max_batch: Option<usize>,
    },
    /// Print the instruction word for a function / sub-function pair.
    Encode {
        /// Function id (0..=7).
        function_id: u8,
        /// Sub-function (0..=127).
        sub_function: u8,
    },
    /// Show the selected binding and store geometry.
    Info,
}

#[derive(Subcommand)]
enum SweepCmd {
    /// Extremal operands on srdhm, rdbpot and macc4.
    Fixed,
    /// Reproducible pseudo-random operands.
    Random {
        /// Commands per sweep.
        #[arg(long, default_value_t = 1024)]
        count: usize,
        /// LCG seed.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Which sweep to run.
        #[arg(long, value_enum, default_value_t = RandomKind::All)]
        kind: RandomKind,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RandomKind {
    Srdhm,
    Rdbpot,
    Macc4,
    All,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let selection = cli.binding.unwrap_or_else(BindingSelection::from_env);
    let harness = EquivalenceHarness::new(cli.max_reported);
    let config = AcceleratorConfig::default();

    match cli.command {
        Cmd::Sweep { kind } => cmd_sweep(selection, config, &harness, &kind)?,
        Cmd::Case { function_id, sub_function, a, b } => {
            cmd_case(selection, config, &harness, function_id, sub_function, a, b)?;
        }
        Cmd::Conv { channels, depth, extent, kernel, max_batch } => {
            cmd_conv(selection, config, channels, depth, extent, kernel, max_batch)?;
        }
        Cmd::Encode { function_id, sub_function } => cmd_encode(function_id, sub_function)?,
        Cmd::Info => cmd_info(selection, config)?,
    }

    Ok(())
}

fn parse_word(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => match s.parse::<u32>() {
            Ok(v) => Ok(v),
            #[allow(clippy::cast_sign_loss)]
            Err(_) => s.parse::<i32>().map(|v| v as u32).map_err(|e| e.to_string()),
        },
    };
    parsed.map_err(|e| format!("'{s}': {e}"))
}

fn check_ids(function_id: u8, sub_function: u8) -> Result<()> {
    if function_id > 7 {
        bail!("function id {function_id} exceeds 3 bits");
    }
    if sub_function > 127 {
        bail!("sub-function {sub_function} exceeds 7 bits");
    }
    Ok(())
}

fn finish(report: &EquivalenceReport) -> Result<()> {
    println!("{report}");
    if !report.passed() {
        bail!("{} mismatches", report.mismatch_count);
    }
    Ok(())
}

fn cmd_sweep(
    selection: BindingSelection,
    config: AcceleratorConfig,
    harness: &EquivalenceHarness,
    kind: &SweepCmd,
) -> Result<()> {
    let mut lhs = select_binding(selection, config)?;
    let mut rhs = AcceleratorModel::with_config(config)?;
    println!("{} vs {}", lhs.binding_type(), rhs.binding_type());

    let report = match *kind {
        SweepCmd::Fixed => harness.run(&mut lhs, &mut rhs, sweep::fixed()),
        SweepCmd::Random { count, seed, kind } => {
            let mut report = EquivalenceReport::default();
            if matches!(kind, RandomKind::Srdhm | RandomKind::All) {
                report.merge(harness.run(&mut lhs, &mut rhs, sweep::srdhm(count, seed)));
            }
            if matches!(kind, RandomKind::Rdbpot | RandomKind::All) {
                report.merge(harness.run(&mut lhs, &mut rhs, sweep::rdbpot(count, seed)));
            }
            if matches!(kind, RandomKind::Macc4 | RandomKind::All) {
                report.merge(harness.run(&mut lhs, &mut rhs, sweep::macc4_explicit(count, seed)));
            }
            report
        }
    };
    finish(&report)
}

fn cmd_case(
    selection: BindingSelection,
    config: AcceleratorConfig,
    harness: &EquivalenceHarness,
    function_id: u8,
    sub_function: u8,
    a: u32,
    b: u32,
) -> Result<()> {
    check_ids(function_id, sub_function)?;
    let mut lhs = select_binding(selection, config)?;
    let mut rhs = AcceleratorModel::with_config(config)?;
    let command = Command::new(function_id, sub_function, a, b);
    let (l, r) = harness.run_one(&mut lhs, &mut rhs, command);
    println!("{command}");
    println!("  {:<28} 0x{l:08x}", lhs.binding_type().to_string());
    println!("  {:<28} 0x{r:08x}", rhs.binding_type().to_string());
    if l != r {
        bail!("bindings disagree");
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn cmd_conv(
    selection: BindingSelection,
    config: AcceleratorConfig,
    channels: usize,
    depth: usize,
    extent: usize,
    kernel: usize,
    max_batch: Option<usize>,
) -> Result<()> {
    let mut rng = sweep::Lcg::new(0);
    let input: Vec<i8> = (0..extent * extent * depth).map(|_| rng.next_i32() as i8).collect();
    let filters: Vec<i8> =
        (0..channels * kernel * kernel * depth).map(|_| rng.next_i32() as i8).collect();
    let bias: Vec<i32> = (0..channels).map(|_| rng.next_i32() % 4096).collect();
    let multiplier = vec![1_i32 << 29; channels];
    let shift = vec![-4_i32; channels];
    let layer = ConvLayer {
        input_shape: Shape::new(extent, extent, depth),
        input: &input,
        filter_shape: FilterShape::new(channels, kernel, kernel, depth),
        filters: &filters,
        bias: &bias,
        multiplier: &multiplier,
        shift: &shift,
        params: ConvParams {
            padding: kernel / 2,
            input_offset: 5,
            output_offset: -2,
            ..ConvParams::default()
        },
    };

    let mut scheduler = ConvolutionScheduler::new(config);
    if let Some(n) = max_batch {
        scheduler = scheduler.with_max_channels_per_batch(n);
    }
    let plan = scheduler.plan(&layer)?;
    println!(
        "{}×{}×{} * {channels}×{kernel}×{kernel}: batches {:?}",
        extent,
        extent,
        depth,
        plan.sizes()
    );

    let mut cfu = select_binding(selection, config)?;
    let got = scheduler.run(&mut cfu, &layer)?;
    let want = reference_conv(&layer)?;
    let wrong = got.iter().zip(&want).filter(|(g, w)| g != w).count();
    println!("{}: {} values, {wrong} differ from reference", cfu.binding_type(), want.len());
    if wrong > 0 {
        bail!("convolution mismatch");
    }
    println!("PASS");
    Ok(())
}

fn cmd_encode(function_id: u8, sub_function: u8) -> Result<()> {
    check_ids(function_id, sub_function)?;
    let insn = Insn::conventional(function_id, sub_function);
    println!(
        "cfu_op{function_id}({sub_function}) = 0x{:08x}  \
         (.insn r 0x0b, {function_id}, {sub_function}, a0, a0, a1)",
        insn.encode()
    );
    Ok(())
}

fn cmd_info(selection: BindingSelection, config: AcceleratorConfig) -> Result<()> {
    let binding = select_binding(selection, config)?;
    println!("Selection     : {selection}");
    println!("Binding       : {}", binding.binding_type());
    println!(
        "Filter store  : {} banks × {} words ({} words)",
        config.filter_banks,
        config.filter_bank_words,
        config.filter_capacity_words()
    );
    println!("Input buffer  : 2 × {} words", config.input_buffer_words);
    println!("Param stores  : {} entries", config.param_capacity);
    println!("Output queue  : {} words", config.output_queue_words);
    Ok(())
}
