//! Driver for a convolution CFU reached through one custom RISC-V instruction.
//!
//! Every accelerator interaction is a `dispatch(function_id, sub_function, a, b)`
//! call. The same command stream runs on real hardware or on a bit-exact
//! software twin, so the two can be cross-validated.
//!
//! # Binding hierarchy
//!
//! ```text
//! Hardware (riscv32 / riscv64):
//!   HardwareCfu      .insn r CUSTOM-0, one instruction per command
//!
//! Everywhere:
//!   AcceleratorModel software twin of the gateware pipeline
//! ```
//!
//! # Quick start
//!
//! ```
//! use cfu_driver::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = AcceleratorConfig::default();
//! let mut cfu = select_binding(BindingSelection::Software, config)?;
//!
//! let input = [1_i8; 8];
//! let filters = [2_i8; 16];
//! let layer = ConvLayer {
//!     input_shape: Shape::new(1, 2, 4),
//!     input: &input,
//!     filter_shape: FilterShape::new(4, 1, 1, 4),
//!     filters: &filters,
//!     bias: &[0; 4],
//!     multiplier: &[i32::MAX; 4],
//!     shift: &[0; 4],
//!     params: ConvParams::default(),
//! };
//! let out = ConvolutionScheduler::new(config).run(&mut cfu, &layer)?;
//! assert_eq!(out, vec![8; 8]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
mod config;
mod error;
pub mod fixed_point;
pub mod harness;
pub mod model;
mod protocol;
pub mod scheduler;

/// Instruction encoding and command map (re-exported from cfu-chip).
pub mod chip {
    pub use cfu_chip::geometry;
    pub use cfu_chip::insn::Insn;
    pub use cfu_chip::funct;
}

pub use backends::HardwareCfu;
pub use config::{AcceleratorConfig, BindingSelection, BINDING_ENV_VAR};
pub use error::{CfuError, Result, SequencingFault};
pub use harness::{EquivalenceCase, EquivalenceHarness, EquivalenceReport, Mismatch, Relation};
pub use model::AcceleratorModel;
pub use protocol::{select_binding, BindingType, Command, CommandProtocol, FnBinding};
pub use scheduler::{
    reference_conv, BatchPlan, ConvLayer, ConvParams, ConvolutionScheduler, FilterShape, Shape,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        select_binding, AcceleratorConfig, AcceleratorModel, BindingSelection, CfuError, Command,
        CommandProtocol, ConvLayer, ConvParams, ConvolutionScheduler, EquivalenceHarness,
        FilterShape, Result, Shape,
    };
}
