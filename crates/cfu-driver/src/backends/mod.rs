//! Command protocol bindings
//!
//! - **Hardware**: CUSTOM-0 instruction on a RISC-V core with the CFU attached
//! - **Software**: [`crate::model::AcceleratorModel`], available everywhere
//!
//! Both implement [`crate::protocol::CommandProtocol`].

pub mod hardware;

pub use hardware::HardwareCfu;
