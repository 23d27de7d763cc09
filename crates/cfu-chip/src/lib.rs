//! Silicon model for the convolution CFU attached to a VexRiscv core.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the block as the gateware builds it: the custom instruction
//! encoding, the function / sub-function command map, and the geometry of
//! the on-chip EBRAM stores.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`insn`] | CUSTOM-0 R-type encoding of `(function_id, sub_function)` |
//! | [`funct`] | Function ids and control-plane sub-function numbers |
//! | [`geometry`] | EBRAM depth, filter banks, input double buffer, param depth |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod funct;
pub mod geometry;
pub mod insn;
