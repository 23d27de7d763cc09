//! Custom-instruction binding
//!
//! On RISC-V targets every command becomes one R-type instruction in the
//! CUSTOM-0 opcode space:
//!
//! ```text
//!  31      25 24  20 19  15 14  12 11   7 6      0
//! ┌──────────┬──────┬──────┬──────┬──────┬────────┐
//! │ sub_fn   │ rs2  │ rs1  │ fn   │ rd   │ 0x0b   │
//! └──────────┴──────┴──────┴──────┴──────┴────────┘
//! ```
//!
//! `fn` and `sub_fn` are immediates baked into the instruction word, so the
//! binding expands to a table of 8 × 128 instruction sites and picks one at
//! run time. On any other target [`HardwareCfu::open`] fails and callers fall
//! back to the software twin.

use crate::error::{CfuError, Result};
use crate::protocol::{BindingType, CommandProtocol};

/// Command binding that executes the CFU custom instruction.
#[derive(Debug)]
pub struct HardwareCfu {
    issued: u64,
}

impl HardwareCfu {
    /// Open the binding.
    ///
    /// # Errors
    ///
    /// Returns `HardwareUnavailable` when not compiled for RISC-V.
    pub fn open() -> Result<Self> {
        if cfg!(any(target_arch = "riscv32", target_arch = "riscv64")) {
            tracing::debug!("HardwareCfu: CUSTOM-0 binding ready");
            Ok(Self { issued: 0 })
        } else {
            Err(CfuError::hardware_unavailable(format!(
                "custom instructions need a RISC-V target, this is {}",
                std::env::consts::ARCH
            )))
        }
    }

    /// Commands issued through this binding.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

impl CommandProtocol for HardwareCfu {
    fn dispatch(&mut self, function_id: u8, sub_function: u8, a: u32, b: u32) -> u32 {
        self.issued += 1;
        imp::cfu_op(function_id & 0x7, sub_function & 0x7f, a, b)
    }

    fn binding_type(&self) -> BindingType {
        BindingType::Hardware
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod imp {
    macro_rules! insn {
        ($f3:literal, $f7:literal, $a:expr, $b:expr) => {{
            let rd: u32;
            // SAFETY: the instruction only reads rs1/rs2 and writes rd. The
            // CFU has no access to memory or to any other architectural state.
            unsafe {
                core::arch::asm!(
                    concat!(
                        ".insn r 0x0b, ",
                        stringify!($f3),
                        ", ",
                        stringify!($f7),
                        ", {rd}, {rs1}, {rs2}"
                    ),
                    rd = lateout(reg) rd,
                    rs1 = in(reg) $a,
                    rs2 = in(reg) $b,
                    options(nostack),
                );
            }
            rd
        }};
    }

    macro_rules! sub_table {
        ($f3:literal, $sub:expr, $a:expr, $b:expr; [$($f7:literal)*]) => {
            match $sub {
                $( $f7 => insn!($f3, $f7, $a, $b), )*
                _ => 0,
            }
        };
    }

    macro_rules! dispatch_table {
        ($fid:expr, $sub:expr, $a:expr, $b:expr; [$($f3:literal)*]; $f7s:tt) => {
            match $fid {
                $( $f3 => sub_table!($f3, $sub, $a, $b; $f7s), )*
                _ => 0,
            }
        };
    }

    pub(super) fn cfu_op(function_id: u8, sub_function: u8, a: u32, b: u32) -> u32 {
        dispatch_table!(function_id, sub_function, a, b; [0 1 2 3 4 5 6 7]; [
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
            32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
            48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
            64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79
            80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95
            96 97 98 99 100 101 102 103 104 105 106 107 108 109 110 111
            112 113 114 115 116 117 118 119 120 121 122 123 124 125 126 127
        ])
    }
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
mod imp {
    pub(super) fn cfu_op(_function_id: u8, _sub_function: u8, _a: u32, _b: u32) -> u32 {
        0
    }
}
