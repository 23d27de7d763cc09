//! CUSTOM-0 instruction encoding.
//!
//! The CPU hands the CFU an R-type instruction whose `funct3` field is the
//! function id and whose `funct7` field is the sub-function:
//!
//! ```text
//!  31      25 24  20 19  15 14  12 11   7 6      0
//! ┌──────────┬──────┬──────┬──────┬──────┬────────┐
//! │  funct7  │ rs2  │ rs1  │funct3│  rd  │ opcode │
//! └──────────┴──────┴──────┴──────┴──────┴────────┘
//! ```
//!
//! The C runtime always routes operands through `a0`/`a1` and the result
//! back through `a0`, so `cfu_op0(3, a, b)` is the literal word `0x06b5050b`.

/// CUSTOM-0 major opcode (`0b000_1011`).
pub const OPCODE_CUSTOM0: u32 = 0b000_1011;

/// Number of distinct function ids (3-bit `funct3`).
pub const FUNCTION_COUNT: u8 = 8;

/// Number of distinct sub-functions (7-bit `funct7`).
pub const SUB_FUNCTION_COUNT: u8 = 128;

/// Register `a0` (x10): first operand and result.
pub const REG_A0: u8 = 10;
/// Register `a1` (x11): second operand.
pub const REG_A1: u8 = 11;

/// A decoded CFU instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    /// `funct3`: protocol channel.
    pub function_id: u8,
    /// `funct7`: register or action within the channel.
    pub sub_function: u8,
    /// Destination register.
    pub rd: u8,
    /// First source register.
    pub rs1: u8,
    /// Second source register.
    pub rs2: u8,
}

impl Insn {
    /// The conventional `a0 <- cfu(a0, a1)` form used by the C runtime.
    #[must_use]
    pub const fn conventional(function_id: u8, sub_function: u8) -> Self {
        Self { function_id, sub_function, rd: REG_A0, rs1: REG_A0, rs2: REG_A1 }
    }

    /// Encode to a 32-bit instruction word. Fields are masked to their widths.
    #[must_use]
    pub const fn encode(&self) -> u32 {
        ((self.sub_function as u32 & 0x7f) << 25)
            | ((self.rs2 as u32 & 0x1f) << 20)
            | ((self.rs1 as u32 & 0x1f) << 15)
            | ((self.function_id as u32 & 0x7) << 12)
            | ((self.rd as u32 & 0x1f) << 7)
            | OPCODE_CUSTOM0
    }

    /// Decode a 32-bit word. Returns `None` unless the opcode is CUSTOM-0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(word: u32) -> Option<Self> {
        if word & 0x7f != OPCODE_CUSTOM0 {
            return None;
        }
        Some(Self {
            function_id: ((word >> 12) & 0x7) as u8,
            sub_function: ((word >> 25) & 0x7f) as u8,
            rd: ((word >> 7) & 0x1f) as u8,
            rs1: ((word >> 15) & 0x1f) as u8,
            rs2: ((word >> 20) & 0x1f) as u8,
        })
    }
}
