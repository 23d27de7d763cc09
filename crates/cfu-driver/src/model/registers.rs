//! Scalar configuration registers.

use cfu_chip::funct;

/// One named scalar in the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Input depth in 32-bit words per pixel
    InputDepthWords,
    /// Total output channels of the layer
    OutputDepth,
    /// Added to each input lane before multiplication
    InputOffset,
    /// Added to each requantized output
    OutputOffset,
    /// Lower clamp bound
    ActivationMin,
    /// Upper clamp bound
    ActivationMax,
    /// Channels per batch
    OutputBatchSize,
}

impl Register {
    /// All registers, in register-file order.
    pub const ALL: [Self; 7] = [
        Self::InputDepthWords,
        Self::OutputDepth,
        Self::InputOffset,
        Self::OutputOffset,
        Self::ActivationMin,
        Self::ActivationMax,
        Self::OutputBatchSize,
    ];

    /// Register written by a `SET_*` sub-function.
    pub fn from_set(sub_function: u8) -> Option<Self> {
        match sub_function {
            funct::SET_INPUT_DEPTH_WORDS => Some(Self::InputDepthWords),
            funct::SET_OUTPUT_DEPTH => Some(Self::OutputDepth),
            funct::SET_INPUT_OFFSET => Some(Self::InputOffset),
            funct::SET_OUTPUT_OFFSET => Some(Self::OutputOffset),
            funct::SET_ACTIVATION_MIN => Some(Self::ActivationMin),
            funct::SET_ACTIVATION_MAX => Some(Self::ActivationMax),
            funct::SET_OUTPUT_BATCH_SIZE => Some(Self::OutputBatchSize),
            _ => None,
        }
    }

    /// Register read by a `GET_*` sub-function.
    pub fn from_get(sub_function: u8) -> Option<Self> {
        match sub_function {
            funct::GET_INPUT_DEPTH_WORDS => Some(Self::InputDepthWords),
            funct::GET_OUTPUT_DEPTH => Some(Self::OutputDepth),
            funct::GET_INPUT_OFFSET => Some(Self::InputOffset),
            funct::GET_OUTPUT_OFFSET => Some(Self::OutputOffset),
            funct::GET_ACTIVATION_MIN => Some(Self::ActivationMin),
            funct::GET_ACTIVATION_MAX => Some(Self::ActivationMax),
            funct::GET_OUTPUT_BATCH_SIZE => Some(Self::OutputBatchSize),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Raw 32-bit register values. Signed registers are reinterpreted on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterFile {
    values: [u32; 7],
}

impl RegisterFile {
    /// Write a register, returning the value it held before.
    ///
    /// The gateware setters answer with the previous value; the twin does the same.
    pub fn set(&mut self, reg: Register, value: u32) -> u32 {
        std::mem::replace(&mut self.values[reg.index()], value)
    }

    /// Raw register value.
    pub fn get(&self, reg: Register) -> u32 {
        self.values[reg.index()]
    }

    /// Zero every register.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Input depth in words.
    pub fn input_depth_words(&self) -> usize {
        self.get(Register::InputDepthWords) as usize
    }

    /// Channels per batch.
    pub fn output_batch_size(&self) -> usize {
        self.get(Register::OutputBatchSize) as usize
    }

    /// Input offset, signed.
    #[allow(clippy::cast_possible_wrap)]
    pub fn input_offset(&self) -> i32 {
        self.get(Register::InputOffset) as i32
    }

    /// Output offset, signed.
    #[allow(clippy::cast_possible_wrap)]
    pub fn output_offset(&self) -> i32 {
        self.get(Register::OutputOffset) as i32
    }

    /// Lower clamp bound, signed.
    #[allow(clippy::cast_possible_wrap)]
    pub fn activation_min(&self) -> i32 {
        self.get(Register::ActivationMin) as i32
    }

    /// Upper clamp bound, signed.
    #[allow(clippy::cast_possible_wrap)]
    pub fn activation_max(&self) -> i32 {
        self.get(Register::ActivationMax) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous() {
        let mut regs = RegisterFile::default();
        assert_eq!(regs.set(Register::OutputOffset, 7), 0);
        assert_eq!(regs.set(Register::OutputOffset, 9), 7);
        assert_eq!(regs.get(Register::OutputOffset), 9);
    }

    #[test]
    fn signed_views() {
        let mut regs = RegisterFile::default();
        regs.set(Register::ActivationMin, (-128_i32) as u32);
        assert_eq!(regs.activation_min(), -128);
    }

    #[test]
    fn set_and_get_maps_agree() {
        for reg in Register::ALL {
            let set = (0..128).find(|s| Register::from_set(*s) == Some(reg));
            let get = (0..128).find(|s| Register::from_get(*s) == Some(reg));
            assert!(set.is_some() && get.is_some(), "{reg:?} not fully mapped");
        }
    }
}
