//! Accelerator geometry and binding selection.
//!
//! Defaults come from the gateware build described in `cfu_chip::geometry`.
//! A smaller geometry is useful in tests that need to force batching; the
//! scheduler and the software twin must always be handed the same config.

use crate::error::{CfuError, Result};
use cfu_chip::geometry;
use std::fmt;
use std::str::FromStr;

/// Environment variable consulted by [`BindingSelection::from_env`].
pub const BINDING_ENV_VAR: &str = "CFU_BINDING";

/// Store capacities of one accelerator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceleratorConfig {
    /// Interleaved filter banks
    pub filter_banks: usize,
    /// Words per filter bank
    pub filter_bank_words: usize,
    /// Words per side of the input double buffer
    pub input_buffer_words: usize,
    /// Entries per param store
    pub param_capacity: usize,
    /// Words in the output queue
    pub output_queue_words: usize,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            filter_banks: geometry::NUM_FILTER_BANKS,
            filter_bank_words: geometry::FILTER_BANK_WORDS,
            input_buffer_words: geometry::INPUT_BUFFER_WORDS,
            param_capacity: geometry::PARAM_CAPACITY,
            output_queue_words: geometry::OUTPUT_QUEUE_WORDS,
        }
    }
}

impl AcceleratorConfig {
    /// Total filter store capacity in words.
    pub fn filter_capacity_words(&self) -> usize {
        self.filter_banks * self.filter_bank_words
    }

    /// Override the filter store geometry.
    #[must_use]
    pub fn with_filter_store(mut self, banks: usize, bank_words: usize) -> Self {
        self.filter_banks = banks;
        self.filter_bank_words = bank_words;
        self
    }

    /// Override words per input buffer side.
    #[must_use]
    pub fn with_input_buffer_words(mut self, words: usize) -> Self {
        self.input_buffer_words = words;
        self
    }

    /// Override param store depth.
    #[must_use]
    pub fn with_param_capacity(mut self, entries: usize) -> Self {
        self.param_capacity = entries;
        self
    }

    /// Override output queue depth.
    #[must_use]
    pub fn with_output_queue_words(mut self, words: usize) -> Self {
        self.output_queue_words = words;
        self
    }

    /// Check every store has non-zero capacity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first empty store.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("filter_banks", self.filter_banks),
            ("filter_bank_words", self.filter_bank_words),
            ("input_buffer_words", self.input_buffer_words),
            ("param_capacity", self.param_capacity),
            ("output_queue_words", self.output_queue_words),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(CfuError::invalid_config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Which command protocol binding to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingSelection {
    /// Hardware when the custom instruction exists, software otherwise
    #[default]
    Auto,

    /// Force the custom instruction
    Hardware,

    /// Force the software twin
    Software,
}

impl BindingSelection {
    /// Read the selection from `CFU_BINDING`, falling back to `Auto`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        match std::env::var(BINDING_ENV_VAR) {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("ignoring {BINDING_ENV_VAR}: {e}");
                Self::Auto
            }),
            Err(_) => Self::Auto,
        }
    }
}

impl FromStr for BindingSelection {
    type Err = CfuError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "hw" | "hardware" => Ok(Self::Hardware),
            "sw" | "software" => Ok(Self::Software),
            other => Err(CfuError::invalid_config(format!(
                "unknown binding '{other}' (expected auto, hw or sw)"
            ))),
        }
    }
}

impl fmt::Display for BindingSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Hardware => write!(f, "hardware"),
            Self::Software => write!(f, "software"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_gateware() {
        let cfg = AcceleratorConfig::default();
        assert_eq!(cfg.filter_capacity_words(), 2048);
        assert_eq!(cfg.input_buffer_words, 1024);
        assert_eq!(cfg.param_capacity, 512);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = AcceleratorConfig::default().with_param_capacity(0);
        assert!(matches!(cfg.validate(), Err(CfuError::InvalidConfig { .. })));
    }

    #[test]
    fn parse_binding_names() {
        assert_eq!("SW".parse::<BindingSelection>().unwrap(), BindingSelection::Software);
        assert_eq!("hardware".parse::<BindingSelection>().unwrap(), BindingSelection::Hardware);
        assert_eq!(" auto ".parse::<BindingSelection>().unwrap(), BindingSelection::Auto);
        assert!("fpga".parse::<BindingSelection>().is_err());
    }
}
