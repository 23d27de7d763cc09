//! Command protocol abstraction
//!
//! Every interaction with the accelerator is one
//! `dispatch(function_id, sub_function, a, b) -> result` call. Hardware and
//! software bindings implement the same trait so the scheduler and the
//! equivalence harness never know which one they are driving.

use crate::backends::HardwareCfu;
use crate::config::{AcceleratorConfig, BindingSelection};
use crate::error::Result;
use crate::model::AcceleratorModel;
use cfu_chip::funct;
use std::fmt::{self, Debug};

/// Command protocol binding - one custom-instruction channel into the CFU
pub trait CommandProtocol: Debug + Send {
    /// Issue one command and return its result word.
    ///
    /// `function_id` is 3 bits wide and `sub_function` 7 bits; higher bits
    /// are ignored, exactly as the instruction encoding drops them.
    fn dispatch(&mut self, function_id: u8, sub_function: u8, a: u32, b: u32) -> u32;

    /// Get binding type for logging and reports
    fn binding_type(&self) -> BindingType;
}

impl<P: CommandProtocol + ?Sized> CommandProtocol for Box<P> {
    fn dispatch(&mut self, function_id: u8, sub_function: u8, a: u32, b: u32) -> u32 {
        (**self).dispatch(function_id, sub_function, a, b)
    }

    fn binding_type(&self) -> BindingType {
        (**self).binding_type()
    }
}

/// Binding type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// Custom instruction executed by the CPU
    Hardware,

    /// Software twin (`AcceleratorModel`)
    Software,

    /// Closure-backed binding, typically a reference implementation
    Function,
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "Hardware (CUSTOM-0)"),
            Self::Software => write!(f, "Software (AcceleratorModel)"),
            Self::Function => write!(f, "Function"),
        }
    }
}

/// One request on the command protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    /// Protocol channel (0..=7)
    pub function_id: u8,
    /// Register or action within the channel (0..=127)
    pub sub_function: u8,
    /// First operand
    pub a: u32,
    /// Second operand
    pub b: u32,
}

impl Command {
    /// Build a command. Field widths are checked in debug builds only.
    pub fn new(function_id: u8, sub_function: u8, a: u32, b: u32) -> Self {
        debug_assert!(function_id < 8, "function_id {function_id} exceeds 3 bits");
        debug_assert!(sub_function < 128, "sub_function {sub_function} exceeds 7 bits");
        Self { function_id, sub_function, a, b }
    }

    /// Control-plane command (function 0).
    pub fn control(sub_function: u8, a: u32, b: u32) -> Self {
        Self::new(funct::FN_CONTROL, sub_function, a, b)
    }

    /// Issue this command on a binding.
    pub fn issue(&self, binding: &mut (impl CommandProtocol + ?Sized)) -> u32 {
        binding.dispatch(self.function_id, self.sub_function, self.a, self.b)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cfu_op{}({:3}, 0x{:08x}, 0x{:08x})",
            self.function_id, self.sub_function, self.a, self.b
        )
    }
}

/// Binding backed by a plain function of the command.
///
/// Used to put an independent reference implementation on one side of the
/// equivalence harness.
pub struct FnBinding<F> {
    name: &'static str,
    f: F,
}

impl<F> FnBinding<F>
where
    F: FnMut(Command) -> u32 + Send,
{
    /// Wrap `f` under a display name.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Debug for FnBinding<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBinding").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<F> CommandProtocol for FnBinding<F>
where
    F: FnMut(Command) -> u32 + Send,
{
    fn dispatch(&mut self, function_id: u8, sub_function: u8, a: u32, b: u32) -> u32 {
        (self.f)(Command {
            function_id: function_id & 0x7,
            sub_function: sub_function & 0x7f,
            a,
            b,
        })
    }

    fn binding_type(&self) -> BindingType {
        BindingType::Function
    }
}

/// Select a binding according to `selection`
///
/// `Auto` prefers the custom instruction and falls back to a software twin
/// built with `config`.
///
/// # Errors
///
/// Returns error if `Hardware` is forced on a target without the custom
/// instruction, or if `config` is invalid.
pub fn select_binding(
    selection: BindingSelection,
    config: AcceleratorConfig,
) -> Result<Box<dyn CommandProtocol>> {
    match selection {
        BindingSelection::Auto => {
            if let Ok(hw) = HardwareCfu::open() {
                tracing::info!("Using hardware CFU binding");
                return Ok(Box::new(hw));
            }
            tracing::info!("Custom instruction unavailable, using software twin");
            AcceleratorModel::with_config(config).map(|m| Box::new(m) as Box<dyn CommandProtocol>)
        }

        BindingSelection::Hardware => {
            HardwareCfu::open().map(|hw| Box::new(hw) as Box<dyn CommandProtocol>)
        }

        BindingSelection::Software => {
            AcceleratorModel::with_config(config).map(|m| Box::new(m) as Box<dyn CommandProtocol>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_display_is_rerunnable() {
        let cmd = Command::new(7, 0, 0x8000_0000, 1);
        assert_eq!(cmd.to_string(), "cfu_op7(  0, 0x80000000, 0x00000001)");
    }

    #[test]
    fn fn_binding_masks_fields() {
        let mut b = FnBinding::new("echo", |c: Command| {
            u32::from(c.function_id) << 8 | u32::from(c.sub_function)
        });
        assert_eq!(b.dispatch(0xff, 0xff, 0, 0), 0x7 << 8 | 0x7f);
        assert_eq!(b.binding_type(), BindingType::Function);
    }

    #[test]
    fn software_selection_always_succeeds() {
        let b = select_binding(BindingSelection::Software, AcceleratorConfig::default()).unwrap();
        assert_eq!(b.binding_type(), BindingType::Software);
    }
}
