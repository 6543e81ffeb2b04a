//! The directive/config surface (spec §6), `txsc_core::options::CompileOptions`.
//!
//! Defaults are recovered from the original `txsc` project's
//! `config.py` (see SPEC_FULL.md §1.3): optimization 2 (peephole + SIR
//! folding), verbosity 0, and alt-stack routing for post-uneven-conditional
//! assumptions on by default.

use serde::{Deserialize, Serialize};

/// `optimization` level (spec §6): 0 disables the peephole optimizer
/// entirely, 1 runs peephole only, 2 additionally folds SIR expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptLevel {
    None = 0,
    Peephole = 1,
    Full = 2,
}

impl Default for OptLevel {
    fn default() -> Self {
        OptLevel::Full
    }
}

impl OptLevel {
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(OptLevel::None),
            1 => Some(OptLevel::Peephole),
            2 => Some(OptLevel::Full),
            _ => None,
        }
    }

    pub fn runs_peephole(self) -> bool {
        self >= OptLevel::Peephole
    }

    pub fn folds_sir(self) -> bool {
        self >= OptLevel::Full
    }
}

/// `verbosity` level (spec §6): controls which intermediate dumps are
/// produced. 0 = errors only ... 3 = trace every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verbosity {
    Errors = 0,
    Warnings = 1,
    Info = 2,
    Trace = 3,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Errors
    }
}

impl Verbosity {
    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Verbosity::Errors),
            1 => Some(Verbosity::Warnings),
            2 => Some(Verbosity::Info),
            3 => Some(Verbosity::Trace),
            _ => None,
        }
    }
}

/// The complete options table of spec §6, shared by the SIR optimizer, the
/// lowering pass, and the contextualizer/inliner loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub optimization: OptLevel,
    pub verbosity: Verbosity,
    pub strict_num: bool,
    pub implicit_pushes: bool,
    pub allow_invalid_comparisons: bool,
    pub use_altstack_for_assumptions: bool,
    pub opcode_set: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            optimization: OptLevel::Full,
            verbosity: Verbosity::Errors,
            strict_num: false,
            implicit_pushes: false,
            allow_invalid_comparisons: false,
            use_altstack_for_assumptions: true,
            opcode_set: "default".to_string(),
        }
    }
}

impl CompileOptions {
    /// Applies a single `#txsc: key = value` directive (spec: in-source
    /// directives override compiler options). Returns `Err(key)` for an
    /// unrecognized key so the caller can raise `CompileError::Directive`.
    pub fn apply_directive(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "optimization" => {
                let n: u8 = value.parse().map_err(|_| key.to_string())?;
                self.optimization = OptLevel::from_u8(n).ok_or_else(|| key.to_string())?;
            }
            "verbosity" => {
                let n: u8 = value.parse().map_err(|_| key.to_string())?;
                self.verbosity = Verbosity::from_u8(n).ok_or_else(|| key.to_string())?;
            }
            "strict_num" => self.strict_num = parse_bool(value).ok_or_else(|| key.to_string())?,
            "implicit_pushes" => {
                self.implicit_pushes = parse_bool(value).ok_or_else(|| key.to_string())?
            }
            "allow_invalid_comparisons" => {
                self.allow_invalid_comparisons = parse_bool(value).ok_or_else(|| key.to_string())?
            }
            "use_altstack_for_assumptions" => {
                self.use_altstack_for_assumptions = parse_bool(value).ok_or_else(|| key.to_string())?
            }
            "opcode_set" => self.opcode_set = value.to_string(),
            _ => return Err(key.to_string()),
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
