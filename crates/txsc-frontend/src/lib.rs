//! Source-text front ends for the compiler.
//!
//! Moves a program between source text and the IR contract fixed by the
//! core: the three parsers (TxScript, ASM, raw byte-script) each deliver
//! either a `Script` SIR tree or an LIR list directly, per spec §6, and the
//! `directive` module applies in-source `#txsc: key = value` overrides to a
//! [`txsc_core::CompileOptions`].
//!
//! # Modules
//!
//! - [`txscript`]: hand-written lexer + recursive-descent parser producing a
//!   SIR `Script` tree.
//! - [`asm`]: whitespace-token ASM parser producing an LIR list directly.
//! - [`raw`]: Bitcoin push-data byte-script decoder producing an LIR list
//!   directly.
//! - [`directive`]: `#txsc:` in-source option overrides.

pub mod asm;
pub mod directive;
pub mod raw;
pub mod txscript;

pub use txscript::parse_script;
