//! Front-end-to-back-end orchestration for the `txsc` compiler (spec §6,
//! SPEC_FULL.md §10): picks a source parser by [`Dialect`], runs it through
//! the `txsc-ir` pipeline, then renders the result with a [`Target`]
//! emitter.
//!
//! # Modules
//!
//! - [`emit`] -- the hex and ASM target emitters (opcode numeric values are
//!   this crate's concern, not `txsc-core`'s).
//! - [`error`] -- [`error::CodegenError`], wrapping `txsc_core::CompileError`
//!   plus emission failures.

pub mod emit;
pub mod error;

use txsc_core::{CompileOptions, LirProgram, SymbolTable};

pub use error::CodegenError;

/// Which source parser to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// The high-level language: `txsc-frontend::txscript`.
    TxScript,
    /// Whitespace-token ASM: `txsc-frontend::asm`.
    Asm,
    /// Raw Bitcoin push-data byte-script: `txsc-frontend::raw`.
    Raw,
}

/// Which target emitter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Hex,
    Asm,
}

/// The rendered output of a complete pipeline run, plus enough of the
/// intermediate program to support a `dump` of the final LIR.
pub struct CompileOutput {
    pub text: String,
    pub lir: LirProgram,
}

/// Runs the complete pipeline: directives, parse, optimize/lower (TxScript)
/// or inline (ASM/raw), then emit.
///
/// `#txsc:` directives are scanned out of `source` first regardless of
/// dialect -- harmless on ASM/raw sources, which have no reason to contain
/// one, and required for TxScript sources that do.
pub fn compile(source: &str, dialect: Dialect, target: Target, options: &mut CompileOptions) -> Result<CompileOutput, CodegenError> {
    txsc_frontend::directive::apply_all(source, options)?;
    let lir = lower(source, dialect, options)?;
    let text = render(&lir, target)?;
    Ok(CompileOutput { text, lir })
}

/// Runs everything through lowering/inlining but stops short of emission,
/// for callers that want the final LIR (e.g. a CLI `dump` subcommand).
pub fn lower(source: &str, dialect: Dialect, options: &CompileOptions) -> Result<LirProgram, CodegenError> {
    let lir = match dialect {
        Dialect::TxScript => {
            let stmts = txsc_frontend::txscript::parse_script(source)?;
            let mut symtab = SymbolTable::new();
            txsc_ir::compile_to_lir(stmts, &mut symtab, options)?
        }
        Dialect::Asm => {
            let nodes = txsc_frontend::asm::parse(source)?;
            txsc_ir::inline::inline_variables(nodes, &[], options)?
        }
        Dialect::Raw => {
            let nodes = txsc_frontend::raw::decode(source)?;
            txsc_ir::inline::inline_variables(nodes, &[], options)?
        }
    };
    Ok(lir)
}

/// Renders an already-lowered program with the given target emitter.
pub fn render(lir: &LirProgram, target: Target) -> Result<String, CodegenError> {
    match target {
        Target::Hex => emit::hex::emit(lir),
        Target::Asm => emit::asm::emit(lir, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_then_render_agree_with_compile() {
        let mut options = CompileOptions::default();
        let lir = lower("DUP HASH160", Dialect::Asm, &options).unwrap();
        let rendered = render(&lir, Target::Hex).unwrap();
        let out = compile("DUP HASH160", Dialect::Asm, Target::Hex, &mut options).unwrap();
        assert_eq!(rendered, out.text);
    }
}
