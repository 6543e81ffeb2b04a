//! The IR pipeline: Structural IR optimization, SIR -> LIR lowering,
//! contextualization (stack-shape + alt-stack planning), variable inlining
//! and peephole optimization (spec §4.3-§4.9).
//!
//! [`compile_to_lir`] runs the whole pipeline end to end; callers that need
//! to stop partway (e.g. to dump an intermediate stage) can call the
//! individual passes directly.

pub mod altstack;
pub mod contextualize;
pub mod fold;
pub mod inline;
pub mod lower;
pub mod optimizer;
pub mod peephole;
pub mod stackstate;

#[cfg(test)]
pub mod contracts;

use txsc_core::{CompileError, CompileOptions, LirProgram, Node, SymbolTable};

pub use optimizer::SirOptimizer;

/// Runs the full SIR -> LIR pipeline over an already-parsed statement list:
/// SIR optimization, lowering, then the inliner's fixed-point loop (which
/// folds in peephole optimization and contextualization on every pass)
/// (spec §4).
pub fn compile_to_lir(
    stmts: Vec<Node>,
    symtab: &mut SymbolTable,
    options: &CompileOptions,
) -> Result<LirProgram, CompileError> {
    let optimized = SirOptimizer::new(symtab, options).optimize_script(stmts)?;
    let nodes = lower::lower_script(&optimized, symtab)?;
    let stack_names = symtab.stack_names();
    inline::inline_variables(nodes, &stack_names, options)
}
