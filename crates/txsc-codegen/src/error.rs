//! Codegen error types: the compile pipeline's own failure and whatever
//! `CompileError` the parse/optimize/lower stages it drives raised.

use txsc_core::CompileError;

/// Errors that can occur while driving a complete parse-optimize-lower-emit
/// pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// A parsing, IR, directive, or type failure from the core pipeline.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The emitter was handed an opcode name its numeric table does not
    /// know, or an `LirNode` variant that should never survive to emission
    /// (`Assumption`/`Variable`/`Declaration`/`Assignment`/`Deletion` --
    /// these only exist before the inliner has run to completion).
    #[error("emission error: {0}")]
    Emit(String),
}
