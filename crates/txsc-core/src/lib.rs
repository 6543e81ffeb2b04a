//! Shared data model for the `txsc` Bitcoin script compiler: the opcode
//! descriptor table, the Structural and Linear IR node types, the scoped
//! symbol table, the error taxonomy, and the compile-time options surface.
//!
//! This crate has no dependents within the workspace -- it is the vocabulary
//! every other crate shares.

pub mod error;
pub mod lir;
pub mod opcode;
pub mod options;
pub mod sir;
pub mod symtab;

pub use error::{CompileError, SymbolError};
pub use lir::{ConditionalBranch, Instr, LirNode, LirProgram};
pub use opcode::{set_opcode_set, table, DefaultOpcodeSet, OpDescriptor, OpcodeSet, OpcodeTable};
pub use options::{CompileOptions, OptLevel, Verbosity};
pub use sir::{format_node, FunctionArg, Node, SirNode, SirType};
pub use symtab::{Scope, ScopeKind, Symbol, SymbolTable, STACK_NAMES_KEY};
