//! Linear IR (LIR) node types (spec §3, §4.5).
//!
//! LIR is an ordered list of opcodes, pushes, assumptions, and variable
//! references. Every node gets an `idx` once the contextualizer (in
//! `txsc-ir`) makes its pass; before that `idx` is `0` and unused.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One instruction in the Linear IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LirNode {
    /// A literal data push.
    Push { data: Vec<u8> },
    /// `OP_0`..`OP_16`, carrying its integer value.
    SmallIntOpCode { value: i32, name: String },
    /// A fixed/runtime opcode. `args`/`delta` start as the table's static
    /// values and are overwritten by the contextualizer for
    /// runtime-dependent opcodes (`CheckMultiSig`, `IfDup`, `Pick`, `Roll`).
    OpCode {
        name: String,
        args: SmallVec<[i32; 4]>,
        delta: Option<i32>,
        verifier: bool,
    },
    /// A read of an assumed stack input -- the value is "already there", not
    /// pushed by this program.
    Assumption { var_name: String },
    /// A read of a user-declared variable (inlined away before emission).
    Variable { symbol_name: String },
    Declaration { name: String, mutable: bool },
    Assignment { name: String },
    Deletion { name: String },
    /// An embedded script, later encoded as a single data push by the
    /// emitter (spec §4.4's "single `InnerScript(ops)` node").
    InnerScript { ops: Vec<LirNode> },
    If,
    NotIf,
    Else,
    EndIf,
}

impl LirNode {
    /// The net stack effect of this single instruction, where known. `If`/
    /// `NotIf` pop their test value; `Else`/`EndIf` have no effect of their
    /// own (the branch bodies they bracket carry the effect).
    pub fn static_delta(&self) -> Option<i32> {
        match self {
            LirNode::Push { .. } => Some(1),
            LirNode::SmallIntOpCode { .. } => Some(1),
            LirNode::OpCode { delta, .. } => *delta,
            LirNode::Assumption { .. } => Some(0),
            LirNode::Variable { .. } => Some(0),
            LirNode::Declaration { .. } | LirNode::Assignment { .. } | LirNode::Deletion { .. } => {
                Some(0)
            }
            LirNode::InnerScript { .. } => Some(1),
            LirNode::If | LirNode::NotIf => Some(-1),
            LirNode::Else | LirNode::EndIf => Some(0),
        }
    }

    pub fn is_conditional_marker(&self) -> bool {
        matches!(self, LirNode::If | LirNode::NotIf | LirNode::Else | LirNode::EndIf)
    }

    pub fn opcode_name(&self) -> Option<&str> {
        match self {
            LirNode::OpCode { name, .. } => Some(name.as_str()),
            LirNode::SmallIntOpCode { name, .. } => Some(name.as_str()),
            LirNode::If => Some("OP_IF"),
            LirNode::NotIf => Some("OP_NOTIF"),
            LirNode::Else => Some("OP_ELSE"),
            LirNode::EndIf => Some("OP_ENDIF"),
            _ => None,
        }
    }
}

/// A single instruction together with its contextualizer-assigned index
/// (spec §3's "Every LIR node has an integer `idx` set by the
/// contextualizer").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub idx: usize,
    pub node: LirNode,
}

/// One nesting level of a conditional, built by the contextualizer walking
/// `If`/`NotIf`/`Else`/`EndIf` markers (spec §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranch {
    pub is_truebranch: bool,
    pub start: usize,
    pub end: usize,
    pub nest_level: u32,
    /// Index of the matching opposite branch (true branch's `orelse` is the
    /// false branch and vice versa), if the conditional has both.
    pub orelse: Option<usize>,
}

/// The complete contextualized program: the flat instruction list plus the
/// per-op metadata the contextualizer derives from it (spec §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LirProgram {
    pub instrs: Vec<Instr>,
    pub assumptions: IndexMap<String, Vec<usize>>,
    pub assignments: IndexMap<String, Vec<usize>>,
    pub variables: IndexMap<String, Vec<usize>>,
    pub branches: Vec<ConditionalBranch>,
    /// Assumptions that must be routed through the alt stack because they
    /// are still referenced after a conditional whose branches have unequal
    /// net deltas (spec §4.5, §4.8).
    pub altstack_assumptions: Vec<String>,
    /// `(idx, var_name)` pairs where an op consumed the same assumption
    /// twice from its top two stack slots (spec §4.5's "duplicate-use
    /// assumptions").
    pub duplicate_uses: Vec<(usize, String)>,
}

impl LirProgram {
    pub fn from_nodes(nodes: Vec<LirNode>) -> Self {
        LirProgram {
            instrs: nodes
                .into_iter()
                .enumerate()
                .map(|(idx, node)| Instr { idx, node })
                .collect(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_delta_for_push_and_opcode() {
        assert_eq!(LirNode::Push { data: vec![1] }.static_delta(), Some(1));
        let add = LirNode::OpCode {
            name: "OP_ADD".into(),
            args: SmallVec::from_slice(&[1, 2]),
            delta: Some(-1),
            verifier: false,
        };
        assert_eq!(add.static_delta(), Some(-1));
    }

    #[test]
    fn conditional_markers_detected() {
        assert!(LirNode::If.is_conditional_marker());
        assert!(LirNode::EndIf.is_conditional_marker());
        assert!(!LirNode::Push { data: vec![] }.is_conditional_marker());
    }

    #[test]
    fn from_nodes_assigns_sequential_idx() {
        let prog = LirProgram::from_nodes(vec![LirNode::If, LirNode::EndIf]);
        assert_eq!(prog.instrs[0].idx, 0);
        assert_eq!(prog.instrs[1].idx, 1);
        assert_eq!(prog.len(), 2);
    }
}
