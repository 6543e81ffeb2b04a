//! Structural IR (SIR) node types and a human-readable formatter (spec §3,
//! §4.3). SIR is a tree: statements, expressions, and function/conditional
//! nodes, every node carrying the source `lineno` it was parsed from (spec
//! §9's lineno-propagation note -- a lowering helper that synthesizes a node
//! must copy its parent's line).

use std::fmt;

use serde::{Deserialize, Serialize};

/// SIR value types (spec §3). Integers and byte arrays coerce to each other
/// only via an explicit [`SirNode::Cast`]; every other coercion fails type
/// checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SirType {
    Integer,
    ByteArray,
    /// An expression whose type has not yet been resolved.
    Expr,
    Symbol,
    /// An assumed stack input -- the type of a `StackItem` symbol.
    StackItem,
    Func,
    /// The type bound to a function parameter at a call site, before the
    /// optimizer has resolved the argument to a concrete type (spec §4.3's
    /// inlining contract: "binding each formal parameter ... with `FuncArg`
    /// type").
    FuncArg,
}

impl fmt::Display for SirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SirType::Integer => "Integer",
            SirType::ByteArray => "ByteArray",
            SirType::Expr => "Expr",
            SirType::Symbol => "Symbol",
            SirType::StackItem => "StackItem",
            SirType::Func => "Func",
            SirType::FuncArg => "FuncArg",
        };
        f.write_str(s)
    }
}

/// One formal argument of a [`SirNode::Function`] declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArg {
    pub name: String,
    pub ty: SirType,
}

/// A node in the Structural IR tree (spec §3's "SIR node variants"). Tagged
/// union over every statement/expression kind the SIR optimizer and lowering
/// pass operate on. Every variant carries `lineno` either directly or
/// through the containing `SirNode` wrapper -- see [`Node`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SirNode {
    Int(i64),
    Bytes(Vec<u8>),
    Symbol(String),
    Declaration {
        name: String,
        value: Box<Node>,
        ty: SirType,
        mutable: bool,
    },
    Assignment {
        name: String,
        value: Box<Node>,
        ty: SirType,
    },
    Deletion(String),
    If {
        test: Box<Node>,
        truebranch: Vec<Node>,
        falsebranch: Vec<Node>,
    },
    Function {
        name: String,
        return_type: SirType,
        args: Vec<FunctionArg>,
        body: Vec<Node>,
    },
    FunctionCall {
        name: String,
        args: Vec<Node>,
    },
    Return(Box<Node>),
    Push(Box<Node>),
    InnerScript(Vec<Node>),
    Cast {
        value: Box<Node>,
        as_type: SirType,
    },
    VerifyOpCode {
        name: String,
        test: Box<Node>,
    },
    UnaryOpCode {
        name: String,
        operand: Box<Node>,
    },
    BinOpCode {
        name: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    VariableArgsOpCode {
        name: String,
        operands: Vec<Node>,
    },
    Script(Vec<Node>),
}

/// A [`SirNode`] paired with the source line it started on. Every SIR tree
/// node is one of these -- the wrapper exists so `lineno` is a single field
/// rather than threaded through every variant by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: SirNode,
    pub lineno: u32,
}

impl Node {
    pub fn new(kind: SirNode, lineno: u32) -> Self {
        Node { kind, lineno }
    }

    /// Synthesizes a node inheriting `lineno` from `parent`, per spec §9.
    pub fn derived_from(kind: SirNode, parent: &Node) -> Self {
        Node {
            kind,
            lineno: parent.lineno,
        }
    }

    /// `true` for the two literal kinds the constant folder can fold,
    /// per spec §4.3.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, SirNode::Int(_) | SirNode::Bytes(_))
    }
}

/// Renders a SIR tree back to a human-readable approximation of TxScript
/// source, the way the teacher's graph formatter renders a program back to a
/// readable tree dump.
pub fn format_node(node: &Node) -> String {
    match &node.kind {
        SirNode::Int(n) => n.to_string(),
        SirNode::Bytes(b) => format!("0x{}", hex_encode(b)),
        SirNode::Symbol(name) => name.clone(),
        SirNode::Declaration {
            name,
            value,
            mutable,
            ..
        } => {
            let kw = if *mutable { "let" } else { "const" };
            format!("{kw} {name} = {};", format_node(value))
        }
        SirNode::Assignment { name, value, .. } => {
            format!("{name} = {};", format_node(value))
        }
        SirNode::Deletion(name) => format!("del {name};"),
        SirNode::If {
            test,
            truebranch,
            falsebranch,
        } => {
            let t = truebranch.iter().map(format_node).collect::<Vec<_>>().join(" ");
            if falsebranch.is_empty() {
                format!("if ({}) {{ {t} }}", format_node(test))
            } else {
                let f = falsebranch.iter().map(format_node).collect::<Vec<_>>().join(" ");
                format!("if ({}) {{ {t} }} else {{ {f} }}", format_node(test))
            }
        }
        SirNode::Function {
            name,
            args,
            body,
            ..
        } => {
            let arglist = args
                .iter()
                .map(|a| format!("{}: {}", a.name, a.ty))
                .collect::<Vec<_>>()
                .join(", ");
            let b = body.iter().map(format_node).collect::<Vec<_>>().join(" ");
            format!("fn {name}({arglist}) {{ {b} }}")
        }
        SirNode::FunctionCall { name, args } => {
            let a = args.iter().map(format_node).collect::<Vec<_>>().join(", ");
            format!("{name}({a})")
        }
        SirNode::Return(v) => format!("return {};", format_node(v)),
        SirNode::Push(v) => format!("push({})", format_node(v)),
        SirNode::InnerScript(stmts) => {
            let s = stmts.iter().map(format_node).collect::<Vec<_>>().join(" ");
            format!("script {{ {s} }}")
        }
        SirNode::Cast { value, as_type } => format!("cast({}, {})", format_node(value), as_type),
        SirNode::VerifyOpCode { name, test } => format!("verify {name}({})", format_node(test)),
        SirNode::UnaryOpCode { name, operand } => format!("{name}({})", format_node(operand)),
        SirNode::BinOpCode { name, left, right } => {
            format!("{name}({}, {})", format_node(left), format_node(right))
        }
        SirNode::VariableArgsOpCode { name, operands } => {
            let a = operands.iter().map(format_node).collect::<Vec<_>>().join(", ");
            format!("{name}({a})")
        }
        SirNode::Script(stmts) => stmts.iter().map(format_node).collect::<Vec<_>>().join("\n"),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(kind: SirNode) -> Node {
        Node::new(kind, 1)
    }

    #[test]
    fn derived_from_copies_lineno() {
        let parent = Node::new(SirNode::Int(1), 42);
        let child = Node::derived_from(SirNode::Int(2), &parent);
        assert_eq!(child.lineno, 42);
    }

    #[test]
    fn is_constant_true_for_int_and_bytes() {
        assert!(n(SirNode::Int(1)).is_constant());
        assert!(n(SirNode::Bytes(vec![1, 2])).is_constant());
        assert!(!n(SirNode::Symbol("a".into())).is_constant());
    }

    #[test]
    fn format_binop() {
        let node = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(n(SirNode::Int(2))),
            right: Box::new(n(SirNode::Int(3))),
        });
        assert_eq!(format_node(&node), "OP_ADD(2, 3)");
    }

    #[test]
    fn format_bytes_as_hex() {
        let node = n(SirNode::Bytes(vec![0x11, 0x22]));
        assert_eq!(format_node(&node), "0x1122");
    }

    #[test]
    fn format_if_without_else() {
        let node = n(SirNode::If {
            test: Box::new(n(SirNode::Symbol("a".into()))),
            truebranch: vec![n(SirNode::Push(Box::new(n(SirNode::Int(1)))))],
            falsebranch: vec![],
        });
        assert_eq!(format_node(&node), "if (a) { push(1) }");
    }
}
