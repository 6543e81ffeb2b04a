//! SIR -> LIR lowering (spec §4.4): a tree walk that flattens an optimized
//! SIR statement list into the ordered [`LirNode`] list the contextualizer
//! consumes next. Every `FunctionCall`/`Function`/`Return` node must already
//! be gone by the time this runs -- the optimizer inlines and drops them.

use txsc_core::{opcode, CompileError, LirNode, Node, SirNode, SirType, SymbolTable};

/// Lowers an optimized top-level statement list.
pub fn lower_script(stmts: &[Node], symtab: &SymbolTable) -> Result<Vec<LirNode>, CompileError> {
    lower_stmts(stmts, symtab)
}

fn lower_stmts(stmts: &[Node], symtab: &SymbolTable) -> Result<Vec<LirNode>, CompileError> {
    let mut out = Vec::new();
    for stmt in stmts {
        out.extend(lower_stmt(stmt, symtab)?);
    }
    Ok(out)
}

fn lower_stmt(stmt: &Node, symtab: &SymbolTable) -> Result<Vec<LirNode>, CompileError> {
    let lineno = stmt.lineno;
    match &stmt.kind {
        SirNode::Declaration { name, value, mutable, .. } => {
            let mut ops = lower_expr(value, symtab)?;
            ops.push(LirNode::Declaration {
                name: name.clone(),
                mutable: *mutable,
            });
            Ok(ops)
        }
        SirNode::Assignment { name, value, .. } => {
            let mut ops = lower_expr(value, symtab)?;
            ops.push(LirNode::Assignment { name: name.clone() });
            Ok(ops)
        }
        SirNode::Deletion(name) => Ok(vec![LirNode::Deletion { name: name.clone() }]),
        SirNode::If { test, truebranch, falsebranch } => {
            let mut ops = lower_expr(test, symtab)?;
            ops.push(LirNode::If);
            ops.extend(lower_stmts(truebranch, symtab)?);
            if !falsebranch.is_empty() {
                ops.push(LirNode::Else);
                ops.extend(lower_stmts(falsebranch, symtab)?);
            }
            ops.push(LirNode::EndIf);
            Ok(ops)
        }
        SirNode::Push(expr) => lower_expr(expr, symtab),
        SirNode::InnerScript(stmts) => {
            let ops = lower_stmts(stmts, symtab)?;
            Ok(vec![LirNode::InnerScript { ops }])
        }
        SirNode::VerifyOpCode { name, test } => {
            let mut ops = lower_expr(test, symtab)?;
            ops.push(opcode_node(name, lineno)?);
            Ok(ops)
        }
        SirNode::Script(stmts) => lower_stmts(stmts, symtab),
        SirNode::Function { .. } => Ok(Vec::new()),
        other => Err(CompileError::Ir {
            line: lineno,
            message: format!("{other:?} cannot appear as a statement after optimization"),
        }),
    }
}

fn lower_expr(node: &Node, symtab: &SymbolTable) -> Result<Vec<LirNode>, CompileError> {
    let lineno = node.lineno;
    match &node.kind {
        SirNode::Int(n) => Ok(vec![int_push(*n)]),
        SirNode::Bytes(b) => Ok(vec![LirNode::Push { data: b.clone() }]),
        SirNode::Symbol(name) => {
            let sym = symtab.lookup(name, false).ok_or_else(|| CompileError::Ir {
                line: lineno,
                message: format!("'{name}' was never declared"),
            })?;
            if sym.ty == SirType::StackItem {
                Ok(vec![LirNode::Assumption { var_name: name.clone() }])
            } else {
                Ok(vec![LirNode::Variable { symbol_name: name.clone() }])
            }
        }
        SirNode::Cast { value, .. } => lower_expr(value, symtab),
        SirNode::UnaryOpCode { name, operand } => {
            let mut ops = lower_expr(operand, symtab)?;
            ops.push(opcode_node(name, lineno)?);
            Ok(ops)
        }
        SirNode::BinOpCode { name, left, right } => {
            let mut ops = lower_expr(left, symtab)?;
            ops.extend(lower_expr(right, symtab)?);
            ops.push(opcode_node(name, lineno)?);
            Ok(ops)
        }
        SirNode::VariableArgsOpCode { name, operands } => {
            let mut ops = Vec::new();
            for operand in operands {
                ops.extend(lower_expr(operand, symtab)?);
            }
            ops.push(opcode_node(name, lineno)?);
            Ok(ops)
        }
        other => Err(CompileError::Ir {
            line: lineno,
            message: format!("{other:?} cannot appear as an expression after optimization"),
        }),
    }
}

/// Pushes `n` via its small-int opcode when one exists, a minimal-encoding
/// data push otherwise (spec §4.1's small-int range is `0..=16`).
fn int_push(n: i64) -> LirNode {
    if let Some(desc) = opcode::table().small_int_for(n) {
        LirNode::SmallIntOpCode {
            value: desc.value.expect("small_int_for only returns value-bearing descriptors"),
            name: desc.name.to_string(),
        }
    } else {
        LirNode::Push { data: crate::fold::int_to_bytes(n) }
    }
}

fn opcode_node(name: &str, lineno: u32) -> Result<LirNode, CompileError> {
    let desc = opcode::table().by_name(name).ok_or_else(|| CompileError::Ir {
        line: lineno,
        message: format!("unknown opcode '{name}'"),
    })?;
    Ok(LirNode::OpCode {
        name: desc.name.to_string(),
        args: desc.args.clone(),
        delta: desc.delta,
        verifier: desc.verifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsc_core::SirType;

    fn n(kind: SirNode) -> Node {
        Node::new(kind, 1)
    }

    #[test]
    fn lowers_small_int_push() {
        let symtab = SymbolTable::new();
        let ops = lower_script(&[n(SirNode::Push(Box::new(n(SirNode::Int(3)))))], &symtab).unwrap();
        assert_eq!(ops, vec![LirNode::SmallIntOpCode { value: 3, name: "OP_3".into() }]);
    }

    #[test]
    fn lowers_large_int_as_data_push() {
        let symtab = SymbolTable::new();
        let ops = lower_script(&[n(SirNode::Push(Box::new(n(SirNode::Int(1000)))))], &symtab).unwrap();
        assert_eq!(ops, vec![LirNode::Push { data: crate::fold::int_to_bytes(1000) }]);
    }

    #[test]
    fn lowers_assumption_symbol() {
        let mut symtab = SymbolTable::new();
        symtab.add_stack_assumptions(&["sig".into()]).unwrap();
        let ops = lower_script(&[n(SirNode::Push(Box::new(n(SirNode::Symbol("sig".into())))))], &symtab).unwrap();
        assert_eq!(ops, vec![LirNode::Assumption { var_name: "sig".into() }]);
    }

    #[test]
    fn lowers_variable_symbol() {
        let mut symtab = SymbolTable::new();
        symtab.declare("x", None, SirType::Expr, true).unwrap();
        let ops = lower_script(&[n(SirNode::Push(Box::new(n(SirNode::Symbol("x".into())))))], &symtab).unwrap();
        assert_eq!(ops, vec![LirNode::Variable { symbol_name: "x".into() }]);
    }

    #[test]
    fn lowers_binop_to_operand_order_then_opcode() {
        let symtab = SymbolTable::new();
        let expr = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(n(SirNode::Int(1))),
            right: Box::new(n(SirNode::Int(2))),
        });
        let ops = lower_script(&[n(SirNode::Push(Box::new(expr)))], &symtab).unwrap();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[2], LirNode::OpCode { ref name, .. } if name == "OP_ADD"));
    }

    #[test]
    fn lowers_if_else_with_markers() {
        let symtab = SymbolTable::new();
        let stmt = n(SirNode::If {
            test: Box::new(n(SirNode::Int(1))),
            truebranch: vec![n(SirNode::Push(Box::new(n(SirNode::Int(1)))))],
            falsebranch: vec![n(SirNode::Push(Box::new(n(SirNode::Int(0)))))],
        });
        let ops = lower_script(&[stmt], &symtab).unwrap();
        assert!(matches!(ops[1], LirNode::If));
        assert!(ops.iter().any(|o| matches!(o, LirNode::Else)));
        assert!(matches!(ops.last().unwrap(), LirNode::EndIf));
    }

    #[test]
    fn lowers_declaration_with_mutability() {
        let symtab = SymbolTable::new();
        let stmt = n(SirNode::Declaration {
            name: "a".into(),
            value: Box::new(n(SirNode::Int(1))),
            ty: SirType::Integer,
            mutable: true,
        });
        let ops = lower_script(&[stmt], &symtab).unwrap();
        assert_eq!(ops[1], LirNode::Declaration { name: "a".into(), mutable: true });
    }

    #[test]
    fn unknown_opcode_name_errors() {
        let symtab = SymbolTable::new();
        let expr = n(SirNode::UnaryOpCode { name: "OP_NOT_REAL".into(), operand: Box::new(n(SirNode::Int(1))) });
        let err = lower_script(&[n(SirNode::Push(Box::new(expr)))], &symtab).unwrap_err();
        assert!(matches!(err, CompileError::Ir { .. }));
    }
}
