//! The SIR optimizer (spec §4.3): constant folding, symbol resolution,
//! commutativity and logical-equivalent rewriting, function inlining, and
//! type/strict-num checking. Walks the tree bottom-up, mutating nothing in
//! place -- every pass returns a (possibly rewritten) node.

use std::collections::HashMap;

use txsc_core::{
    opcode, CompileError, CompileOptions, Node, ScopeKind, SirNode, SirType, SymbolError,
    SymbolTable,
};

use crate::fold::{fold_binary, fold_unary, fold_within};

/// Opcodes commutative enough for operand-order rewriting (spec §4.3).
const COMMUTATIVE: &[&str] = &[
    "OP_ADD",
    "OP_MUL",
    "OP_BOOLAND",
    "OP_BOOLOR",
    "OP_AND",
    "OP_OR",
    "OP_XOR",
    "OP_EQUAL",
    "OP_EQUALVERIFY",
    "OP_NUMEQUAL",
    "OP_NUMEQUALVERIFY",
    "OP_NUMNOTEQUAL",
    "OP_MIN",
    "OP_MAX",
];

fn is_commutative(name: &str) -> bool {
    COMMUTATIVE.contains(&name)
}

/// Comparison opcodes with a logical mirror (spec §4.3's "logical
/// equivalents").
fn logical_mirror(name: &str) -> Option<&'static str> {
    match name {
        "OP_LESSTHAN" => Some("OP_GREATERTHAN"),
        "OP_GREATERTHAN" => Some("OP_LESSTHAN"),
        "OP_LESSTHANOREQUAL" => Some("OP_GREATERTHANOREQUAL"),
        "OP_GREATERTHANOREQUAL" => Some("OP_LESSTHANOREQUAL"),
        _ => None,
    }
}

/// Byte length of the minimally-encoded form of `v`, used by strict-num
/// policing (spec §4.3, §3's "Opcodes marked `arithmetic` expect
/// integer-shaped operands (<= 4 bytes) in strict mode").
fn int_byte_len(v: i64) -> usize {
    crate::fold::int_to_bytes(v).len()
}

/// Runs the SIR optimizer over a whole script, per spec §4.3 and §6's
/// `optimization` option (folding only runs at level 2; level 0/1 still run
/// symbol resolution and function inlining, since those aren't optional --
/// lowering requires every `FunctionCall` gone and the `_stack` assumptions
/// bound before it can run).
pub struct SirOptimizer<'a> {
    pub symtab: &'a mut SymbolTable,
    pub options: &'a CompileOptions,
    call_site: u32,
}

impl<'a> SirOptimizer<'a> {
    pub fn new(symtab: &'a mut SymbolTable, options: &'a CompileOptions) -> Self {
        SirOptimizer {
            symtab,
            options,
            call_site: 0,
        }
    }

    /// Runs the optimizer over a whole parsed script. Per spec §6, a parser
    /// delivers assumed stack inputs as a leading
    /// `Declaration(name="_stack", value=Bytes(joined names), type=Expr,
    /// mutable=false)` statement rather than a regular binding -- this is
    /// consumed here (bootstrapping the symbol table's `StackItem` symbols
    /// via [`SymbolTable::add_stack_assumptions`]) and does not reach
    /// lowering, which has no notion of it.
    pub fn optimize_script(&mut self, mut stmts: Vec<Node>) -> Result<Vec<Node>, CompileError> {
        if let Some(first) = stmts.first() {
            if let SirNode::Declaration { name, value, ty, mutable } = &first.kind {
                if name == "_stack" && *ty == SirType::Expr && !*mutable {
                    if let SirNode::Bytes(joined) = &value.kind {
                        let names: Vec<String> = if joined.is_empty() {
                            Vec::new()
                        } else {
                            String::from_utf8_lossy(joined)
                                .split(',')
                                .map(|s| s.to_string())
                                .collect()
                        };
                        let lineno = first.lineno;
                        self.symtab
                            .add_stack_assumptions(&names)
                            .map_err(|e| CompileError::from_symbol(e, lineno))?;
                        stmts.remove(0);
                    }
                }
            }
        }
        self.optimize_stmts(stmts)
    }

    fn optimize_stmts(&mut self, stmts: Vec<Node>) -> Result<Vec<Node>, CompileError> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            out.extend(self.optimize_stmt(stmt)?);
        }
        Ok(out)
    }

    /// Optimizes one statement. Returns a list because a constant-test `If`
    /// collapses to its live branch's statements (dead-branch elimination
    /// falls naturally out of constant folding).
    fn optimize_stmt(&mut self, stmt: Node) -> Result<Vec<Node>, CompileError> {
        let lineno = stmt.lineno;
        match stmt.kind {
            SirNode::Declaration {
                name,
                value,
                ty,
                mutable,
            } => {
                let value = self.optimize_expr(*value)?;
                let resolved_ty = if value.is_constant() { literal_ty(&value) } else { ty };
                self.symtab
                    .declare(&name, Some(value.clone()), resolved_ty, mutable)
                    .map_err(|e| CompileError::from_symbol(e, lineno))?;
                Ok(vec![Node::new(
                    SirNode::Declaration {
                        name,
                        value: Box::new(value),
                        ty: resolved_ty,
                        mutable,
                    },
                    lineno,
                )])
            }
            SirNode::Assignment { name, value, ty } => {
                let value = self.optimize_expr(*value)?;
                let resolved_ty = if value.is_constant() { literal_ty(&value) } else { ty };
                self.symtab
                    .assign(&name, value.clone(), resolved_ty)
                    .map_err(|e| CompileError::from_symbol(e, lineno))?;
                Ok(vec![Node::new(
                    SirNode::Assignment {
                        name,
                        value: Box::new(value),
                        ty: resolved_ty,
                    },
                    lineno,
                )])
            }
            SirNode::Deletion(name) => {
                // Open question (spec §9): deleting a constant-valued symbol
                // is left unspecified. Decision (see DESIGN.md): treat it as
                // a no-op rather than an error -- deletion only matters for
                // freeing an assumed stack slot from later reference checks,
                // and a constant symbol was never occupying one.
                match self.symtab.delete(&name, true) {
                    Ok(()) => {}
                    Err(SymbolError::Undeclared { .. }) => {}
                    Err(e) => return Err(CompileError::from_symbol(e, lineno)),
                }
                Ok(vec![Node::new(SirNode::Deletion(name), lineno)])
            }
            SirNode::If {
                test,
                truebranch,
                falsebranch,
            } => {
                let test = self.optimize_expr(*test)?;
                if let SirNode::Int(n) = test.kind {
                    self.symtab.begin_scope(ScopeKind::Conditional);
                    let chosen = if n != 0 { truebranch } else { falsebranch };
                    let optimized = self.optimize_stmts(chosen)?;
                    self.symtab.end_scope();
                    return Ok(optimized);
                }
                self.symtab.begin_scope(ScopeKind::Conditional);
                let truebranch = self.optimize_stmts(truebranch)?;
                self.symtab.end_scope();
                self.symtab.begin_scope(ScopeKind::Conditional);
                let falsebranch = self.optimize_stmts(falsebranch)?;
                self.symtab.end_scope();
                Ok(vec![Node::new(
                    SirNode::If {
                        test: Box::new(test),
                        truebranch,
                        falsebranch,
                    },
                    lineno,
                )])
            }
            SirNode::Function {
                name,
                return_type,
                args,
                body,
            } => {
                if self.symtab.depth() != 1 {
                    return Err(CompileError::Ir {
                        line: lineno,
                        message: format!("function '{name}' must be declared in the global scope"),
                    });
                }
                let returns = count_returns(&body);
                if returns == 0 {
                    return Err(CompileError::Ir {
                        line: lineno,
                        message: "Functions must have a return statement".to_string(),
                    });
                }
                if returns > 1 {
                    return Err(CompileError::Ir {
                        line: lineno,
                        message: "a function may only have one return statement".to_string(),
                    });
                }
                if implicit_push_in(&body) {
                    return Err(CompileError::Ir {
                        line: lineno,
                        message: format!("function '{name}' must not implicitly push"),
                    });
                }
                let def = Node::new(
                    SirNode::Function {
                        name: name.clone(),
                        return_type,
                        args,
                        body,
                    },
                    lineno,
                );
                self.symtab
                    .add_function_def(&name, def)
                    .map_err(|e| CompileError::from_symbol(e, lineno))?;
                Ok(Vec::new())
            }
            SirNode::Return(_) => Err(CompileError::Ir {
                line: lineno,
                message: "return statement outside of a function body".to_string(),
            }),
            SirNode::Push(expr) => {
                let expr = self.optimize_expr(*expr)?;
                Ok(vec![Node::new(SirNode::Push(Box::new(expr)), lineno)])
            }
            SirNode::InnerScript(stmts) => {
                let stmts = self.optimize_stmts(stmts)?;
                Ok(vec![Node::new(SirNode::InnerScript(stmts), lineno)])
            }
            SirNode::VerifyOpCode { name, test } => {
                let test = self.optimize_expr(*test)?;
                Ok(vec![Node::new(
                    SirNode::VerifyOpCode { name, test: Box::new(test) },
                    lineno,
                )])
            }
            SirNode::Script(stmts) => {
                let stmts = self.optimize_stmts(stmts)?;
                Ok(vec![Node::new(SirNode::Script(stmts), lineno)])
            }
            other @ (SirNode::Int(_)
            | SirNode::Bytes(_)
            | SirNode::Symbol(_)
            | SirNode::FunctionCall { .. }
            | SirNode::UnaryOpCode { .. }
            | SirNode::BinOpCode { .. }
            | SirNode::VariableArgsOpCode { .. }
            | SirNode::Cast { .. }) => {
                // A bare expression statement: implicit push, per spec §4.4.
                let expr = self.optimize_expr(Node::new(other, lineno))?;
                if !self.options.implicit_pushes {
                    return Err(CompileError::ImplicitPush { line: lineno });
                }
                tracing::warn!(line = lineno, "implicit push of expression result");
                Ok(vec![Node::new(SirNode::Push(Box::new(expr)), lineno)])
            }
        }
    }

    /// Optimizes one expression node bottom-up: children first, then this
    /// node's own folding/resolution/rewriting.
    fn optimize_expr(&mut self, node: Node) -> Result<Node, CompileError> {
        let lineno = node.lineno;
        match node.kind {
            SirNode::Int(_) | SirNode::Bytes(_) => Ok(node),
            SirNode::Symbol(name) => self.resolve_symbol(&name, lineno),
            SirNode::Cast { value, as_type } => {
                let value = self.optimize_expr(*value)?;
                if let SirNode::Int(n) = &value.kind {
                    if as_type == SirType::ByteArray {
                        return Ok(Node::new(SirNode::Bytes(crate::fold::int_to_bytes(*n)), lineno));
                    }
                }
                if let SirNode::Bytes(b) = &value.kind {
                    if as_type == SirType::Integer {
                        return Ok(Node::new(SirNode::Int(crate::fold::bytes_to_int(b)), lineno));
                    }
                }
                Ok(Node::new(
                    SirNode::Cast { value: Box::new(value), as_type },
                    lineno,
                ))
            }
            SirNode::UnaryOpCode { name, operand } => {
                let operand = self.optimize_expr(*operand)?;
                self.check_operand_type(&name, &operand, lineno)?;
                if let Some(folded) = operand.is_constant().then(|| fold_unary(&name, &operand.kind)).flatten() {
                    let folded_node = Node::new(folded.into_sir(), lineno);
                    self.check_strict_num(&folded_node, lineno)?;
                    return Ok(folded_node);
                }
                Ok(Node::new(
                    SirNode::UnaryOpCode { name, operand: Box::new(operand) },
                    lineno,
                ))
            }
            SirNode::BinOpCode { name, left, right } => {
                let left = self.optimize_expr(*left)?;
                let right = self.optimize_expr(*right)?;
                self.check_operand_type(&name, &left, lineno)?;
                self.check_operand_type(&name, &right, lineno)?;
                if left.is_constant() && right.is_constant() {
                    if let Some(folded) = fold_binary(&name, &left.kind, &right.kind) {
                        let folded_node = Node::new(folded.into_sir(), lineno);
                        self.check_strict_num(&folded_node, lineno)?;
                        return Ok(folded_node);
                    }
                }
                let (name, left, right) = self.rewrite_commutative(name, left, right);
                let (name, left, right) = self.rewrite_logical_equivalent(name, left, right);
                Ok(Node::new(
                    SirNode::BinOpCode { name, left: Box::new(left), right: Box::new(right) },
                    lineno,
                ))
            }
            SirNode::VariableArgsOpCode { name, operands } => {
                let mut resolved = Vec::with_capacity(operands.len());
                for op in operands {
                    let op = self.optimize_expr(op)?;
                    self.check_operand_type(&name, &op, lineno)?;
                    resolved.push(op);
                }
                if name == "OP_WITHIN" && resolved.len() == 3 && resolved.iter().all(|n| n.is_constant()) {
                    if let Some(folded) = fold_within(&resolved[0].kind, &resolved[1].kind, &resolved[2].kind) {
                        return Ok(Node::new(folded.into_sir(), lineno));
                    }
                }
                Ok(Node::new(SirNode::VariableArgsOpCode { name, operands: resolved }, lineno))
            }
            SirNode::FunctionCall { name, args } => self.inline_call(&name, args, lineno),
            other => Ok(Node::new(other, lineno)),
        }
    }

    fn resolve_symbol(&mut self, name: &str, lineno: u32) -> Result<Node, CompileError> {
        let Some(sym) = self.symtab.lookup(name, false) else {
            return Err(CompileError::Ir {
                line: lineno,
                message: format!("'{name}' was never declared"),
            });
        };
        if sym.ty == SirType::StackItem {
            return Ok(Node::new(SirNode::Symbol(name.to_string()), lineno));
        }
        match sym.value.clone() {
            Some(value) if value.is_constant() => Ok(Node::new(value.kind, lineno)),
            Some(value) => {
                // Recurse into the symbol's stored expression; if it now
                // folds to a constant, upgrade the symbol in place (spec
                // §4.3's "the symbol is rewritten to that constant and its
                // type upgraded").
                let optimized = self.optimize_expr(value)?;
                if optimized.is_constant() {
                    let ty = literal_ty(&optimized);
                    let _ = self.symtab.assign(name, optimized.clone(), ty);
                    Ok(Node::new(optimized.kind, lineno))
                } else {
                    Ok(Node::new(SirNode::Symbol(name.to_string()), lineno))
                }
            }
            None => Ok(Node::new(SirNode::Symbol(name.to_string()), lineno)),
        }
    }

    fn contains_assumption(&self, node: &Node) -> bool {
        match &node.kind {
            SirNode::Symbol(name) => self
                .symtab
                .lookup(name, false)
                .map(|s| s.ty == SirType::StackItem)
                .unwrap_or(false),
            SirNode::UnaryOpCode { operand, .. } | SirNode::Cast { value: operand, .. } => {
                self.contains_assumption(operand)
            }
            SirNode::BinOpCode { left, right, .. } => {
                self.contains_assumption(left) || self.contains_assumption(right)
            }
            SirNode::VariableArgsOpCode { operands, .. } => {
                operands.iter().any(|o| self.contains_assumption(o))
            }
            _ => false,
        }
    }

    /// Rule 1: swap operands so an assumption sinks right. Rule 2: rotate
    /// `op2(op1(assumption, X), Y)` (same commutative op both levels) so the
    /// assumption sinks to the rightmost leaf (spec §4.3). Per spec §9's
    /// pinned Open Question, the deep/nested form is the intended behavior.
    fn rewrite_commutative(&self, name: String, left: Node, right: Node) -> (String, Node, Node) {
        if !is_commutative(&name) {
            return (name, left, right);
        }
        if let SirNode::BinOpCode {
            name: inner_name,
            left: a,
            right: x,
        } = &left.kind
        {
            if inner_name == &name && self.contains_assumption(a) && !self.contains_assumption(x) {
                let new_right = Node::new(
                    SirNode::BinOpCode {
                        name: inner_name.clone(),
                        left: Box::new(right),
                        right: a.clone(),
                    },
                    left.lineno,
                );
                return (name, (**x).clone(), new_right);
            }
        }
        if self.contains_assumption(&right) && !self.contains_assumption(&left) {
            return (name, right, left);
        }
        (name, left, right)
    }

    fn rewrite_logical_equivalent(&self, name: String, left: Node, right: Node) -> (String, Node, Node) {
        if let Some(mirror) = logical_mirror(&name) {
            if self.contains_assumption(&right) && !self.contains_assumption(&left) {
                return (mirror.to_string(), right, left);
            }
        }
        (name, left, right)
    }

    fn check_operand_type(&self, opname: &str, operand: &Node, lineno: u32) -> Result<(), CompileError> {
        let Some(desc) = opcode::table().by_name(opname) else {
            return Ok(());
        };
        if desc.byte_manipulator {
            if let SirNode::Int(_) = operand.kind {
                return Err(CompileError::Type {
                    line: lineno,
                    message: format!("{opname} does not accept an integer literal operand"),
                });
            }
        }
        if desc.arithmetic {
            if let SirNode::Bytes(_) = operand.kind {
                tracing::warn!(line = lineno, op = opname, "byte array given to arithmetic opcode");
            }
        }
        Ok(())
    }

    fn check_strict_num(&self, node: &Node, lineno: u32) -> Result<(), CompileError> {
        if let SirNode::Int(n) = node.kind {
            let len = int_byte_len(n);
            if len > 4 {
                if self.options.strict_num {
                    return Err(CompileError::StrictNum {
                        line: lineno,
                        message: format!("folded integer {n} needs {len} bytes, exceeding the 4-byte strict-num limit"),
                    });
                }
                tracing::warn!(line = lineno, value = n, "possibly strict-num: folded result exceeds 4 bytes");
            }
        }
        Ok(())
    }

    fn inline_call(&mut self, name: &str, args: Vec<Node>, lineno: u32) -> Result<Node, CompileError> {
        let mut resolved_args = Vec::with_capacity(args.len());
        for a in args {
            resolved_args.push(self.optimize_expr(a)?);
        }
        let Some(func_sym) = self.symtab.lookup_global(name).cloned() else {
            return Err(CompileError::Ir {
                line: lineno,
                message: format!("call to undeclared function '{name}'"),
            });
        };
        let Some(def) = func_sym.value else {
            return Err(CompileError::Ir {
                line: lineno,
                message: format!("'{name}' is not a function"),
            });
        };
        let SirNode::Function { args: formals, body, .. } = def.kind else {
            return Err(CompileError::Ir {
                line: lineno,
                message: format!("'{name}' is not a function"),
            });
        };
        if formals.len() != resolved_args.len() {
            return Err(CompileError::Ir {
                line: lineno,
                message: format!(
                    "'{name}' expects {} argument(s), got {}",
                    formals.len(),
                    resolved_args.len()
                ),
            });
        }

        self.call_site += 1;
        let suffix = format!("__call{}", self.call_site);
        let formal_names: Vec<String> = formals.iter().map(|a| a.name.clone()).collect();
        let mangled_body = mangle_body(body, &suffix, &formal_names);

        self.symtab.begin_scope(ScopeKind::Function);
        for (formal, actual) in formals.iter().zip(resolved_args.into_iter()) {
            self.symtab
                .declare(&formal.name, Some(actual), SirType::FuncArg, false)
                .map_err(|e| CompileError::from_symbol(e, lineno))?;
        }

        let mut result = None;
        for stmt in mangled_body {
            if let SirNode::Return(value) = stmt.kind {
                result = Some(self.optimize_expr(*value)?);
                break;
            }
            self.optimize_stmt(stmt)?;
        }
        self.symtab.end_scope();

        result.ok_or_else(|| CompileError::Ir {
            line: lineno,
            message: format!("'{name}' has no return statement"),
        })
    }
}

fn literal_ty(node: &Node) -> SirType {
    match node.kind {
        SirNode::Int(_) => SirType::Integer,
        SirNode::Bytes(_) => SirType::ByteArray,
        _ => SirType::Expr,
    }
}

fn count_returns(stmts: &[Node]) -> usize {
    stmts
        .iter()
        .map(|s| match &s.kind {
            SirNode::Return(_) => 1,
            SirNode::If { truebranch, falsebranch, .. } => {
                count_returns(truebranch) + count_returns(falsebranch)
            }
            _ => 0,
        })
        .sum()
}

fn implicit_push_in(stmts: &[Node]) -> bool {
    stmts.iter().any(|s| {
        matches!(
            s.kind,
            SirNode::Int(_)
                | SirNode::Bytes(_)
                | SirNode::Symbol(_)
                | SirNode::UnaryOpCode { .. }
                | SirNode::BinOpCode { .. }
                | SirNode::VariableArgsOpCode { .. }
        )
    })
}

/// Renames every locally-declared name in `body` (plus its references) by
/// appending `suffix`, so repeated/recursive inlining of the same function
/// never lets two call sites' local variables collide once the bodies are
/// flattened into one LIR program (spec §4.3). Formal parameter names are
/// left untouched -- they resolve through the call's own scope instead.
fn mangle_body(body: Vec<Node>, suffix: &str, formals: &[String]) -> Vec<Node> {
    let mut declared = Vec::new();
    collect_declared_names(&body, formals, &mut declared);
    let map: HashMap<String, String> = declared
        .into_iter()
        .map(|n| (n.clone(), format!("{n}{suffix}")))
        .collect();
    body.into_iter().map(|n| rename_node(n, &map)).collect()
}

fn collect_declared_names(stmts: &[Node], formals: &[String], out: &mut Vec<String>) {
    for s in stmts {
        match &s.kind {
            SirNode::Declaration { name, .. } if !formals.contains(name) => out.push(name.clone()),
            SirNode::If { truebranch, falsebranch, .. } => {
                collect_declared_names(truebranch, formals, out);
                collect_declared_names(falsebranch, formals, out);
            }
            _ => {}
        }
    }
}

fn rename_node(node: Node, map: &HashMap<String, String>) -> Node {
    let lineno = node.lineno;
    let renamed = |n: String| map.get(&n).cloned().unwrap_or(n);
    let kind = match node.kind {
        SirNode::Symbol(n) => SirNode::Symbol(renamed(n)),
        SirNode::Declaration { name, value, ty, mutable } => SirNode::Declaration {
            name: renamed(name),
            value: Box::new(rename_node(*value, map)),
            ty,
            mutable,
        },
        SirNode::Assignment { name, value, ty } => SirNode::Assignment {
            name: renamed(name),
            value: Box::new(rename_node(*value, map)),
            ty,
        },
        SirNode::Deletion(name) => SirNode::Deletion(renamed(name)),
        SirNode::If { test, truebranch, falsebranch } => SirNode::If {
            test: Box::new(rename_node(*test, map)),
            truebranch: truebranch.into_iter().map(|n| rename_node(n, map)).collect(),
            falsebranch: falsebranch.into_iter().map(|n| rename_node(n, map)).collect(),
        },
        SirNode::FunctionCall { name, args } => SirNode::FunctionCall {
            name,
            args: args.into_iter().map(|n| rename_node(n, map)).collect(),
        },
        SirNode::Return(v) => SirNode::Return(Box::new(rename_node(*v, map))),
        SirNode::Push(v) => SirNode::Push(Box::new(rename_node(*v, map))),
        SirNode::InnerScript(stmts) => {
            SirNode::InnerScript(stmts.into_iter().map(|n| rename_node(n, map)).collect())
        }
        SirNode::Cast { value, as_type } => SirNode::Cast {
            value: Box::new(rename_node(*value, map)),
            as_type,
        },
        SirNode::VerifyOpCode { name, test } => SirNode::VerifyOpCode {
            name,
            test: Box::new(rename_node(*test, map)),
        },
        SirNode::UnaryOpCode { name, operand } => SirNode::UnaryOpCode {
            name,
            operand: Box::new(rename_node(*operand, map)),
        },
        SirNode::BinOpCode { name, left, right } => SirNode::BinOpCode {
            name,
            left: Box::new(rename_node(*left, map)),
            right: Box::new(rename_node(*right, map)),
        },
        SirNode::VariableArgsOpCode { name, operands } => SirNode::VariableArgsOpCode {
            name,
            operands: operands.into_iter().map(|n| rename_node(n, map)).collect(),
        },
        SirNode::Script(stmts) => {
            SirNode::Script(stmts.into_iter().map(|n| rename_node(n, map)).collect())
        }
        other @ (SirNode::Int(_) | SirNode::Bytes(_) | SirNode::Function { .. }) => other,
    };
    Node::new(kind, lineno)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(kind: SirNode) -> Node {
        Node::new(kind, 1)
    }

    fn fresh() -> (SymbolTable, CompileOptions) {
        (SymbolTable::new(), CompileOptions::default())
    }

    #[test]
    fn folds_binary_add() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let expr = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(n(SirNode::Int(2))),
            right: Box::new(n(SirNode::Int(3))),
        });
        let result = opt.optimize_expr(expr).unwrap();
        assert_eq!(result.kind, SirNode::Int(5));
    }

    #[test]
    fn resolves_constant_symbol() {
        let (mut symtab, options) = fresh();
        symtab.declare("a", Some(n(SirNode::Int(7))), SirType::Integer, false).unwrap();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let result = opt.optimize_expr(n(SirNode::Symbol("a".into()))).unwrap();
        assert_eq!(result.kind, SirNode::Int(7));
    }

    #[test]
    fn leaves_assumption_symbol_unresolved() {
        let (mut symtab, options) = fresh();
        symtab.add_stack_assumptions(&["a".into()]).unwrap();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let result = opt.optimize_expr(n(SirNode::Symbol("a".into()))).unwrap();
        assert_eq!(result.kind, SirNode::Symbol("a".into()));
    }

    #[test]
    fn commutative_swap_sinks_assumption_right() {
        let (mut symtab, options) = fresh();
        symtab.add_stack_assumptions(&["a".into()]).unwrap();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let expr = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(n(SirNode::Symbol("a".into()))),
            right: Box::new(n(SirNode::Int(5))),
        });
        let result = opt.optimize_expr(expr).unwrap();
        match result.kind {
            SirNode::BinOpCode { left, right, .. } => {
                assert_eq!(left.kind, SirNode::Int(5));
                assert_eq!(right.kind, SirNode::Symbol("a".into()));
            }
            other => panic!("expected BinOpCode, got {other:?}"),
        }
    }

    #[test]
    fn commutative_rotates_nested_same_op_so_assumption_sinks_rightmost() {
        // op2(op1(assumption, X), Y) with op1 == op2 == OP_ADD both commutative
        // rotates to op(X, op(Y, assumption)) -- spec §9's pinned Open Question.
        let (mut symtab, options) = fresh();
        symtab.add_stack_assumptions(&["a".into()]).unwrap();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let inner = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(n(SirNode::Symbol("a".into()))),
            right: Box::new(n(SirNode::Int(2))),
        });
        let expr = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(inner),
            right: Box::new(n(SirNode::Int(3))),
        });
        let result = opt.optimize_expr(expr).unwrap();
        match result.kind {
            SirNode::BinOpCode { name, left, right } => {
                assert_eq!(name, "OP_ADD");
                assert_eq!(left.kind, SirNode::Int(2));
                match right.kind {
                    SirNode::BinOpCode { name: inner_name, left: inner_left, right: inner_right } => {
                        assert_eq!(inner_name, "OP_ADD");
                        assert_eq!(inner_left.kind, SirNode::Int(3));
                        assert_eq!(inner_right.kind, SirNode::Symbol("a".into()));
                    }
                    other => panic!("expected nested BinOpCode, got {other:?}"),
                }
            }
            other => panic!("expected BinOpCode, got {other:?}"),
        }
    }

    #[test]
    fn logical_mirror_moves_assumption_right() {
        let (mut symtab, options) = fresh();
        symtab.add_stack_assumptions(&["a".into()]).unwrap();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let expr = n(SirNode::BinOpCode {
            name: "OP_LESSTHAN".into(),
            left: Box::new(n(SirNode::Symbol("a".into()))),
            right: Box::new(n(SirNode::Int(5))),
        });
        let result = opt.optimize_expr(expr).unwrap();
        match result.kind {
            SirNode::BinOpCode { name, left, right } => {
                assert_eq!(name, "OP_GREATERTHAN");
                assert_eq!(left.kind, SirNode::Int(5));
                assert_eq!(right.kind, SirNode::Symbol("a".into()));
            }
            other => panic!("expected BinOpCode, got {other:?}"),
        }
    }

    #[test]
    fn byte_manipulator_rejects_int_literal() {
        let (mut symtab, options) = fresh();
        symtab.add_stack_assumptions(&["a".into()]).unwrap();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let expr = n(SirNode::BinOpCode {
            name: "OP_CAT".into(),
            left: Box::new(n(SirNode::Symbol("a".into()))),
            right: Box::new(n(SirNode::Int(5))),
        });
        let err = opt.optimize_expr(expr).unwrap_err();
        assert!(matches!(err, CompileError::Type { .. }));
    }

    #[test]
    fn strict_num_fails_on_wide_folded_result() {
        let (mut symtab, mut options) = fresh();
        options.strict_num = true;
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let expr = n(SirNode::BinOpCode {
            name: "OP_ADD".into(),
            left: Box::new(n(SirNode::Int(i64::MAX / 2))),
            right: Box::new(n(SirNode::Int(i64::MAX / 2))),
        });
        let err = opt.optimize_expr(expr).unwrap_err();
        assert!(matches!(err, CompileError::StrictNum { .. }));
    }

    #[test]
    fn implicit_push_requires_option() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let err = opt
            .optimize_stmt(n(SirNode::Int(5)))
            .unwrap_err();
        assert!(matches!(err, CompileError::ImplicitPush { .. }));
    }

    #[test]
    fn function_with_no_return_fails() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let f = n(SirNode::Function {
            name: "f".into(),
            return_type: SirType::Integer,
            args: vec![],
            body: vec![],
        });
        let err = opt.optimize_stmt(f).unwrap_err();
        assert!(matches!(err, CompileError::Ir { .. }));
    }

    #[test]
    fn function_with_two_returns_fails() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let f = n(SirNode::Function {
            name: "f".into(),
            return_type: SirType::Integer,
            args: vec![],
            body: vec![
                n(SirNode::Return(Box::new(n(SirNode::Int(1))))),
                n(SirNode::Return(Box::new(n(SirNode::Int(2))))),
            ],
        });
        let err = opt.optimize_stmt(f).unwrap_err();
        assert!(matches!(err, CompileError::Ir { .. }));
    }

    #[test]
    fn function_call_inlines_body() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let f = n(SirNode::Function {
            name: "double".into(),
            return_type: SirType::Integer,
            args: vec![txsc_core::FunctionArg { name: "x".into(), ty: SirType::Integer }],
            body: vec![n(SirNode::Return(Box::new(n(SirNode::BinOpCode {
                name: "OP_MUL".into(),
                left: Box::new(n(SirNode::Symbol("x".into()))),
                right: Box::new(n(SirNode::Int(2))),
            }))))],
        });
        opt.optimize_stmt(f).unwrap();
        let call = n(SirNode::FunctionCall {
            name: "double".into(),
            args: vec![n(SirNode::Int(21))],
        });
        let result = opt.optimize_expr(call).unwrap();
        assert_eq!(result.kind, SirNode::Int(42));
    }

    #[test]
    fn if_with_constant_test_collapses() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let stmt = n(SirNode::If {
            test: Box::new(n(SirNode::Int(1))),
            truebranch: vec![n(SirNode::Push(Box::new(n(SirNode::Int(9)))))],
            falsebranch: vec![n(SirNode::Push(Box::new(n(SirNode::Int(8)))))],
        });
        let result = opt.optimize_stmt(stmt).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, SirNode::Push(Box::new(n(SirNode::Int(9)))));
    }

    #[test]
    fn leading_stack_declaration_bootstraps_assumptions_and_is_consumed() {
        let (mut symtab, options) = fresh();
        let mut opt = SirOptimizer::new(&mut symtab, &options);
        let stack_decl = n(SirNode::Declaration {
            name: "_stack".into(),
            value: Box::new(n(SirNode::Bytes(b"sig,pubkey".to_vec()))),
            ty: SirType::Expr,
            mutable: false,
        });
        let rest = vec![n(SirNode::Push(Box::new(n(SirNode::Symbol("sig".into())))))];
        let mut script = vec![stack_decl];
        script.extend(rest);
        let result = opt.optimize_script(script).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].kind, SirNode::Push(Box::new(n(SirNode::Symbol("sig".into())))));
        assert_eq!(opt.symtab.stack_names(), vec!["sig".to_string(), "pubkey".to_string()]);
    }
}
