//! The variable inliner (spec §4.7): a fixed-point loop -- peephole,
//! contextualize, walk the instructions looking for the first rewrite that
//! applies, restart -- that erases every `Assumption`/`Variable`/
//! `Declaration`/`Assignment` marker, replacing each with the concrete
//! `Pick`/`Roll`/alt-stack sequence the stack-state simulator says reaches
//! it. The loop halts once a full walk produces no rewrite; what remains is
//! pure opcode/push LIR, ready for the peephole optimizer's final pass and
//! emission.

use txsc_core::{opcode, CompileError, CompileOptions, Instr, LirNode, LirProgram};

use crate::altstack::AltStackManager;
use crate::contextualize;
use crate::peephole;
use crate::stackstate::StackStateSimulator;

const MAX_PASSES: usize = 200;

/// Runs the inliner to a fixed point and returns the fully contextualized,
/// marker-free program. `stack_names` is the program's assumed stack inputs
/// in declared order, bottom to top (spec §4.2/§6's `_stack_names`) -- it
/// seeds the stack-state simulator so the very first read of an assumption
/// resolves to a real depth instead of "not on the simulated stack". Pass an
/// empty slice for dialects that never introduce assumptions.
pub fn inline_variables(
    nodes: Vec<LirNode>,
    stack_names: &[String],
    options: &CompileOptions,
) -> Result<LirProgram, CompileError> {
    let mut current = nodes;
    let mut altstack = AltStackManager::new();
    for _ in 0..MAX_PASSES {
        let peepholed = peephole::optimize(current.clone(), options);
        let prog = contextualize::contextualize(peepholed, options)?;
        match find_rewrite(&prog, stack_names, &mut altstack)? {
            Some(rewrite) => {
                current = apply_rewrite(&prog, rewrite);
            }
            None => return Ok(prog),
        }
    }
    Err(CompileError::Ir {
        line: 0,
        message: "variable inliner did not reach a fixed point".to_string(),
    })
}

/// Derives an assumed-input seed order from the first occurrence of each
/// distinct `Assumption` name in `nodes`. Used by callers that construct LIR
/// fragments directly and have no `SymbolTable` to read `_stack_names` from
/// (the property-test harness, this module's own unit tests); the real
/// pipeline (`compile_to_lir`) uses the symbol table's declared order
/// instead, since declaration order need not match first-use order.
pub(crate) fn assumed_names(nodes: &[LirNode]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for node in nodes {
        if let LirNode::Assumption { var_name } = node {
            if seen.insert(var_name.clone()) {
                out.push(var_name.clone());
            }
        }
    }
    out
}

struct Rewrite {
    start: usize,
    end: usize,
    replacement: Vec<LirNode>,
}

/// Finds the first applicable rewrite in instruction order; `None` means the
/// program is already fully inlined.
fn find_rewrite(prog: &LirProgram, stack_names: &[String], altstack: &mut AltStackManager) -> Result<Option<Rewrite>, CompileError> {
    if let Some(r) = find_consecutive_assumption_collapse(prog, stack_names)? {
        return Ok(Some(r));
    }

    let mut sim = StackStateSimulator::new(stack_names);
    for instr in &prog.instrs {
        match &instr.node {
            LirNode::Assumption { var_name } => {
                if let Some(r) = rewrite_assumption(prog, instr, var_name, &sim, altstack)? {
                    return Ok(Some(r));
                }
            }
            LirNode::Variable { symbol_name } => {
                if let Some(r) = rewrite_variable(prog, instr, symbol_name, &sim, altstack)? {
                    return Ok(Some(r));
                }
            }
            LirNode::Declaration { name, .. } => {
                return Ok(Some(rewrite_declaration(prog, instr, name, altstack)));
            }
            LirNode::Assignment { name } => {
                return Ok(Some(rewrite_assignment(prog, instr, name, &sim, altstack)));
            }
            _ => {}
        }
        sim.visit(&instr.node)?;
    }
    Ok(None)
}

/// A variable is routed through the alt stack when some assignment to it
/// falls strictly inside a conditional branch -- its stack position can't be
/// tracked positionally once the branches disagree on how much they push.
fn needs_altstack(prog: &LirProgram, name: &str) -> bool {
    if prog.altstack_assumptions.iter().any(|n| n == name) {
        return true;
    }
    let Some(assign_idxs) = prog.assignments.get(name) else { return false };
    assign_idxs.iter().any(|&idx| {
        prog.branches
            .iter()
            .any(|b| idx > b.start.saturating_sub(1) && idx < b.end + 1)
    })
}

fn rewrite_assumption(
    prog: &LirProgram,
    instr: &Instr,
    name: &str,
    sim: &StackStateSimulator,
    altstack: &mut AltStackManager,
) -> Result<Option<Rewrite>, CompileError> {
    if needs_altstack(prog, name) {
        altstack.allocate(name);
        let last_use = !has_later_occurrence(&prog.assumptions, name, instr.idx);
        return Ok(Some(Rewrite {
            start: instr.idx,
            end: instr.idx + 1,
            replacement: altstack.get(name, last_use),
        }));
    }
    let depth = sim.highest_assumption(name).ok_or_else(|| CompileError::Ir {
        line: 0,
        message: format!("assumption '{name}' is not on the simulated stack"),
    })?;
    if depth == 0 {
        return Ok(Some(Rewrite { start: instr.idx, end: instr.idx + 1, replacement: Vec::new() }));
    }
    let pick = has_later_occurrence(&prog.assumptions, name, instr.idx) || is_duplicate_use(prog, instr.idx);
    Ok(Some(Rewrite {
        start: instr.idx,
        end: instr.idx + 1,
        replacement: vec![int_push(depth as i64), op(if pick { "OP_PICK" } else { "OP_ROLL" })],
    }))
}

fn rewrite_variable(
    prog: &LirProgram,
    instr: &Instr,
    name: &str,
    sim: &StackStateSimulator,
    altstack: &mut AltStackManager,
) -> Result<Option<Rewrite>, CompileError> {
    if needs_altstack(prog, name) {
        altstack.allocate(name);
        let last_use = !has_later_occurrence(&prog.variables, name, instr.idx);
        return Ok(Some(Rewrite {
            start: instr.idx,
            end: instr.idx + 1,
            replacement: altstack.get(name, last_use),
        }));
    }
    let depth = sim.highest_variable(name).ok_or_else(|| CompileError::Ir {
        line: 0,
        message: format!("variable '{name}' is not on the simulated stack"),
    })?;
    if depth == 0 {
        return Ok(Some(Rewrite { start: instr.idx, end: instr.idx + 1, replacement: Vec::new() }));
    }
    let pick = has_later_occurrence(&prog.variables, name, instr.idx);
    Ok(Some(Rewrite {
        start: instr.idx,
        end: instr.idx + 1,
        replacement: vec![int_push(depth as i64), op(if pick { "OP_PICK" } else { "OP_ROLL" })],
    }))
}

/// A declaration marker carries no runtime effect once the value it names
/// has been left in place by the preceding push ops; for an alt-stack
/// variable those ops instead need to be redirected onto the alt stack.
fn rewrite_declaration(prog: &LirProgram, instr: &Instr, name: &str, altstack: &mut AltStackManager) -> Rewrite {
    if needs_altstack(prog, name) {
        let start = find_value_span_start(&prog.instrs, instr.idx);
        altstack.allocate(name);
        let mut replacement = Vec::new();
        for i in start..instr.idx {
            replacement.push(prog.instrs[i].node.clone());
        }
        replacement.push(op("OP_TOALTSTACK"));
        return Rewrite { start, end: instr.idx + 1, replacement };
    }
    Rewrite { start: instr.idx, end: instr.idx + 1, replacement: Vec::new() }
}

fn rewrite_assignment(
    prog: &LirProgram,
    instr: &Instr,
    name: &str,
    sim: &StackStateSimulator,
    altstack: &mut AltStackManager,
) -> Rewrite {
    let start = find_value_span_start(&prog.instrs, instr.idx);
    let value_ops: Vec<LirNode> = prog.instrs[start..instr.idx].iter().map(|i| i.node.clone()).collect();
    if needs_altstack(prog, name) {
        altstack.allocate(name);
        return Rewrite { start, end: instr.idx + 1, replacement: altstack.set(name, value_ops) };
    }
    let old_depth = sim.highest_variable(name).unwrap_or(0);
    let mut replacement = value_ops;
    replacement.push(int_push(old_depth as i64 + 1));
    replacement.push(op("OP_ROLL"));
    replacement.push(op("OP_DROP"));
    Rewrite { start, end: instr.idx + 1, replacement }
}

/// Walks backward from `before` accumulating static deltas until exactly one
/// net item has been produced -- the span of ops that computed the value
/// sitting just before `before`.
fn find_value_span_start(instrs: &[Instr], before: usize) -> usize {
    let mut total = 0i32;
    let mut i = before;
    while i > 0 {
        i -= 1;
        total += instrs[i].node.static_delta().unwrap_or(0);
        if total >= 1 {
            return i;
        }
    }
    0
}

fn has_later_occurrence(index: &indexmap::IndexMap<String, Vec<usize>>, name: &str, idx: usize) -> bool {
    index.get(name).map(|v| v.iter().any(|&i| i > idx)).unwrap_or(false)
}

fn is_duplicate_use(prog: &LirProgram, idx: usize) -> bool {
    prog.duplicate_uses.iter().any(|(i, _)| *i == idx)
}

/// A maximal run of consecutive `Assumption` reads whose simulated depths
/// are already strictly sequential (n, n-1, ..., 0 relative to the run's
/// start) collapses entirely -- the values are already in the exact order a
/// following op needs them in, so no `Pick`/`Roll` is needed for any of them.
///
/// Every depth in the run is measured against the same frozen snapshot of
/// the stack taken at the run's start, not a probe that advances as each
/// element is considered -- the question is "where do these values already
/// sit", not "where would they sit if each prior read had already run".
fn find_consecutive_assumption_collapse(prog: &LirProgram, stack_names: &[String]) -> Result<Option<Rewrite>, CompileError> {
    let mut sim = StackStateSimulator::new(stack_names);
    let mut i = 0;
    while i < prog.instrs.len() {
        let node = &prog.instrs[i].node;
        let LirNode::Assumption { var_name } = node else {
            sim.visit(node)?;
            i += 1;
            continue;
        };
        let run_start = i;
        let mut depths = Vec::new();
        let probe = sim.clone_for_lookahead();
        let mut j = i;
        while j < prog.instrs.len() {
            let LirNode::Assumption { var_name: vn } = &prog.instrs[j].node else { break };
            match probe.highest_assumption(vn) {
                Some(d) => depths.push(d),
                None => break,
            }
            j += 1;
        }
        let _ = var_name;
        if depths.len() >= 2 {
            let sequential = depths.windows(2).all(|w| w[0] == w[1] + 1);
            let starts_at_run_top = depths[0] == depths.len() - 1;
            if sequential && starts_at_run_top {
                return Ok(Some(Rewrite { start: run_start, end: run_start + depths.len(), replacement: Vec::new() }));
            }
        }
        sim.visit(node)?;
        i += 1;
    }
    Ok(None)
}

fn apply_rewrite(prog: &LirProgram, rewrite: Rewrite) -> Vec<LirNode> {
    let mut out = Vec::with_capacity(prog.instrs.len());
    for instr in &prog.instrs[..rewrite.start] {
        out.push(instr.node.clone());
    }
    out.extend(rewrite.replacement);
    for instr in &prog.instrs[rewrite.end..] {
        out.push(instr.node.clone());
    }
    out
}

fn op(name: &'static str) -> LirNode {
    let d = opcode::table().by_name(name).expect("built-in opcode must exist");
    LirNode::OpCode { name: d.name.to_string(), args: d.args.clone(), delta: d.delta, verifier: d.verifier }
}

fn int_push(n: i64) -> LirNode {
    if let Some(d) = opcode::table().small_int_for(n) {
        LirNode::SmallIntOpCode { value: d.value.unwrap(), name: d.name.to_string() }
    } else {
        LirNode::Push { data: crate::fold::int_to_bytes(n) }
    }
}
