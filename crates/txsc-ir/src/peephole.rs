//! The peephole optimizer (spec §4.9): a fixed table of local rewrite
//! rules applied left to right, iterated to a fixed point (bounded by
//! `MAX_PASSES`). Each pass's textual dump is compared against the
//! previous pass; equality halts the loop, exactly as the teacher's fixed-
//! point passes over a flat instruction list are compared by value rather
//! than by a dirty flag.

use txsc_core::{opcode, CompileOptions, LirNode};

use crate::fold::bytes_to_int;

const MAX_PASSES: usize = 5;

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

/// Runs the fixed-point peephole loop. A no-op (returns `nodes` unchanged)
/// when `options.optimization` is below [`txsc_core::OptLevel::Peephole`].
pub fn optimize(nodes: Vec<LirNode>, options: &CompileOptions) -> Vec<LirNode> {
    if !options.optimization.runs_peephole() {
        return nodes;
    }
    let mut current = nodes;
    let mut previous_dump = format!("{current:?}");
    for _ in 0..MAX_PASSES {
        let next = run_pass(&current);
        let dump = format!("{next:?}");
        if dump == previous_dump {
            return next;
        }
        current = next;
        previous_dump = dump;
    }
    current
}

fn run_pass(nodes: &[LirNode]) -> Vec<LirNode> {
    if let Some(rewritten) = hoist_return(nodes) {
        return rewritten;
    }
    let mut out: Vec<LirNode> = Vec::with_capacity(nodes.len());
    let mut i = 0;
    while i < nodes.len() {
        if let Some((consumed, replacement)) = try_rewrite_at(&nodes[i..]) {
            out.extend(replacement);
            i += consumed;
        } else {
            out.push(nodes[i].clone());
            i += 1;
        }
    }
    strip_trailing_verify(out)
}

/// Rule: every `OP_RETURN` occurrence is moved to position 0, dropping the
/// rest of the program (everything after `OP_RETURN` is unreachable).
fn hoist_return(nodes: &[LirNode]) -> Option<Vec<LirNode>> {
    let idx = nodes.iter().position(|n| is_op(n, "OP_RETURN"))?;
    if idx == 0 && nodes.len() == 1 {
        return None;
    }
    Some(vec![nodes[idx].clone()])
}

fn strip_trailing_verify(mut nodes: Vec<LirNode>) -> Vec<LirNode> {
    while matches!(nodes.last(), Some(n) if is_op(n, "OP_VERIFY")) {
        nodes.pop();
    }
    nodes
}

fn is_op(n: &LirNode, name: &str) -> bool {
    n.opcode_name() == Some(name)
}

fn small_int_value(n: &LirNode) -> Option<i32> {
    match n {
        LirNode::SmallIntOpCode { value, .. } => Some(*value),
        _ => None,
    }
}

fn descriptor_node(name: &'static str) -> Option<LirNode> {
    let d = opcode::table().by_name(name)?;
    Some(LirNode::OpCode {
        name: d.name.to_string(),
        args: d.args.clone(),
        delta: d.delta,
        verifier: d.verifier,
    })
}

/// Tries every rule against the window starting at `w[0]`, in the spec's
/// listed order. Returns `(nodes consumed, replacement)` for the first
/// match.
fn try_rewrite_at(w: &[LirNode]) -> Option<(usize, Vec<LirNode>)> {
    // OP_X OP_VERIFY -> OP_XVERIFY
    if w.len() >= 2 {
        if let LirNode::OpCode { name, verifier: false, .. } = &w[0] {
            if is_op(&w[1], "OP_VERIFY") {
                if let Some(d) = opcode::table().by_name(name) {
                    if let Some(verify_name) = d.verify_of {
                        if let Some(node) = descriptor_node(verify_name) {
                            return Some((2, vec![node]));
                        }
                    }
                }
            }
        }
    }

    // OP_TOALTSTACK OP_FROMALTSTACK -> empty; inverse.
    if w.len() >= 2 {
        if (is_op(&w[0], "OP_TOALTSTACK") && is_op(&w[1], "OP_FROMALTSTACK"))
            || (is_op(&w[0], "OP_FROMALTSTACK") && is_op(&w[1], "OP_TOALTSTACK"))
        {
            return Some((2, Vec::new()));
        }
    }

    // OP_1 OP_ROLL OP_DROP -> OP_NIP
    if w.len() >= 3 && small_int_value(&w[0]) == Some(1) && is_op(&w[1], "OP_ROLL") && is_op(&w[2], "OP_DROP") {
        return Some((3, vec![descriptor_node("OP_NIP").unwrap()]));
    }
    // OP_1 OP_ROLL OP_1 OP_ROLL -> empty
    if w.len() >= 4
        && small_int_value(&w[0]) == Some(1)
        && is_op(&w[1], "OP_ROLL")
        && small_int_value(&w[2]) == Some(1)
        && is_op(&w[3], "OP_ROLL")
    {
        return Some((4, Vec::new()));
    }
    // OP_1 OP_PICK -> OP_OVER
    if w.len() >= 2 && small_int_value(&w[0]) == Some(1) && is_op(&w[1], "OP_PICK") {
        return Some((2, vec![descriptor_node("OP_OVER").unwrap()]));
    }
    // OP_0 OP_PICK -> OP_DUP
    if w.len() >= 2 && small_int_value(&w[0]) == Some(0) && is_op(&w[1], "OP_PICK") {
        return Some((2, vec![descriptor_node("OP_DUP").unwrap()]));
    }
    // OP_0 OP_ROLL -> empty
    if w.len() >= 2 && small_int_value(&w[0]) == Some(0) && is_op(&w[1], "OP_ROLL") {
        return Some((2, Vec::new()));
    }
    // OP_1 OP_ROLL -> OP_SWAP
    if w.len() >= 2 && small_int_value(&w[0]) == Some(1) && is_op(&w[1], "OP_ROLL") {
        return Some((2, vec![descriptor_node("OP_SWAP").unwrap()]));
    }
    // OP_NIP OP_DROP -> OP_2DROP
    if w.len() >= 2 && is_op(&w[0], "OP_NIP") && is_op(&w[1], "OP_DROP") {
        return Some((2, vec![descriptor_node("OP_2DROP").unwrap()]));
    }
    // OP_OVER OP_OVER -> OP_2DUP
    if w.len() >= 2 && is_op(&w[0], "OP_OVER") && is_op(&w[1], "OP_OVER") {
        return Some((2, vec![descriptor_node("OP_2DUP").unwrap()]));
    }
    // OP_DROP OP_DROP -> OP_2DROP
    if w.len() >= 2 && is_op(&w[0], "OP_DROP") && is_op(&w[1], "OP_DROP") {
        return Some((2, vec![descriptor_node("OP_2DROP").unwrap()]));
    }

    // x OP_1 OP_ADD -> x OP_1ADD (and mirror OP_1 x OP_ADD)
    if let Some(r) = fold_with_unit(w, 1, "OP_ADD", "OP_1ADD") {
        return Some(r);
    }
    // x OP_1 OP_SUB -> x OP_1SUB
    if w.len() >= 3 && small_int_value(&w[1]) == Some(1) && is_op(&w[2], "OP_SUB") {
        return Some((3, vec![w[0].clone(), descriptor_node("OP_1SUB").unwrap()]));
    }
    // x OP_2 OP_MUL -> x OP_2MUL (and mirror)
    if let Some(r) = fold_with_unit(w, 2, "OP_MUL", "OP_2MUL") {
        return Some(r);
    }
    // x OP_2 OP_DIV -> x OP_2DIV
    if w.len() >= 3 && small_int_value(&w[1]) == Some(2) && is_op(&w[2], "OP_DIV") {
        return Some((3, vec![w[0].clone(), descriptor_node("OP_2DIV").unwrap()]));
    }
    // OP_1 OP_NEGATE -> OP_1NEGATE
    if w.len() >= 2 && small_int_value(&w[0]) == Some(1) && is_op(&w[1], "OP_NEGATE") {
        return Some((2, vec![descriptor_node("OP_1NEGATE").unwrap()]));
    }

    // OP_NOT OP_IF -> OP_NOTIF
    if w.len() >= 2 && is_op(&w[0], "OP_NOT") && matches!(w[1], LirNode::If) {
        return Some((2, vec![LirNode::NotIf]));
    }

    // OP_SHA256 OP_SHA256 -> OP_HASH256; OP_SHA256 OP_RIPEMD160 -> OP_HASH160
    if w.len() >= 2 && is_op(&w[0], "OP_SHA256") {
        if is_op(&w[1], "OP_SHA256") {
            return Some((2, vec![descriptor_node("OP_HASH256").unwrap()]));
        }
        if is_op(&w[1], "OP_RIPEMD160") {
            return Some((2, vec![descriptor_node("OP_HASH160").unwrap()]));
        }
    }

    // x OP_0 OP_ADD -> x (and mirror OP_0 x OP_ADD); x OP_0 OP_SUB -> x
    if w.len() >= 3 && small_int_value(&w[1]) == Some(0) && is_op(&w[2], "OP_ADD") {
        return Some((3, vec![w[0].clone()]));
    }
    if w.len() >= 3 && small_int_value(&w[0]) == Some(0) && is_op(&w[2], "OP_ADD") {
        return Some((3, vec![w[1].clone()]));
    }
    if w.len() >= 3 && small_int_value(&w[1]) == Some(0) && is_op(&w[2], "OP_SUB") {
        return Some((3, vec![w[0].clone()]));
    }

    // OP_ELSE OP_ENDIF -> OP_ENDIF; OP_IF OP_ENDIF -> OP_DROP
    if w.len() >= 2 && matches!(w[0], LirNode::Else) && matches!(w[1], LirNode::EndIf) {
        return Some((2, vec![LirNode::EndIf]));
    }
    if w.len() >= 2 && matches!(w[0], LirNode::If) && matches!(w[1], LirNode::EndIf) {
        return Some((2, vec![descriptor_node("OP_DROP").unwrap()]));
    }

    // x y OP_EQUAL OP_NOT -> x y OP_NUMNOTEQUAL, for literals <=4 bytes
    if w.len() >= 4 && is_op(&w[2], "OP_EQUAL") && is_op(&w[3], "OP_NOT") && within_literal_bound(&w[0]) && within_literal_bound(&w[1]) {
        return Some((4, vec![w[0].clone(), w[1].clone(), descriptor_node("OP_NUMNOTEQUAL").unwrap()]));
    }

    // Push(bytes) decoding to an integer in [0,16] -> SmallInt
    if let LirNode::Push { data } = &w[0] {
        if data.len() <= 4 {
            let v = bytes_to_int(data);
            if (0..=16).contains(&v) && crate::fold::int_to_bytes(v) == *data {
                if let Some(d) = opcode::table().small_int_for(v) {
                    return Some((1, vec![LirNode::SmallIntOpCode { value: v as i32, name: d.name.to_string() }]));
                }
            }
        }
    }

    // OP_SWAP immediately before a commutative op is dropped.
    if w.len() >= 2 && is_op(&w[0], "OP_SWAP") {
        if let Some(name) = w[1].opcode_name() {
            if COMMUTATIVE.contains(&name) {
                return Some((2, vec![w[1].clone()]));
            }
        }
    }

    None
}

/// `x UNIT op -> x op_with_unit` and its mirror `UNIT x op -> x op_with_unit`.
fn fold_with_unit(w: &[LirNode], unit: i32, op: &str, replacement: &'static str) -> Option<(usize, Vec<LirNode>)> {
    if w.len() >= 3 && small_int_value(&w[1]) == Some(unit) && is_op(&w[2], op) {
        return Some((3, vec![w[0].clone(), descriptor_node(replacement).unwrap()]));
    }
    if w.len() >= 3 && small_int_value(&w[0]) == Some(unit) && is_op(&w[2], op) {
        return Some((3, vec![w[1].clone(), descriptor_node(replacement).unwrap()]));
    }
    None
}

fn within_literal_bound(n: &LirNode) -> bool {
    match n {
        LirNode::Push { data } => data.len() <= 4,
        _ => true,
    }
}
