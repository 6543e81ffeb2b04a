//! The LIR contextualizer (spec §4.5): assigns `idx`, builds the
//! assumption/assignment/variable index maps and the conditional-branch
//! list, infers the runtime-dependent fields the opcode table leaves
//! unresolved (`CHECKMULTISIG`'s delta, `IFDUP`'s delta, `PICK`/`ROLL`'s
//! operand depth), validates hash-comparison literal lengths, and decides
//! which assumptions must be routed through the alt stack to survive an
//! uneven conditional.

use smallvec::smallvec;
use txsc_core::{CompileError, CompileOptions, ConditionalBranch, Instr, LirNode, LirProgram};

use crate::fold::bytes_to_int;

pub fn contextualize(nodes: Vec<LirNode>, options: &CompileOptions) -> Result<LirProgram, CompileError> {
    let mut prog = LirProgram::from_nodes(nodes);
    build_index_maps(&mut prog);
    build_branches(&mut prog)?;
    infer_runtime_fields(&mut prog);
    if !options.allow_invalid_comparisons {
        validate_hash_lengths(&prog.instrs)?;
    }
    detect_duplicate_uses(&mut prog);
    route_altstack_assumptions(&mut prog, options)?;
    Ok(prog)
}

/// Sum of every instruction's static delta, or `None` if any remain
/// runtime-dependent after [`contextualize`] has done its inference.
pub fn total_delta(prog: &LirProgram) -> Option<i32> {
    prog.instrs.iter().try_fold(0i32, |acc, i| Some(acc + i.node.static_delta()?))
}

fn build_index_maps(prog: &mut LirProgram) {
    for instr in &prog.instrs {
        match &instr.node {
            LirNode::Assumption { var_name } => {
                prog.assumptions.entry(var_name.clone()).or_default().push(instr.idx);
            }
            LirNode::Variable { symbol_name } => {
                prog.variables.entry(symbol_name.clone()).or_default().push(instr.idx);
            }
            LirNode::Assignment { name } => {
                prog.assignments.entry(name.clone()).or_default().push(instr.idx);
            }
            _ => {}
        }
    }
}

struct OpenBranch {
    start: usize,
    nest_level: u32,
    /// Index into `prog.branches` of the true branch, once `Else` closes it.
    true_branch_idx: Option<usize>,
}

fn build_branches(prog: &mut LirProgram) -> Result<(), CompileError> {
    let mut stack: Vec<OpenBranch> = Vec::new();
    let instrs_snapshot: Vec<(usize, LirNode)> =
        prog.instrs.iter().map(|i| (i.idx, i.node.clone())).collect();

    for (idx, node) in &instrs_snapshot {
        match node {
            LirNode::If | LirNode::NotIf => {
                stack.push(OpenBranch {
                    start: idx + 1,
                    nest_level: stack.len() as u32,
                    true_branch_idx: None,
                });
            }
            LirNode::Else => {
                let open = stack.last_mut().ok_or_else(|| CompileError::Ir {
                    line: 0,
                    message: "OP_ELSE without a matching OP_IF".to_string(),
                })?;
                prog.branches.push(ConditionalBranch {
                    is_truebranch: true,
                    start: open.start,
                    end: *idx,
                    nest_level: open.nest_level,
                    orelse: None,
                });
                open.true_branch_idx = Some(prog.branches.len() - 1);
                open.start = idx + 1;
            }
            LirNode::EndIf => {
                let open = stack.pop().ok_or_else(|| CompileError::Ir {
                    line: 0,
                    message: "OP_ENDIF without a matching OP_IF".to_string(),
                })?;
                let this_idx = prog.branches.len();
                let is_truebranch = open.true_branch_idx.is_none();
                prog.branches.push(ConditionalBranch {
                    is_truebranch,
                    start: open.start,
                    end: *idx,
                    nest_level: open.nest_level,
                    orelse: open.true_branch_idx,
                });
                if let Some(true_idx) = open.true_branch_idx {
                    prog.branches[true_idx].orelse = Some(this_idx);
                }
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CompileError::Ir {
            line: 0,
            message: "unbalanced conditional: OP_IF without a matching OP_ENDIF".to_string(),
        });
    }
    Ok(())
}

fn const_value(node: &LirNode) -> Option<i64> {
    match node {
        LirNode::SmallIntOpCode { value, .. } => Some(*value as i64),
        LirNode::Push { data } if data.len() <= 4 => Some(bytes_to_int(data)),
        _ => None,
    }
}

fn infer_runtime_fields(prog: &mut LirProgram) {
    let snapshot: Vec<LirNode> = prog.instrs.iter().map(|i| i.node.clone()).collect();
    for i in 0..prog.instrs.len() {
        let name = match &snapshot[i] {
            LirNode::OpCode { name, .. } => name.clone(),
            _ => continue,
        };
        match name.as_str() {
            "OP_CHECKMULTISIG" | "OP_CHECKMULTISIGVERIFY" => {
                if let Some((delta, popped)) =
                    infer_checkmultisig_delta(&snapshot, i, name == "OP_CHECKMULTISIGVERIFY")
                {
                    if let LirNode::OpCode { delta: d, args, .. } = &mut prog.instrs[i].node {
                        *d = Some(delta);
                        *args = (1..=popped as i32).collect();
                    }
                }
            }
            "OP_IFDUP" => {
                if i > 0 {
                    if let Some(v) = const_value(&snapshot[i - 1]) {
                        if let LirNode::OpCode { delta, .. } = &mut prog.instrs[i].node {
                            *delta = Some(if v != 0 { 1 } else { 0 });
                        }
                    }
                }
            }
            "OP_PICK" | "OP_ROLL" => {
                if i > 0 {
                    if let Some(n) = const_value(&snapshot[i - 1]) {
                        if let LirNode::OpCode { args, .. } = &mut prog.instrs[i].node {
                            *args = smallvec![1, n as i32 + 2];
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// `sig1..sigm m pub1..pubn n CHECKMULTISIG`: infers `m`/`n` from the
/// literal counts immediately preceding the call, when both are constant.
/// Returns `(delta, total_operands_popped)`.
fn infer_checkmultisig_delta(instrs: &[LirNode], idx: usize, verify: bool) -> Option<(i32, i64)> {
    if idx == 0 {
        return None;
    }
    let n = const_value(&instrs[idx - 1])?;
    if n < 0 {
        return None;
    }
    let idx_m = (idx - 1).checked_sub(n as usize)?.checked_sub(1)?;
    let m = const_value(&instrs[idx_m])?;
    if m < 0 {
        return None;
    }
    let popped = 1 + m + 1 + n + 1;
    let delta = 1 - popped as i32;
    Some((if verify { delta - 1 } else { delta }, popped))
}

const HASH160_LEN: usize = 20;
const HASH256_LEN: usize = 32;

fn hash_output_len(name: &str) -> Option<usize> {
    match name {
        "OP_RIPEMD160" | "OP_HASH160" | "OP_SHA1" => Some(HASH160_LEN),
        "OP_SHA256" | "OP_HASH256" => Some(HASH256_LEN),
        _ => None,
    }
}

/// Looks a fixed window backward from an `OP_EQUAL`/`OP_EQUALVERIFY` for a
/// hash opcode paired with a literal push, and checks the literal's length
/// matches that hash's fixed output size (spec §4.5's hash-length check).
fn validate_hash_lengths(instrs: &[Instr]) -> Result<(), CompileError> {
    const LOOKBACK: usize = 12;
    for (i, instr) in instrs.iter().enumerate() {
        if let LirNode::InnerScript { ops } = &instr.node {
            validate_hash_lengths(
                &ops.iter()
                    .enumerate()
                    .map(|(idx, node)| Instr { idx, node: node.clone() })
                    .collect::<Vec<_>>(),
            )?;
            continue;
        }
        let is_equal = matches!(&instr.node, LirNode::OpCode { name, .. } if name == "OP_EQUAL" || name == "OP_EQUALVERIFY");
        if !is_equal || i == 0 {
            continue;
        }
        let literal_len = match &instrs[i - 1].node {
            LirNode::Push { data } => data.len(),
            _ => continue,
        };
        let window_start = i.saturating_sub(LOOKBACK);
        let hash_len = instrs[window_start..i - 1].iter().find_map(|prior| match &prior.node {
            LirNode::OpCode { name, .. } => hash_output_len(name),
            _ => None,
        });
        if let Some(expected) = hash_len {
            if literal_len != expected {
                return Err(CompileError::Ir {
                    line: 0,
                    message: format!(
                        "literal compared against a hash output is {literal_len} bytes, expected {expected}"
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Flags `(idx, var_name)` where two consecutive instructions read the same
/// assumption -- the stack-state simulator must duplicate it rather than
/// assume a single read consumes the slot (spec §4.5).
fn detect_duplicate_uses(prog: &mut LirProgram) {
    let snapshot: Vec<LirNode> = prog.instrs.iter().map(|i| i.node.clone()).collect();
    for i in 1..snapshot.len() {
        if let (LirNode::Assumption { var_name: a }, LirNode::Assumption { var_name: b }) =
            (&snapshot[i - 1], &snapshot[i])
        {
            if a == b {
                prog.duplicate_uses.push((i, a.clone()));
            }
        }
    }
}

fn branch_delta(instrs: &[Instr], start: usize, end: usize) -> Option<i32> {
    instrs[start..end].iter().try_fold(0i32, |acc, i| Some(acc + i.node.static_delta()?))
}

/// Finds assumptions referenced both before a conditional and after its
/// `OP_ENDIF`, where the conditional's two branches have unequal (or
/// unknowable) net delta -- those assumptions cannot sit at a fixed depth
/// across both branches and must be parked on the alt stack for the
/// duration of the conditional (spec §4.5, §4.8).
fn route_altstack_assumptions(prog: &mut LirProgram, options: &CompileOptions) -> Result<(), CompileError> {
    let pairs: Vec<(&ConditionalBranch, Option<&ConditionalBranch>)> = prog
        .branches
        .iter()
        .filter(|b| b.is_truebranch)
        .map(|t| (t, t.orelse.map(|i| &prog.branches[i])))
        .collect();

    let mut flagged: Vec<String> = Vec::new();
    for (truebranch, falsebranch) in pairs {
        let true_delta = branch_delta(&prog.instrs, truebranch.start, truebranch.end);
        let false_delta = match falsebranch {
            Some(f) => branch_delta(&prog.instrs, f.start, f.end),
            None => Some(0),
        };
        if true_delta.is_some() && true_delta == false_delta {
            continue;
        }
        // Uneven: the `OP_IF`/`OP_NOTIF` marker sits one instruction before
        // `truebranch.start`; `OP_ENDIF` sits one instruction after the last
        // branch's `end`.
        let if_idx = truebranch.start.saturating_sub(1);
        let endif_idx = falsebranch.map(|f| f.end).unwrap_or(truebranch.end) + 1;
        for (name, uses) in prog.assumptions.iter() {
            let before = uses.iter().any(|&u| u < if_idx);
            let after = uses.iter().any(|&u| u > endif_idx);
            if before && after && !flagged.contains(name) {
                flagged.push(name.clone());
            }
        }
    }

    if !flagged.is_empty() {
        if !options.use_altstack_for_assumptions {
            return Err(CompileError::Ir {
                line: 0,
                message: format!(
                    "assumption(s) {} survive an uneven conditional but alt-stack routing is disabled",
                    flagged.join(", ")
                ),
            });
        }
        prog.altstack_assumptions = flagged;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcode(name: &str, delta: Option<i32>) -> LirNode {
        LirNode::OpCode { name: name.to_string(), args: smallvec![], delta, verifier: false }
    }

    #[test]
    fn assigns_sequential_idx_and_maps() {
        let nodes = vec![
            LirNode::Assumption { var_name: "a".into() },
            LirNode::Variable { symbol_name: "x".into() },
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        assert_eq!(prog.instrs[0].idx, 0);
        assert_eq!(prog.assumptions["a"], vec![0]);
        assert_eq!(prog.variables["x"], vec![1]);
    }

    #[test]
    fn builds_if_else_branch_pair_with_orelse_link() {
        let nodes = vec![
            LirNode::Push { data: vec![1] },
            LirNode::If,
            LirNode::Push { data: vec![2] },
            LirNode::Else,
            LirNode::Push { data: vec![3] },
            LirNode::EndIf,
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        assert_eq!(prog.branches.len(), 2);
        let t = prog.branches.iter().find(|b| b.is_truebranch).unwrap();
        let f = prog.branches.iter().find(|b| !b.is_truebranch).unwrap();
        assert_eq!(t.orelse, Some(prog.branches.iter().position(|b| !b.is_truebranch).unwrap()));
        assert_eq!(f.orelse, Some(prog.branches.iter().position(|b| b.is_truebranch).unwrap()));
    }

    #[test]
    fn unbalanced_endif_errors() {
        let nodes = vec![LirNode::EndIf];
        assert!(contextualize(nodes, &CompileOptions::default()).is_err());
    }

    #[test]
    fn infers_checkmultisig_delta_from_constant_counts() {
        let nodes = vec![
            LirNode::Push { data: vec![0xaa] }, // sig1
            LirNode::SmallIntOpCode { value: 1, name: "OP_1".into() }, // m=1
            LirNode::Push { data: vec![0xbb] }, // pub1
            LirNode::SmallIntOpCode { value: 1, name: "OP_1".into() }, // n=1
            opcode("OP_CHECKMULTISIG", None),
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        let LirNode::OpCode { delta, .. } = &prog.instrs[4].node else { panic!() };
        assert_eq!(*delta, Some(1 - (1 + 1 + 1 + 1 + 1)));
    }

    #[test]
    fn infers_ifdup_delta_from_constant_predecessor() {
        let nodes = vec![
            LirNode::SmallIntOpCode { value: 0, name: "OP_0".into() },
            opcode("OP_IFDUP", None),
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        let LirNode::OpCode { delta, .. } = &prog.instrs[1].node else { panic!() };
        assert_eq!(*delta, Some(0));
    }

    #[test]
    fn hash_length_mismatch_errors() {
        let nodes = vec![
            LirNode::Push { data: vec![0u8; 4] },
            opcode("OP_HASH160", Some(0)),
            LirNode::Push { data: vec![0u8; 10] },
            opcode("OP_EQUAL", Some(-1)),
        ];
        let err = contextualize(nodes, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Ir { .. }));
    }

    #[test]
    fn hash_length_mismatch_allowed_when_option_set() {
        let mut options = CompileOptions::default();
        options.allow_invalid_comparisons = true;
        let nodes = vec![
            LirNode::Push { data: vec![0u8; 4] },
            opcode("OP_HASH160", Some(0)),
            LirNode::Push { data: vec![0u8; 10] },
            opcode("OP_EQUAL", Some(-1)),
        ];
        assert!(contextualize(nodes, &options).is_ok());
    }

    #[test]
    fn hash_length_match_is_accepted() {
        let nodes = vec![
            LirNode::Push { data: vec![0u8; 4] },
            opcode("OP_HASH160", Some(0)),
            LirNode::Push { data: vec![0u8; 20] },
            opcode("OP_EQUAL", Some(-1)),
        ];
        assert!(contextualize(nodes, &CompileOptions::default()).is_ok());
    }

    #[test]
    fn consecutive_same_assumption_flagged_duplicate() {
        let nodes = vec![
            LirNode::Assumption { var_name: "a".into() },
            LirNode::Assumption { var_name: "a".into() },
            opcode("OP_EQUAL", Some(-1)),
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        assert_eq!(prog.duplicate_uses, vec![(1, "a".to_string())]);
    }

    #[test]
    fn uneven_conditional_routes_assumption_to_altstack() {
        let nodes = vec![
            LirNode::Assumption { var_name: "a".into() },
            LirNode::Push { data: vec![1] },
            LirNode::If,
            LirNode::Push { data: vec![9] },
            LirNode::EndIf,
            LirNode::Assumption { var_name: "a".into() },
            opcode("OP_DROP", Some(-1)),
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        assert_eq!(prog.altstack_assumptions, vec!["a".to_string()]);
    }

    #[test]
    fn uneven_conditional_errors_when_altstack_disabled() {
        let mut options = CompileOptions::default();
        options.use_altstack_for_assumptions = false;
        let nodes = vec![
            LirNode::Assumption { var_name: "a".into() },
            LirNode::Push { data: vec![1] },
            LirNode::If,
            LirNode::Push { data: vec![9] },
            LirNode::EndIf,
            LirNode::Assumption { var_name: "a".into() },
            opcode("OP_DROP", Some(-1)),
        ];
        assert!(contextualize(nodes, &options).is_err());
    }

    #[test]
    fn total_delta_sums_known_deltas() {
        let nodes = vec![
            LirNode::Push { data: vec![1] },
            LirNode::Push { data: vec![2] },
            opcode("OP_ADD", Some(-1)),
        ];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        assert_eq!(total_delta(&prog), Some(1));
    }

    #[test]
    fn total_delta_is_none_when_a_delta_is_unresolved() {
        let nodes = vec![opcode("OP_CHECKMULTISIG", None)];
        let prog = contextualize(nodes, &CompileOptions::default()).unwrap();
        assert_eq!(total_delta(&prog), None);
    }
}
