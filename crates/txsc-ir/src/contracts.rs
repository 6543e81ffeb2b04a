//! Property-based testing harness for the pipeline's quantified invariants
//! (spec §8), grounded on the teacher's `lmlang-check::contracts::property`:
//! a pool of hand-picked seed programs runs first, then randomized
//! variations from a deterministic PRNG, and every run is checked against
//! the same invariants.
//!
//! Reproducibility: given the same `random_seed`, the same program
//! fragments are generated and the same invariants are checked.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use txsc_core::{CompileOptions, LirNode};

use crate::contextualize::{contextualize, total_delta};
use crate::peephole;

/// Config for a property-test run over the LIR pipeline.
#[derive(Debug, Clone)]
struct PropertyTestConfig {
    seeds: Vec<Vec<LirNode>>,
    iterations: u32,
    random_seed: u64,
}

/// One opcode pool entry: name plus its static stack delta, so generated
/// fragments stay balanced enough to contextualize without underflowing.
const BALANCED_OPS: &[(&str, i32)] = &[
    ("OP_ADD", -1),
    ("OP_SUB", -1),
    ("OP_BOOLAND", -1),
    ("OP_EQUAL", -1),
    ("OP_DUP", 1),
    ("OP_DROP", -1),
    ("OP_NOT", 0),
];

fn random_push(rng: &mut ChaCha8Rng) -> LirNode {
    if rng.gen_ratio(3, 10) {
        let boundaries: &[i32] = &[0, 1, -1, 16, 127];
        LirNode::SmallIntOpCode {
            value: boundaries[rng.gen_range(0..boundaries.len())],
            name: "OP_1".to_string(),
        }
    } else {
        let len = rng.gen_range(1..=4);
        LirNode::Push { data: (0..len).map(|_| rng.gen()).collect() }
    }
}

fn random_op(rng: &mut ChaCha8Rng) -> (LirNode, i32) {
    let (name, delta) = BALANCED_OPS[rng.gen_range(0..BALANCED_OPS.len())];
    (
        LirNode::OpCode {
            name: name.to_string(),
            args: Default::default(),
            delta: Some(delta),
            verifier: false,
        },
        delta,
    )
}

/// Builds a random but non-underflowing fragment: enough pushes up front
/// that the running depth never goes negative, per spec §8's `total_delta`
/// invariant.
fn generate_random_fragment(rng: &mut ChaCha8Rng) -> Vec<LirNode> {
    let n_pushes = rng.gen_range(2..=5);
    let mut nodes: Vec<LirNode> = (0..n_pushes).map(|_| random_push(rng)).collect();
    let mut depth = nodes.len() as i32;
    let n_ops = rng.gen_range(0..=4);
    for _ in 0..n_ops {
        if depth < 2 {
            break;
        }
        let (op, delta) = random_op(rng);
        depth += delta;
        nodes.push(op);
    }
    nodes
}

fn seed_fragments() -> Vec<Vec<LirNode>> {
    vec![
        vec![LirNode::SmallIntOpCode { value: 2, name: "OP_2".into() }],
        vec![
            LirNode::SmallIntOpCode { value: 2, name: "OP_2".into() },
            LirNode::SmallIntOpCode { value: 3, name: "OP_3".into() },
            LirNode::OpCode { name: "OP_ADD".into(), args: Default::default(), delta: Some(-1), verifier: false },
        ],
        vec![
            LirNode::Push { data: vec![1, 2, 3] },
            LirNode::OpCode { name: "OP_DUP".into(), args: Default::default(), delta: Some(1), verifier: false },
            LirNode::OpCode { name: "OP_EQUAL".into(), args: Default::default(), delta: Some(-1), verifier: false },
        ],
        vec![LirNode::Assumption { var_name: "sig".into() }, LirNode::Assumption { var_name: "sig".into() }],
    ]
}

fn run_one(fragment: Vec<LirNode>, options: &CompileOptions) {
    let prog = match contextualize(fragment.clone(), options) {
        Ok(p) => p,
        Err(_) => return,
    };

    if let Some(delta) = total_delta(&prog) {
        assert!(delta >= 0, "total_delta went negative for {fragment:?}: {delta}");
    }

    for (name, uses) in prog.assumptions.iter() {
        for window in uses.windows(2) {
            assert!(
                window[0] < window[1],
                "assumption '{name}' occurrences out of order: {uses:?}"
            );
        }
    }

    let once = peephole::optimize(fragment.clone(), options);
    let twice = peephole::optimize(once.clone(), options);
    assert_eq!(once, twice, "peephole is not confluent for {fragment:?}");
}

fn run_property_tests(config: PropertyTestConfig, options: &CompileOptions) {
    let mut rng = ChaCha8Rng::seed_from_u64(config.random_seed);

    for seed in &config.seeds {
        run_one(seed.clone(), options);
    }
    for _ in 0..config.iterations {
        run_one(generate_random_fragment(&mut rng), options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsc_core::CompileOptions;

    #[test]
    fn total_delta_never_goes_negative() {
        let options = CompileOptions::default();
        run_property_tests(
            PropertyTestConfig { seeds: seed_fragments(), iterations: 200, random_seed: 42 },
            &options,
        );
    }

    #[test]
    fn property_test_reproducibility() {
        let mut rng1 = ChaCha8Rng::seed_from_u64(99999);
        let mut rng2 = ChaCha8Rng::seed_from_u64(99999);
        for _ in 0..50 {
            assert_eq!(
                format!("{:?}", generate_random_fragment(&mut rng1)),
                format!("{:?}", generate_random_fragment(&mut rng2)),
            );
        }
    }

    #[test]
    fn inliner_reaches_fixed_point_on_seeds() {
        let options = CompileOptions::default();
        for seed in seed_fragments() {
            let stack_names = crate::inline::assumed_names(&seed);
            let result = crate::inline::inline_variables(seed.clone(), &stack_names, &options);
            assert!(result.is_ok(), "inliner did not terminate for {seed:?}");
        }
    }
}
