//! The alt-stack manager (spec §4.8): allocates a dense slot index to every
//! variable whose live range needs it (assignments inside a conditional,
//! assumptions that outlast an uneven conditional) and emits the
//! straight-line save/restore sequences the inliner splices in.
//!
//! Slots are pushed onto the alt stack in allocation order, so slot `0`
//! ends up deepest and slot `k-1` nearest the alt-stack top; "items above"
//! a slot are exactly the slots allocated after it.

use indexmap::IndexSet;
use txsc_core::{opcode, LirNode};

pub struct AltStackManager {
    slots: IndexSet<String>,
}

impl AltStackManager {
    pub fn new() -> Self {
        AltStackManager { slots: IndexSet::new() }
    }

    /// Assigns `name` the next free dense index, a no-op if already allocated.
    pub fn allocate(&mut self, name: &str) -> usize {
        if let Some(idx) = self.slots.get_index_of(name) {
            return idx;
        }
        self.slots.insert(name.to_string());
        self.slots.len() - 1
    }

    pub fn is_allocated(&self, name: &str) -> bool {
        self.slots.contains(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Count of slots allocated after `name`'s -- how many `FromAltStack`s
    /// it takes to reach `name`'s own value.
    pub fn n_above(&self, name: &str) -> Option<usize> {
        self.slots.get_index_of(name).map(|idx| self.slots.len() - 1 - idx)
    }

    /// `[initial_value…, ToAltStack]` for every slot, in allocation order, to
    /// be emitted at the very start of the program.
    pub fn prologue(&self, initial_value_of: impl Fn(&str) -> Vec<LirNode>) -> Vec<LirNode> {
        let mut ops = Vec::new();
        for name in &self.slots {
            ops.extend(initial_value_of(name));
            ops.push(op("OP_TOALTSTACK"));
        }
        ops
    }

    /// Retrieves `name`'s current value onto the main stack. `last_use`
    /// leaves it consumed (not restored to the alt stack); otherwise a copy
    /// is restored so later reads still find it.
    pub fn get(&self, name: &str, last_use: bool) -> Vec<LirNode> {
        let n_above = self.n_above(name).unwrap_or(0);
        let mut ops = Vec::with_capacity(2 * n_above + 3);
        for _ in 0..n_above {
            ops.push(op("OP_FROMALTSTACK"));
        }
        ops.push(op("OP_FROMALTSTACK"));
        if !last_use {
            ops.push(op("OP_DUP"));
            ops.push(op("OP_TOALTSTACK"));
        }
        for _ in 0..n_above {
            ops.push(op("OP_TOALTSTACK"));
        }
        ops
    }

    /// Replaces `name`'s alt-stack value with the value produced by
    /// `new_value_ops`.
    pub fn set(&self, name: &str, new_value_ops: Vec<LirNode>) -> Vec<LirNode> {
        let n_above = self.n_above(name).unwrap_or(0);
        let mut ops = new_value_ops;
        for _ in 0..n_above {
            ops.push(op("OP_FROMALTSTACK"));
        }
        ops.push(op("OP_FROMALTSTACK")); // old value, discarded below
        ops.push(op("OP_DROP"));
        ops.push(int_push(n_above as i64));
        ops.push(op("OP_ROLL"));
        ops.push(op("OP_TOALTSTACK"));
        for _ in 0..n_above {
            ops.push(op("OP_TOALTSTACK"));
        }
        ops
    }
}

impl Default for AltStackManager {
    fn default() -> Self {
        Self::new()
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_assigns_dense_indices_in_order() {
        let mut mgr = AltStackManager::new();
        assert_eq!(mgr.allocate("a"), 0);
        assert_eq!(mgr.allocate("b"), 1);
        assert_eq!(mgr.allocate("a"), 0);
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn n_above_counts_later_allocated_slots() {
        let mut mgr = AltStackManager::new();
        mgr.allocate("a");
        mgr.allocate("b");
        mgr.allocate("c");
        assert_eq!(mgr.n_above("c"), Some(0));
        assert_eq!(mgr.n_above("b"), Some(1));
        assert_eq!(mgr.n_above("a"), Some(2));
    }

    #[test]
    fn prologue_pushes_initial_value_then_toaltstack_per_slot() {
        let mut mgr = AltStackManager::new();
        mgr.allocate("a");
        mgr.allocate("b");
        let ops = mgr.prologue(|name| vec![LirNode::Push { data: name.as_bytes().to_vec() }]);
        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[1], LirNode::OpCode { name, .. } if name == "OP_TOALTSTACK"));
        assert!(matches!(&ops[3], LirNode::OpCode { name, .. } if name == "OP_TOALTSTACK"));
    }

    #[test]
    fn get_with_no_slots_above_is_a_single_fromaltstack_pair() {
        let mut mgr = AltStackManager::new();
        mgr.allocate("only");
        let keep_alive = mgr.get("only", false);
        assert_eq!(keep_alive.len(), 3); // FromAltStack, Dup, ToAltStack
        let consumed = mgr.get("only", true);
        assert_eq!(consumed.len(), 1);
    }

    #[test]
    fn get_restores_slots_allocated_above() {
        let mut mgr = AltStackManager::new();
        mgr.allocate("a");
        mgr.allocate("b");
        let ops = mgr.get("a", false);
        // 1 FromAltStack for b, 1 FromAltStack for a, Dup, ToAltStack, 1 ToAltStack for b.
        assert_eq!(ops.len(), 5);
    }

    #[test]
    fn set_emits_push_pop_drop_roll_restore_sequence() {
        let mut mgr = AltStackManager::new();
        mgr.allocate("a");
        let new_value = vec![LirNode::Push { data: vec![42] }];
        let ops = mgr.set("a", new_value);
        assert!(matches!(ops.first(), Some(LirNode::Push { data }) if data == &vec![42]));
        assert!(ops.iter().any(|n| matches!(n, LirNode::OpCode { name, .. } if name == "OP_ROLL")));
        assert!(ops.iter().any(|n| matches!(n, LirNode::OpCode { name, .. } if name == "OP_DROP")));
    }
}
