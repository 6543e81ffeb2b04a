//! The stack-state simulator (spec §4.6): walks a LIR instruction sequence
//! maintaining a simulated stack, with a scope copy pushed at every
//! conditional marker so `Else` can reopen from the same starting state the
//! true branch began from. Used by the variable inliner (to locate the
//! cheapest occurrence of an assumption) and the alt-stack manager (to
//! compute `n_above` counts).

use txsc_core::{CompileError, Instr, LirNode};

/// One simulated stack slot. Most ops push/pop opaque [`Slot::Other`]
/// values; assumptions and user variables are tracked by name so later
/// passes can find them again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Assumption(String),
    Variable(String),
    Other,
}

#[derive(Clone)]
pub struct StackStateSimulator {
    stack: Vec<Slot>,
    altstack: Vec<Slot>,
    scopes: Vec<Vec<Slot>>,
}

impl StackStateSimulator {
    /// Seeds the simulator with the assumed stack inputs, bottom to top
    /// matching `_stack_names`' declared order (height 0 = bottom).
    pub fn new(initial_assumptions: &[String]) -> Self {
        StackStateSimulator {
            stack: initial_assumptions.iter().cloned().map(Slot::Assumption).collect(),
            altstack: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn stack(&self) -> &[Slot] {
        &self.stack
    }

    pub fn altstack(&self) -> &[Slot] {
        &self.altstack
    }

    /// Depth from the top (0 = top) of the nearest occurrence of `name`, if
    /// it is anywhere on the simulated stack.
    pub fn highest_assumption(&self, name: &str) -> Option<usize> {
        self.stack
            .iter()
            .rev()
            .position(|s| matches!(s, Slot::Assumption(n) if n == name))
    }

    /// Depth from the top (0 = top) of the nearest occurrence of the
    /// declared variable `name`.
    pub fn highest_variable(&self, name: &str) -> Option<usize> {
        self.stack
            .iter()
            .rev()
            .position(|s| matches!(s, Slot::Variable(n) if n == name))
    }

    /// A cheap snapshot used to probe ahead without disturbing `self` --
    /// the inliner's consecutive-assumption lookahead walks a speculative
    /// copy of the simulator rather than rewinding the real one.
    pub fn clone_for_lookahead(&self) -> Self {
        self.clone()
    }

    pub fn visit_all(&mut self, instrs: &[Instr]) -> Result<(), CompileError> {
        for instr in instrs {
            self.visit(&instr.node)?;
        }
        Ok(())
    }

    pub fn visit(&mut self, node: &LirNode) -> Result<(), CompileError> {
        match node {
            LirNode::Push { .. } => self.stack.push(Slot::Other),
            LirNode::SmallIntOpCode { .. } => self.stack.push(Slot::Other),
            LirNode::Assumption { var_name } => self.stack.push(Slot::Assumption(var_name.clone())),
            LirNode::Variable { symbol_name } => self.stack.push(Slot::Variable(symbol_name.clone())),
            LirNode::Declaration { name, .. } | LirNode::Assignment { name } => {
                if let Some(top) = self.stack.last_mut() {
                    *top = Slot::Variable(name.clone());
                }
            }
            LirNode::Deletion { .. } => {}
            LirNode::InnerScript { .. } => self.stack.push(Slot::Other),
            LirNode::If | LirNode::NotIf => {
                self.pop_n(1)?;
                self.scopes.push(self.stack.clone());
            }
            LirNode::Else => {
                let snapshot = self.scopes.last().cloned().ok_or_else(|| CompileError::Ir {
                    line: 0,
                    message: "OP_ELSE without a matching OP_IF".to_string(),
                })?;
                self.stack = snapshot;
            }
            LirNode::EndIf => {
                if self.scopes.pop().is_none() {
                    return Err(CompileError::Ir {
                        line: 0,
                        message: "OP_ENDIF without a matching OP_IF".to_string(),
                    });
                }
            }
            LirNode::OpCode { name, args, delta, .. } => self.visit_opcode(name, args, *delta)?,
        }
        Ok(())
    }

    fn visit_opcode(&mut self, name: &str, args: &[i32], delta: Option<i32>) -> Result<(), CompileError> {
        match name {
            "OP_DUP" => {
                let top = self.peek(0)?.clone();
                self.stack.push(top);
            }
            "OP_SWAP" => self.swap_top(0, 1)?,
            "OP_ROT" => {
                let len = self.stack.len();
                if len < 3 {
                    return Err(self.underflow_err());
                }
                self.stack[len - 3..].rotate_left(1);
            }
            "OP_TUCK" => {
                let top = self.peek(0)?.clone();
                let len = self.stack.len();
                if len < 2 {
                    return Err(self.underflow_err());
                }
                self.stack.insert(len - 2, top);
            }
            "OP_OVER" => {
                let item = self.peek(1)?.clone();
                self.stack.push(item);
            }
            "OP_2DUP" => {
                let (a, b) = (self.peek(1)?.clone(), self.peek(0)?.clone());
                self.stack.push(a);
                self.stack.push(b);
            }
            "OP_3DUP" => {
                let (a, b, c) = (self.peek(2)?.clone(), self.peek(1)?.clone(), self.peek(0)?.clone());
                self.stack.push(a);
                self.stack.push(b);
                self.stack.push(c);
            }
            "OP_2OVER" => {
                let (a, b) = (self.peek(3)?.clone(), self.peek(2)?.clone());
                self.stack.push(a);
                self.stack.push(b);
            }
            "OP_2ROT" => {
                let len = self.stack.len();
                if len < 6 {
                    return Err(self.underflow_err());
                }
                self.stack[len - 6..].rotate_left(2);
            }
            "OP_2SWAP" => {
                let len = self.stack.len();
                if len < 4 {
                    return Err(self.underflow_err());
                }
                self.stack[len - 4..].rotate_left(2);
            }
            "OP_PICK" | "OP_ROLL" => {
                self.pop_n(1)?; // the runtime depth argument
                let n = args.get(1).map(|v| v - 2).ok_or_else(|| CompileError::Ir {
                    line: 0,
                    message: format!("{name} has no statically known depth to simulate"),
                })?;
                let len = self.stack.len();
                let pos = len.checked_sub(1 + n as usize).ok_or_else(|| self.underflow_err())?;
                if name == "OP_PICK" {
                    let item = self.stack[pos].clone();
                    self.stack.push(item);
                } else {
                    let item = self.stack.remove(pos);
                    self.stack.push(item);
                }
            }
            "OP_TOALTSTACK" => {
                let item = self.pop_n(1)?.remove(0);
                self.altstack.push(item);
            }
            "OP_FROMALTSTACK" => {
                let item = self.altstack.pop().ok_or_else(|| CompileError::Ir {
                    line: 0,
                    message: "OP_FROMALTSTACK on an empty alt stack".to_string(),
                })?;
                self.stack.push(item);
            }
            "OP_DEPTH" => self.stack.push(Slot::Other),
            _ => self.visit_generic(delta)?,
        }
        Ok(())
    }

    fn visit_generic(&mut self, delta: Option<i32>) -> Result<(), CompileError> {
        match delta {
            Some(d) if d > 0 => {
                for _ in 0..d {
                    self.stack.push(Slot::Other);
                }
            }
            Some(d) if d < 0 => {
                self.pop_n((-d) as usize)?;
            }
            Some(_) => {}
            None => {
                return Err(CompileError::Ir {
                    line: 0,
                    message: "cannot simulate an opcode with an unresolved stack delta".to_string(),
                })
            }
        }
        Ok(())
    }

    fn peek(&self, depth_from_top: usize) -> Result<&Slot, CompileError> {
        let len = self.stack.len();
        let idx = len.checked_sub(1 + depth_from_top).ok_or_else(|| self.underflow_err())?;
        self.stack.get(idx).ok_or_else(|| self.underflow_err())
    }

    fn swap_top(&mut self, a: usize, b: usize) -> Result<(), CompileError> {
        let len = self.stack.len();
        let (ia, ib) = (
            len.checked_sub(1 + a).ok_or_else(|| self.underflow_err())?,
            len.checked_sub(1 + b).ok_or_else(|| self.underflow_err())?,
        );
        self.stack.swap(ia, ib);
        Ok(())
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Slot>, CompileError> {
        if self.stack.len() < n {
            return Err(self.underflow_err());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn underflow_err(&self) -> CompileError {
        CompileError::Ir {
            line: 0,
            message: "stack underflow during simulation".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn opcode(name: &str, delta: Option<i32>) -> LirNode {
        LirNode::OpCode { name: name.to_string(), args: smallvec![], delta, verifier: false }
    }

    #[test]
    fn dup_duplicates_top() {
        let mut sim = StackStateSimulator::new(&[]);
        sim.visit(&LirNode::Push { data: vec![1] }).unwrap();
        sim.visit(&opcode("OP_DUP", Some(1))).unwrap();
        assert_eq!(sim.stack().len(), 2);
    }

    #[test]
    fn swap_reorders_top_two() {
        let mut sim = StackStateSimulator::new(&["a".into(), "b".into()]);
        sim.visit(&opcode("OP_SWAP", Some(0))).unwrap();
        assert_eq!(sim.stack()[0], Slot::Assumption("b".into()));
        assert_eq!(sim.stack()[1], Slot::Assumption("a".into()));
    }

    #[test]
    fn highest_assumption_finds_nearest_to_top() {
        let sim = StackStateSimulator::new(&["a".into(), "b".into(), "a".into()]);
        assert_eq!(sim.highest_assumption("a"), Some(0));
        assert_eq!(sim.highest_assumption("b"), Some(1));
    }

    #[test]
    fn toaltstack_moves_between_stacks() {
        let mut sim = StackStateSimulator::new(&["a".into()]);
        sim.visit(&opcode("OP_TOALTSTACK", Some(-1))).unwrap();
        assert!(sim.stack().is_empty());
        assert_eq!(sim.altstack(), &[Slot::Assumption("a".into())]);
        sim.visit(&opcode("OP_FROMALTSTACK", Some(1))).unwrap();
        assert_eq!(sim.stack(), &[Slot::Assumption("a".into())]);
    }

    #[test]
    fn declaration_labels_top_slot_as_variable() {
        let mut sim = StackStateSimulator::new(&[]);
        sim.visit(&LirNode::Push { data: vec![1] }).unwrap();
        sim.visit(&LirNode::Declaration { name: "x".into(), mutable: true }).unwrap();
        assert_eq!(sim.stack(), &[Slot::Variable("x".into())]);
    }

    #[test]
    fn if_else_endif_restores_branch_start_state() {
        let mut sim = StackStateSimulator::new(&[]);
        sim.visit(&LirNode::Push { data: vec![1] }).unwrap(); // test value
        sim.visit(&LirNode::If).unwrap();
        sim.visit(&LirNode::Push { data: vec![2] }).unwrap();
        sim.visit(&LirNode::Push { data: vec![3] }).unwrap();
        assert_eq!(sim.stack().len(), 2);
        sim.visit(&LirNode::Else).unwrap();
        assert_eq!(sim.stack().len(), 0);
        sim.visit(&LirNode::Push { data: vec![9] }).unwrap();
        sim.visit(&LirNode::EndIf).unwrap();
        assert_eq!(sim.stack().len(), 1);
    }

    #[test]
    fn pick_duplicates_item_at_inferred_depth() {
        let mut sim = StackStateSimulator::new(&["a".into(), "b".into()]);
        sim.visit(&LirNode::SmallIntOpCode { value: 1, name: "OP_1".into() }).unwrap();
        let pick = LirNode::OpCode {
            name: "OP_PICK".into(),
            args: smallvec![1, 3], // n = args[1]-2 = 1
            delta: Some(0),
            verifier: false,
        };
        sim.visit(&pick).unwrap();
        assert_eq!(sim.stack().last(), Some(&Slot::Assumption("a".into())));
    }

    #[test]
    fn unresolved_delta_errors() {
        let mut sim = StackStateSimulator::new(&[]);
        let err = sim.visit(&opcode("OP_CHECKMULTISIG", None)).unwrap_err();
        assert!(matches!(err, CompileError::Ir { .. }));
    }
}
