//! The process-wide opcode descriptor table (spec §4.1).
//!
//! A table maps an opcode name (`OP_ADD`) to a [`OpDescriptor`] recording its
//! stack effect, the relative depths of the operands it consumes, and the
//! flags downstream passes key off: `arithmetic`, `byte_manipulator`,
//! `verifier`. The table is built once by an [`OpcodeSet`] and frozen -- the
//! set can be swapped at process start via [`set_opcode_set`], but not after
//! the first [`table`] lookup, mirroring the teacher's "initialization phase
//! builds an immutable descriptor map shared by reference" pattern (spec §9).

use std::sync::OnceLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Net stack effect of an opcode. `None` marks an opcode whose effect can
/// only be known once the contextualizer inspects the instructions around
/// it (`CheckMultiSig`, `IfDup`, `Pick`, `Roll`), per spec §4.5.
pub type Delta = Option<i32>;

/// One opcode's static metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpDescriptor {
    pub name: &'static str,
    /// Net stack effect; positive pushes, negative pops.
    pub delta: Delta,
    /// 1-based relative depths of the operands this op consumes, e.g. `[1]`
    /// for a unary op, `[1, 2]` for a binary op. Empty for opcodes with no
    /// fixed arity (runtime-dependent ones are populated by the
    /// contextualizer instead).
    pub args: SmallVec<[i32; 4]>,
    pub arithmetic: bool,
    pub byte_manipulator: bool,
    pub verifier: bool,
    /// Display template used by ASM emission; `None` falls back to `name`.
    pub opstr: Option<&'static str>,
    /// `Some(n)` for the sixteen small-integer push opcodes `OP_0..OP_16`.
    pub value: Option<i32>,
    /// Name of the non-verify opcode this is the `*VERIFY` form of, if any.
    /// Lets the peephole `op + verify -> opverify` rule (spec §4.9) be
    /// synthesized from the table rather than hard-coded per spec §4.1.
    pub verify_of: Option<&'static str>,
}

impl OpDescriptor {
    fn new(name: &'static str, delta: Delta, args: &[i32]) -> Self {
        OpDescriptor {
            name,
            delta,
            args: SmallVec::from_slice(args),
            arithmetic: false,
            byte_manipulator: false,
            verifier: false,
            opstr: None,
            value: None,
            verify_of: None,
        }
    }
}

/// A named, immutable collection of [`OpDescriptor`]s plus fast lookup by
/// small-integer value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcodeTable {
    by_name: IndexMap<&'static str, OpDescriptor>,
}

impl OpcodeTable {
    fn builder() -> OpcodeTableBuilder {
        OpcodeTableBuilder {
            by_name: IndexMap::new(),
        }
    }

    /// Looks up a descriptor by its `OP_`-prefixed name.
    pub fn by_name(&self, name: &str) -> Option<&OpDescriptor> {
        self.by_name.get(name)
    }

    /// Looks up the small-integer push descriptor for `n` (`OP_0..OP_16`).
    pub fn small_int_for(&self, n: i64) -> Option<&OpDescriptor> {
        if !(0..=16).contains(&n) {
            return None;
        }
        self.by_name
            .values()
            .find(|d| d.value == Some(n as i32))
    }

    /// Iterates every descriptor in the table, insertion order.
    pub fn iter_all(&self) -> impl Iterator<Item = &OpDescriptor> {
        self.by_name.values()
    }
}

struct OpcodeTableBuilder {
    by_name: IndexMap<&'static str, OpDescriptor>,
}

impl OpcodeTableBuilder {
    fn push(mut self, mut d: OpDescriptor, args: &[i32]) -> Self {
        d.args = SmallVec::from_slice(args);
        self.by_name.insert(d.name, d);
        self
    }

    fn arith(self, name: &'static str, delta: Delta, args: &[i32]) -> Self {
        let mut d = OpDescriptor::new(name, delta, &[]);
        d.arithmetic = true;
        self.push(d, args)
    }

    fn bytes(self, name: &'static str, delta: Delta, args: &[i32]) -> Self {
        let mut d = OpDescriptor::new(name, delta, &[]);
        d.byte_manipulator = true;
        self.push(d, args)
    }

    fn plain(self, name: &'static str, delta: Delta, args: &[i32]) -> Self {
        self.push(OpDescriptor::new(name, delta, &[]), args)
    }

    fn verifier(self, name: &'static str, delta: Delta, args: &[i32]) -> Self {
        let mut d = OpDescriptor::new(name, delta, &[]);
        d.verifier = true;
        self.push(d, args)
    }

    /// Derives `NAMEVERIFY` from `NAME` (dropping a trailing `*VERIFY`
    /// suffix to one stack slot narrower), linking both ways via `verify_of`.
    fn with_verify(mut self, name: &'static str) -> Self {
        let base = self
            .by_name
            .get(name)
            .expect("with_verify requires the base opcode already registered")
            .clone();
        let verify_name: &'static str = match name {
            "OP_EQUAL" => "OP_EQUALVERIFY",
            "OP_NUMEQUAL" => "OP_NUMEQUALVERIFY",
            "OP_CHECKSIG" => "OP_CHECKSIGVERIFY",
            "OP_CHECKMULTISIG" => "OP_CHECKMULTISIGVERIFY",
            other => panic!("no known *VERIFY form for {other}"),
        };
        let mut verify_d = base.clone();
        verify_d.name = verify_name;
        verify_d.delta = base.delta.map(|d| d - 1);
        verify_d.verifier = true;
        verify_d.verify_of = None;
        self.by_name.insert(verify_name, verify_d);
        if let Some(b) = self.by_name.get_mut(name) {
            b.verify_of = Some(verify_name);
        }
        // The VERIFY variant's own `verify_of` points back at its base so the
        // peephole rule table can go either direction.
        if let Some(v) = self.by_name.get_mut(verify_name) {
            v.verify_of = Some(name);
        }
        self
    }

    fn small_int(mut self, n: i32) -> Self {
        let name: &'static str = SMALL_INT_NAMES[n as usize];
        let mut d = OpDescriptor::new(name, Some(1), &[]);
        d.value = Some(n);
        self.by_name.insert(name, d);
        self
    }

    fn build(self) -> OpcodeTable {
        OpcodeTable {
            by_name: self.by_name,
        }
    }
}

const SMALL_INT_NAMES: [&str; 17] = [
    "OP_0", "OP_1", "OP_2", "OP_3", "OP_4", "OP_5", "OP_6", "OP_7", "OP_8", "OP_9", "OP_10",
    "OP_11", "OP_12", "OP_13", "OP_14", "OP_15", "OP_16",
];

/// A pluggable opcode table builder. Extension happens once, at process
/// start, per spec §4.1 ("extensible at process start and then frozen").
pub trait OpcodeSet {
    fn build() -> OpcodeTable;
}

/// The opcode set that ships with this compiler: the Bitcoin Script opcodes
/// referenced throughout spec §4.3-§4.9 and the end-to-end scenarios of §8.
pub struct DefaultOpcodeSet;

impl OpcodeSet for DefaultOpcodeSet {
    fn build() -> OpcodeTable {
        let mut b = OpcodeTable::builder();
        for n in 0..=16 {
            b = b.small_int(n);
        }
        b = b
            .plain("OP_1NEGATE", Some(1), &[])
            // stack manipulation
            .plain("OP_DUP", Some(1), &[1])
            .plain("OP_DROP", Some(-1), &[1])
            .plain("OP_NIP", Some(-1), &[1, 2])
            .plain("OP_SWAP", Some(0), &[1, 2])
            .plain("OP_OVER", Some(1), &[2])
            .plain("OP_TUCK", Some(1), &[1, 2])
            .plain("OP_ROT", Some(0), &[1, 2, 3])
            .plain("OP_PICK", Some(0), &[])
            .plain("OP_ROLL", Some(-1), &[])
            .plain("OP_2DROP", Some(-2), &[1, 2])
            .plain("OP_2DUP", Some(2), &[1, 2])
            .plain("OP_3DUP", Some(3), &[1, 2, 3])
            .plain("OP_2OVER", Some(2), &[3, 4])
            .plain("OP_2ROT", Some(0), &[1, 2, 3, 4, 5, 6])
            .plain("OP_2SWAP", Some(0), &[1, 2, 3, 4])
            .plain("OP_IFDUP", None, &[1])
            .plain("OP_DEPTH", Some(1), &[])
            .plain("OP_TOALTSTACK", Some(-1), &[1])
            .plain("OP_FROMALTSTACK", Some(1), &[])
            // control flow
            .plain("OP_IF", Some(-1), &[1])
            .plain("OP_NOTIF", Some(-1), &[1])
            .plain("OP_ELSE", Some(0), &[])
            .plain("OP_ENDIF", Some(0), &[])
            .verifier("OP_VERIFY", Some(-1), &[1])
            .plain("OP_RETURN", Some(0), &[])
            .plain("OP_NOP", Some(0), &[])
            // comparison / equality
            .plain("OP_EQUAL", Some(-1), &[1, 2])
            // arithmetic
            .arith("OP_1ADD", Some(0), &[1])
            .arith("OP_1SUB", Some(0), &[1])
            .arith("OP_2MUL", Some(0), &[1])
            .arith("OP_2DIV", Some(0), &[1])
            .arith("OP_NEGATE", Some(0), &[1])
            .arith("OP_ABS", Some(0), &[1])
            .arith("OP_NOT", Some(0), &[1])
            .arith("OP_0NOTEQUAL", Some(0), &[1])
            .arith("OP_ADD", Some(-1), &[1, 2])
            .arith("OP_SUB", Some(-1), &[1, 2])
            .arith("OP_MUL", Some(-1), &[1, 2])
            .arith("OP_DIV", Some(-1), &[1, 2])
            .arith("OP_MOD", Some(-1), &[1, 2])
            .arith("OP_LSHIFT", Some(-1), &[1, 2])
            .arith("OP_RSHIFT", Some(-1), &[1, 2])
            .arith("OP_BOOLAND", Some(-1), &[1, 2])
            .arith("OP_BOOLOR", Some(-1), &[1, 2])
            .arith("OP_NUMEQUAL", Some(-1), &[1, 2])
            .arith("OP_NUMNOTEQUAL", Some(-1), &[1, 2])
            .arith("OP_LESSTHAN", Some(-1), &[1, 2])
            .arith("OP_GREATERTHAN", Some(-1), &[1, 2])
            .arith("OP_LESSTHANOREQUAL", Some(-1), &[1, 2])
            .arith("OP_GREATERTHANOREQUAL", Some(-1), &[1, 2])
            .arith("OP_MIN", Some(-1), &[1, 2])
            .arith("OP_MAX", Some(-1), &[1, 2])
            .arith("OP_WITHIN", Some(-2), &[1, 2, 3])
            // bitwise
            .bytes("OP_AND", Some(-1), &[1, 2])
            .bytes("OP_OR", Some(-1), &[1, 2])
            .bytes("OP_XOR", Some(-1), &[1, 2])
            .bytes("OP_INVERT", Some(0), &[1])
            // byte strings
            .bytes("OP_CAT", Some(-1), &[1, 2])
            .bytes("OP_SIZE", Some(1), &[1])
            // crypto
            .bytes("OP_RIPEMD160", Some(0), &[1])
            .bytes("OP_SHA1", Some(0), &[1])
            .bytes("OP_SHA256", Some(0), &[1])
            .bytes("OP_HASH160", Some(0), &[1])
            .bytes("OP_HASH256", Some(0), &[1])
            .plain("OP_CODESEPARATOR", Some(0), &[])
            .plain("OP_CHECKSIG", Some(-1), &[1, 2])
            .plain("OP_CHECKMULTISIG", None, &[])
            .plain("OP_CHECKLOCKTIMEVERIFY", Some(0), &[1])
            .plain("OP_CHECKSEQUENCEVERIFY", Some(0), &[1])
            .with_verify("OP_EQUAL")
            .with_verify("OP_NUMEQUAL")
            .with_verify("OP_CHECKSIG")
            .with_verify("OP_CHECKMULTISIG");
        b.build()
    }
}

static TABLE: OnceLock<OpcodeTable> = OnceLock::new();

/// Installs a custom [`OpcodeSet`] as the process-wide table. Must be called
/// before the first [`table`] lookup; any call after the table has been
/// initialized (by a prior `set_opcode_set` or an implicit `table()` lookup)
/// is a no-op, matching spec §4.1's "after the first lookup the set is
/// effectively immutable."
pub fn set_opcode_set<S: OpcodeSet>() {
    let _ = TABLE.set(S::build());
}

/// Returns the process-wide opcode table, building the default set on first
/// use if [`set_opcode_set`] was never called.
pub fn table() -> &'static OpcodeTable {
    TABLE.get_or_init(DefaultOpcodeSet::build)
}
