//! Constant-folding evaluation semantics (spec §4.3).
//!
//! Pure functions over literal [`SirNode::Int`]/[`SirNode::Bytes`] values.
//! The SIR optimizer calls these once it has established every operand of a
//! unary/binary/ternary node is itself a literal; a `None` return means the
//! opcode has no constant-folding semantics (it always survives to LIR).

use txsc_core::SirNode;

/// A folded literal: either an integer or a byte string, ready to be
/// re-wrapped as a [`SirNode`] by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Folded {
    Int(i64),
    Bytes(Vec<u8>),
}

impl Folded {
    pub fn into_sir(self) -> SirNode {
        match self {
            Folded::Int(n) => SirNode::Int(n),
            Folded::Bytes(b) => SirNode::Bytes(b),
        }
    }
}

fn as_int(n: &SirNode) -> Option<i64> {
    match n {
        SirNode::Int(v) => Some(*v),
        SirNode::Bytes(b) => Some(bytes_to_int(b)),
        _ => None,
    }
}

fn as_bytes(n: &SirNode) -> Option<Vec<u8>> {
    match n {
        SirNode::Bytes(b) => Some(b.clone()),
        SirNode::Int(v) => Some(int_to_bytes(*v)),
        _ => None,
    }
}

/// Bitcoin Script's minimally-encoded little-endian signed integer decoding.
pub fn bytes_to_int(b: &[u8]) -> i64 {
    if b.is_empty() {
        return 0;
    }
    let mut result: i64 = 0;
    for (i, byte) in b.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    let last = b[b.len() - 1];
    if last & 0x80 != 0 {
        result &= !(0x80i64 << (8 * (b.len() - 1)));
        result = -result;
    }
    result
}

/// Bitcoin Script's minimally-encoded little-endian signed integer encoding.
pub fn int_to_bytes(mut v: i64) -> Vec<u8> {
    if v == 0 {
        return Vec::new();
    }
    let negative = v < 0;
    if negative {
        v = -v;
    }
    let mut out = Vec::new();
    while v > 0 {
        out.push((v & 0xff) as u8);
        v >>= 8;
    }
    if out.last().map_or(false, |b| b & 0x80 != 0) {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = out.last_mut().unwrap();
        *last |= 0x80;
    }
    out
}

/// Folds a unary op by name. `None` if `name` has no folding semantics.
pub fn fold_unary(name: &str, operand: &SirNode) -> Option<Folded> {
    match name {
        "OP_NEGATE" => as_int(operand).map(|v| Folded::Int(-v)),
        "OP_ABS" => as_int(operand).map(|v| Folded::Int(v.abs())),
        "OP_NOT" => as_int(operand).map(|v| Folded::Int((v == 0) as i64)),
        "OP_0NOTEQUAL" => as_int(operand).map(|v| Folded::Int((v != 0) as i64)),
        "OP_1ADD" => as_int(operand).map(|v| Folded::Int(v + 1)),
        "OP_1SUB" => as_int(operand).map(|v| Folded::Int(v - 1)),
        "OP_2MUL" => as_int(operand).map(|v| Folded::Int(v * 2)),
        "OP_2DIV" => as_int(operand).map(|v| Folded::Int(v.div_euclid(2))),
        "OP_INVERT" => as_bytes(operand).map(|b| Folded::Bytes(b.iter().map(|x| !x).collect())),
        "OP_SIZE" => as_bytes(operand).map(|b| Folded::Int(b.len() as i64)),
        _ => None,
    }
}

/// Folds a binary op by name.
pub fn fold_binary(name: &str, left: &SirNode, right: &SirNode) -> Option<Folded> {
    match name {
        "OP_ADD" => Some(Folded::Int(as_int(left)? + as_int(right)?)),
        "OP_SUB" => Some(Folded::Int(as_int(left)? - as_int(right)?)),
        "OP_MUL" => Some(Folded::Int(as_int(left)? * as_int(right)?)),
        "OP_DIV" => {
            let r = as_int(right)?;
            if r == 0 {
                None
            } else {
                Some(Folded::Int(as_int(left)? / r))
            }
        }
        "OP_MOD" => {
            let r = as_int(right)?;
            if r == 0 {
                None
            } else {
                Some(Folded::Int(as_int(left)? % r))
            }
        }
        "OP_LSHIFT" => Some(Folded::Int(as_int(left)? << as_int(right)?)),
        "OP_RSHIFT" => Some(Folded::Int(as_int(left)? >> as_int(right)?)),
        "OP_AND" => {
            let (l, r) = (as_bytes(left)?, as_bytes(right)?);
            Some(Folded::Bytes(zip_bytes(&l, &r, |a, b| a & b)))
        }
        "OP_OR" => {
            let (l, r) = (as_bytes(left)?, as_bytes(right)?);
            Some(Folded::Bytes(zip_bytes(&l, &r, |a, b| a | b)))
        }
        "OP_XOR" => {
            let (l, r) = (as_bytes(left)?, as_bytes(right)?);
            Some(Folded::Bytes(zip_bytes(&l, &r, |a, b| a ^ b)))
        }
        "OP_LESSTHAN" => Some(Folded::Int((as_int(left)? < as_int(right)?) as i64)),
        "OP_GREATERTHAN" => Some(Folded::Int((as_int(left)? > as_int(right)?) as i64)),
        "OP_LESSTHANOREQUAL" => Some(Folded::Int((as_int(left)? <= as_int(right)?) as i64)),
        "OP_GREATERTHANOREQUAL" => Some(Folded::Int((as_int(left)? >= as_int(right)?) as i64)),
        "OP_NUMEQUAL" => Some(Folded::Int((as_int(left)? == as_int(right)?) as i64)),
        "OP_NUMNOTEQUAL" => Some(Folded::Int((as_int(left)? != as_int(right)?) as i64)),
        "OP_BOOLAND" => Some(Folded::Int((as_int(left)? != 0 && as_int(right)? != 0) as i64)),
        "OP_BOOLOR" => Some(Folded::Int((as_int(left)? != 0 || as_int(right)? != 0) as i64)),
        "OP_MIN" => Some(Folded::Int(as_int(left)?.min(as_int(right)?))),
        "OP_MAX" => Some(Folded::Int(as_int(left)?.max(as_int(right)?))),
        "OP_CAT" => {
            let (mut l, r) = (as_bytes(left)?, as_bytes(right)?);
            l.extend_from_slice(&r);
            Some(Folded::Bytes(l))
        }
        "OP_EQUAL" | "OP_EQUALVERIFY" => {
            let eq = match (left, right) {
                (SirNode::Bytes(_), _) | (_, SirNode::Bytes(_)) => as_bytes(left)? == as_bytes(right)?,
                _ => as_int(left)? == as_int(right)?,
            };
            Some(Folded::Int(eq as i64))
        }
        _ => None,
    }
}

/// Folds the ternary `OP_WITHIN(v, lo, hi) = lo <= v < hi` (spec §4.3).
pub fn fold_within(v: &SirNode, lo: &SirNode, hi: &SirNode) -> Option<Folded> {
    let (v, lo, hi) = (as_int(v)?, as_int(lo)?, as_int(hi)?);
    Some(Folded::Int((lo <= v && v < hi) as i64))
}

fn zip_bytes(a: &[u8], b: &[u8], f: impl Fn(u8, u8) -> u8) -> Vec<u8> {
    a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
}
