//! Hex byte-script emitter (spec §6's "(a) a hex byte string").
//!
//! Grounded on `examples/original_source/txsc/btcscript.py`'s `CScript`
//! encoding: a `Push` is encoded with the standard Bitcoin push-data
//! prefixing, a `SmallIntOpCode(v)` is the single byte `0x50 + v` (`v=0`
//! maps to `0x00`, not `0x50`), and every other opcode is looked up by name
//! in the numeric table below. This table is the mirror image of
//! `txsc_frontend::raw`'s decode table and is deliberately not shared with
//! it -- see that module's doc comment for why.

use txsc_core::{LirNode, LirProgram};

use crate::error::CodegenError;

/// Encodes a fully contextualized LIR program as a hex string.
pub fn emit(prog: &LirProgram) -> Result<String, CodegenError> {
    let bytes = emit_bytes(prog.instrs.iter().map(|i| &i.node))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

pub(crate) fn emit_bytes<'a>(nodes: impl Iterator<Item = &'a LirNode>) -> Result<Vec<u8>, CodegenError> {
    let mut out = Vec::new();
    for node in nodes {
        emit_node(node, &mut out)?;
    }
    Ok(out)
}

fn emit_node(node: &LirNode, out: &mut Vec<u8>) -> Result<(), CodegenError> {
    match node {
        LirNode::Push { data } => push_data(data, out),
        LirNode::SmallIntOpCode { value, .. } => {
            if *value == 0 {
                out.push(0x00);
            } else {
                out.push(0x50 + *value as u8);
            }
        }
        LirNode::If => out.push(0x63),
        LirNode::NotIf => out.push(0x64),
        LirNode::Else => out.push(0x67),
        LirNode::EndIf => out.push(0x68),
        LirNode::InnerScript { ops } => {
            let inner = emit_bytes(ops.iter())?;
            push_data(&inner, out);
        }
        LirNode::OpCode { name, .. } => {
            let b = byte_for_name(name).ok_or_else(|| {
                CodegenError::Emit(format!("no numeric opcode for '{name}'"))
            })?;
            out.push(b);
        }
        other => {
            return Err(CodegenError::Emit(format!(
                "{other:?} should have been eliminated before emission"
            )))
        }
    }
    Ok(())
}

fn push_data(data: &[u8], out: &mut Vec<u8>) {
    let len = data.len();
    if len <= 0x4b {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(0x4c);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(0x4d);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(0x4e);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Standard Bitcoin Script opcode numbering, encode direction. See
/// `txsc_frontend::raw::opcode_name_for_byte` for the decode-side mirror.
fn byte_for_name(name: &str) -> Option<u8> {
    Some(match name {
        "OP_NOP" => 0x61,
        "OP_VERIFY" => 0x69,
        "OP_RETURN" => 0x6a,
        "OP_TOALTSTACK" => 0x6b,
        "OP_FROMALTSTACK" => 0x6c,
        "OP_2DROP" => 0x6d,
        "OP_2DUP" => 0x6e,
        "OP_3DUP" => 0x6f,
        "OP_2OVER" => 0x70,
        "OP_2ROT" => 0x71,
        "OP_2SWAP" => 0x72,
        "OP_IFDUP" => 0x73,
        "OP_DEPTH" => 0x74,
        "OP_DROP" => 0x75,
        "OP_DUP" => 0x76,
        "OP_NIP" => 0x77,
        "OP_OVER" => 0x78,
        "OP_PICK" => 0x79,
        "OP_ROLL" => 0x7a,
        "OP_ROT" => 0x7b,
        "OP_SWAP" => 0x7c,
        "OP_TUCK" => 0x7d,
        "OP_CAT" => 0x7e,
        "OP_SIZE" => 0x82,
        "OP_INVERT" => 0x83,
        "OP_AND" => 0x84,
        "OP_OR" => 0x85,
        "OP_XOR" => 0x86,
        "OP_EQUAL" => 0x87,
        "OP_EQUALVERIFY" => 0x88,
        "OP_1ADD" => 0x8b,
        "OP_1SUB" => 0x8c,
        "OP_2MUL" => 0x8d,
        "OP_2DIV" => 0x8e,
        "OP_NEGATE" => 0x8f,
        "OP_ABS" => 0x90,
        "OP_NOT" => 0x91,
        "OP_0NOTEQUAL" => 0x92,
        "OP_ADD" => 0x93,
        "OP_SUB" => 0x94,
        "OP_MUL" => 0x95,
        "OP_DIV" => 0x96,
        "OP_MOD" => 0x97,
        "OP_LSHIFT" => 0x98,
        "OP_RSHIFT" => 0x99,
        "OP_BOOLAND" => 0x9a,
        "OP_BOOLOR" => 0x9b,
        "OP_NUMEQUAL" => 0x9c,
        "OP_NUMEQUALVERIFY" => 0x9d,
        "OP_NUMNOTEQUAL" => 0x9e,
        "OP_LESSTHAN" => 0x9f,
        "OP_GREATERTHAN" => 0xa0,
        "OP_LESSTHANOREQUAL" => 0xa1,
        "OP_GREATERTHANOREQUAL" => 0xa2,
        "OP_MIN" => 0xa3,
        "OP_MAX" => 0xa4,
        "OP_WITHIN" => 0xa5,
        "OP_RIPEMD160" => 0xa6,
        "OP_SHA1" => 0xa7,
        "OP_SHA256" => 0xa8,
        "OP_HASH160" => 0xa9,
        "OP_HASH256" => 0xaa,
        "OP_CODESEPARATOR" => 0xab,
        "OP_CHECKSIG" => 0xac,
        "OP_CHECKSIGVERIFY" => 0xad,
        "OP_CHECKMULTISIG" => 0xae,
        "OP_CHECKMULTISIGVERIFY" => 0xaf,
        "OP_CHECKLOCKTIMEVERIFY" => 0xb1,
        "OP_CHECKSEQUENCEVERIFY" => 0xb2,
        "OP_1NEGATE" => 0x4f,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsc_core::Instr;

    fn prog(nodes: Vec<LirNode>) -> LirProgram {
        LirProgram::from_nodes(nodes)
    }

    fn idx(instrs: &[Instr]) -> Vec<&LirNode> {
        instrs.iter().map(|i| &i.node).collect()
    }

    #[test]
    fn end_to_end_scenario_three_p2pkh() {
        let pkh = vec![0x11; 20];
        let p = prog(vec![
            LirNode::OpCode { name: "OP_DUP".into(), args: Default::default(), delta: Some(1), verifier: false },
            LirNode::OpCode { name: "OP_HASH160".into(), args: Default::default(), delta: Some(0), verifier: false },
            LirNode::Push { data: pkh.clone() },
            LirNode::OpCode { name: "OP_EQUALVERIFY".into(), args: Default::default(), delta: Some(-2), verifier: true },
            LirNode::OpCode { name: "OP_CHECKSIG".into(), args: Default::default(), delta: Some(-1), verifier: false },
        ]);
        let hex = emit(&p).unwrap();
        assert_eq!(hex, format!("76a914{}88ac", "11".repeat(20)));
        let _ = idx(&p.instrs);
    }

    #[test]
    fn small_int_zero_is_op_0_byte() {
        let p = prog(vec![LirNode::SmallIntOpCode { value: 0, name: "OP_0".into() }]);
        assert_eq!(emit(&p).unwrap(), "00");
    }

    #[test]
    fn small_int_nonzero_is_0x50_plus_v() {
        let p = prog(vec![LirNode::SmallIntOpCode { value: 5, name: "OP_5".into() }]);
        assert_eq!(emit(&p).unwrap(), "55");
    }

    #[test]
    fn push_data1_used_above_0x4b() {
        let data = vec![0xaa; 0x4c];
        let p = prog(vec![LirNode::Push { data: data.clone() }]);
        let hex = emit(&p).unwrap();
        assert_eq!(&hex[..4], "4c4c");
    }

    #[test]
    fn inner_script_is_recursively_encoded_then_pushed() {
        let p = prog(vec![LirNode::InnerScript {
            ops: vec![LirNode::SmallIntOpCode { value: 1, name: "OP_1".into() }],
        }]);
        assert_eq!(emit(&p).unwrap(), "0151");
    }

    #[test]
    fn unknown_opcode_name_is_an_emit_error() {
        let p = prog(vec![LirNode::OpCode {
            name: "OP_NOT_A_REAL_OP".into(),
            args: Default::default(),
            delta: None,
            verifier: false,
        }]);
        assert!(emit(&p).is_err());
    }
}
