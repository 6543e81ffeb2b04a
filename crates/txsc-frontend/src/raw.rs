//! Raw byte-script decoder (spec §6, SPEC_FULL.md §10): standard Bitcoin
//! push-data decoding, delivering an LIR list directly.
//!
//! Grounded on `examples/original_source/txsc/btcscript.py`, which walks a
//! `python-bitcoinlib` `CScript` iterator; this module reimplements that
//! iteration directly against the raw bytes rather than depending on a
//! Bitcoin library, since no example in the pack pulls one in.
//!
//! The numeric opcode table below is this decoder's own private concern --
//! spec §6 explicitly keeps opcode *numeric* values out of the core, and
//! `txsc-codegen::emit::hex` maintains the mirror-image encode table for the
//! same reason a decoder and an encoder in different crates can't share one
//! without a dependency cycle (frontend has no dependency on codegen).

use txsc_core::{opcode, CompileError, LirNode};

/// Decodes a raw byte-script, optionally `0x`-prefixed, into an LIR list.
pub fn decode(source: &str) -> Result<Vec<LirNode>, CompileError> {
    let stripped = source
        .strip_prefix("0x")
        .or_else(|| source.strip_prefix("0X"))
        .unwrap_or(source);
    let bytes = decode_hex(stripped)?;
    decode_bytes(&bytes)
}

/// Decodes already-parsed bytes into an LIR list.
pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<LirNode>, CompileError> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x00 => {
                out.push(LirNode::SmallIntOpCode { value: 0, name: "OP_0".to_string() });
                i += 1;
            }
            0x01..=0x4b => {
                let len = b as usize;
                let data = take(bytes, i + 1, len)?;
                out.push(LirNode::Push { data: data.to_vec() });
                i += 1 + len;
            }
            0x4c => {
                let len = *take(bytes, i + 1, 1)?.first().expect("len 1") as usize;
                let data = take(bytes, i + 2, len)?;
                out.push(LirNode::Push { data: data.to_vec() });
                i += 2 + len;
            }
            0x4d => {
                let lb = take(bytes, i + 1, 2)?;
                let len = u16::from_le_bytes([lb[0], lb[1]]) as usize;
                let data = take(bytes, i + 3, len)?;
                out.push(LirNode::Push { data: data.to_vec() });
                i += 3 + len;
            }
            0x4e => {
                let lb = take(bytes, i + 1, 4)?;
                let len = u32::from_le_bytes([lb[0], lb[1], lb[2], lb[3]]) as usize;
                let data = take(bytes, i + 5, len)?;
                out.push(LirNode::Push { data: data.to_vec() });
                i += 5 + len;
            }
            0x51..=0x60 => {
                let value = (b - 0x50) as i32;
                let desc = opcode::table().small_int_for(value as i64).ok_or_else(|| {
                    CompileError::Parsing { line: 0, message: format!("no small-int descriptor for {value}") }
                })?;
                out.push(LirNode::SmallIntOpCode { value, name: desc.name.to_string() });
                i += 1;
            }
            0x63 => {
                out.push(LirNode::If);
                i += 1;
            }
            0x64 => {
                out.push(LirNode::NotIf);
                i += 1;
            }
            0x67 => {
                out.push(LirNode::Else);
                i += 1;
            }
            0x68 => {
                out.push(LirNode::EndIf);
                i += 1;
            }
            _ => {
                let name = opcode_name_for_byte(b).ok_or_else(|| CompileError::Parsing {
                    line: 0,
                    message: format!("unrecognized opcode byte 0x{b:02x} at offset {i}"),
                })?;
                let desc = opcode::table().by_name(name).ok_or_else(|| CompileError::Parsing {
                    line: 0,
                    message: format!("opcode '{name}' is not registered in the active opcode set"),
                })?;
                out.push(LirNode::OpCode {
                    name: desc.name.to_string(),
                    args: desc.args.clone(),
                    delta: desc.delta,
                    verifier: desc.verifier,
                });
                i += 1;
            }
        }
    }
    Ok(out)
}

fn take(bytes: &[u8], start: usize, len: usize) -> Result<&[u8], CompileError> {
    bytes.get(start..start + len).ok_or_else(|| CompileError::Parsing {
        line: 0,
        message: "truncated push-data, expected more bytes than the script contains".to_string(),
    })
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, CompileError> {
    if hex.len() % 2 != 0 {
        return Err(CompileError::Parsing {
            line: 0,
            message: "byte-script hex has an odd number of digits".to_string(),
        });
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CompileError::Parsing { line: 0, message: "invalid byte-script hex".to_string() })
        })
        .collect()
}

/// Standard Bitcoin Script opcode numbering for every non-push, non-small-int,
/// non-conditional-marker opcode the default opcode table knows about.
fn opcode_name_for_byte(b: u8) -> Option<&'static str> {
    Some(match b {
        0x61 => "OP_NOP",
        0x69 => "OP_VERIFY",
        0x6a => "OP_RETURN",
        0x6b => "OP_TOALTSTACK",
        0x6c => "OP_FROMALTSTACK",
        0x6d => "OP_2DROP",
        0x6e => "OP_2DUP",
        0x6f => "OP_3DUP",
        0x70 => "OP_2OVER",
        0x71 => "OP_2ROT",
        0x72 => "OP_2SWAP",
        0x73 => "OP_IFDUP",
        0x74 => "OP_DEPTH",
        0x75 => "OP_DROP",
        0x76 => "OP_DUP",
        0x77 => "OP_NIP",
        0x78 => "OP_OVER",
        0x79 => "OP_PICK",
        0x7a => "OP_ROLL",
        0x7b => "OP_ROT",
        0x7c => "OP_SWAP",
        0x7d => "OP_TUCK",
        0x7e => "OP_CAT",
        0x82 => "OP_SIZE",
        0x83 => "OP_INVERT",
        0x84 => "OP_AND",
        0x85 => "OP_OR",
        0x86 => "OP_XOR",
        0x87 => "OP_EQUAL",
        0x88 => "OP_EQUALVERIFY",
        0x8b => "OP_1ADD",
        0x8c => "OP_1SUB",
        0x8d => "OP_2MUL",
        0x8e => "OP_2DIV",
        0x8f => "OP_NEGATE",
        0x90 => "OP_ABS",
        0x91 => "OP_NOT",
        0x92 => "OP_0NOTEQUAL",
        0x93 => "OP_ADD",
        0x94 => "OP_SUB",
        0x95 => "OP_MUL",
        0x96 => "OP_DIV",
        0x97 => "OP_MOD",
        0x98 => "OP_LSHIFT",
        0x99 => "OP_RSHIFT",
        0x9a => "OP_BOOLAND",
        0x9b => "OP_BOOLOR",
        0x9c => "OP_NUMEQUAL",
        0x9d => "OP_NUMEQUALVERIFY",
        0x9e => "OP_NUMNOTEQUAL",
        0x9f => "OP_LESSTHAN",
        0xa0 => "OP_GREATERTHAN",
        0xa1 => "OP_LESSTHANOREQUAL",
        0xa2 => "OP_GREATERTHANOREQUAL",
        0xa3 => "OP_MIN",
        0xa4 => "OP_MAX",
        0xa5 => "OP_WITHIN",
        0xa6 => "OP_RIPEMD160",
        0xa7 => "OP_SHA1",
        0xa8 => "OP_SHA256",
        0xa9 => "OP_HASH160",
        0xaa => "OP_HASH256",
        0xab => "OP_CODESEPARATOR",
        0xac => "OP_CHECKSIG",
        0xad => "OP_CHECKSIGVERIFY",
        0xae => "OP_CHECKMULTISIG",
        0xaf => "OP_CHECKMULTISIGVERIFY",
        0xb1 => "OP_CHECKLOCKTIMEVERIFY",
        0xb2 => "OP_CHECKSEQUENCEVERIFY",
        0x4f => "OP_1NEGATE",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_scenario_six() {
        // `525593` -> SmallInt(2), SmallInt(5), OP_ADD (spec §8 scenario 6).
        let ops = decode("525593").unwrap();
        assert_eq!(
            ops,
            vec![
                LirNode::SmallIntOpCode { value: 2, name: "OP_2".into() },
                LirNode::SmallIntOpCode { value: 5, name: "OP_5".into() },
                LirNode::OpCode {
                    name: "OP_ADD".into(),
                    args: opcode::table().by_name("OP_ADD").unwrap().args.clone(),
                    delta: Some(-1),
                    verifier: false,
                },
            ]
        );
    }

    #[test]
    fn decodes_literal_length_push() {
        let ops = decode(&format!("14{}", "11".repeat(20))).unwrap();
        assert_eq!(ops, vec![LirNode::Push { data: vec![0x11; 20] }]);
    }

    #[test]
    fn decodes_pushdata1() {
        let mut hex = String::from("4c02");
        hex.push_str("aabb");
        let ops = decode(&hex).unwrap();
        assert_eq!(ops, vec![LirNode::Push { data: vec![0xaa, 0xbb] }]);
    }

    #[test]
    fn decodes_small_int_opcodes() {
        let ops = decode("0051").unwrap();
        assert_eq!(
            ops,
            vec![
                LirNode::SmallIntOpCode { value: 0, name: "OP_0".into() },
                LirNode::SmallIntOpCode { value: 1, name: "OP_1".into() },
            ]
        );
    }

    #[test]
    fn decodes_conditional_markers() {
        let ops = decode("6363676768").unwrap();
        assert_eq!(ops, vec![LirNode::If, LirNode::If, LirNode::Else, LirNode::Else, LirNode::EndIf]);
    }

    #[test]
    fn accepts_0x_prefix() {
        assert_eq!(decode("0x51").unwrap(), decode("51").unwrap());
    }

    #[test]
    fn truncated_push_is_an_error() {
        assert!(decode("14aa").is_err());
    }

    #[test]
    fn unknown_opcode_byte_is_an_error() {
        assert!(decode("ba").is_err());
    }
}
