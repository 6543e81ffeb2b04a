//! ASM parser (spec §6, SPEC_FULL.md §10): whitespace-separated tokens,
//! delivering an LIR list directly (ASM has no structural nesting of its
//! own -- `IF`/`ELSE`/`ENDIF` are just tokens that become the matching
//! conditional markers).
//!
//! Grounded on `examples/original_source/txsc/asm/asm_language.py`: opcode
//! names are accepted with or without the `OP_` prefix, a bare decimal
//! integer in `[0, 16]` is a small-int push, and a `0x`-prefixed token is a
//! literal data push.

use txsc_core::{opcode, CompileError, LirNode};

/// Parses a complete ASM source string into an LIR list.
pub fn parse(source: &str) -> Result<Vec<LirNode>, CompileError> {
    let mut out = Vec::new();
    for (i, line) in source.lines().enumerate() {
        let lineno = (i + 1) as u32;
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        for tok in line.split_whitespace() {
            out.push(parse_token(tok, lineno)?);
        }
    }
    Ok(out)
}

fn parse_token(tok: &str, lineno: u32) -> Result<LirNode, CompileError> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        let bytes = decode_hex(hex, lineno)?;
        return Ok(LirNode::Push { data: bytes });
    }
    if let Ok(n) = tok.parse::<i64>() {
        if let Some(desc) = opcode::table().small_int_for(n) {
            return Ok(LirNode::SmallIntOpCode {
                value: desc.value.expect("small_int_for only returns value-bearing descriptors"),
                name: desc.name.to_string(),
            });
        }
        return Err(CompileError::Parsing {
            line: lineno,
            message: format!("integer literal '{tok}' is out of the small-int range [0, 16]"),
        });
    }

    let name = if tok.starts_with("OP_") {
        tok.to_string()
    } else {
        format!("OP_{}", tok.to_uppercase())
    };
    match name.as_str() {
        "OP_IF" => Ok(LirNode::If),
        "OP_NOTIF" => Ok(LirNode::NotIf),
        "OP_ELSE" => Ok(LirNode::Else),
        "OP_ENDIF" => Ok(LirNode::EndIf),
        _ => {
            let desc = opcode::table().by_name(&name).ok_or_else(|| CompileError::Parsing {
                line: lineno,
                message: format!("unknown opcode '{tok}'"),
            })?;
            Ok(LirNode::OpCode {
                name: desc.name.to_string(),
                args: desc.args.clone(),
                delta: desc.delta,
                verifier: desc.verifier,
            })
        }
    }
}

fn decode_hex(hex: &str, lineno: u32) -> Result<Vec<u8>, CompileError> {
    if hex.len() % 2 != 0 {
        return Err(CompileError::Parsing {
            line: lineno,
            message: format!("hex literal '0x{hex}' has an odd number of digits"),
        });
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| CompileError::Parsing {
                line: lineno,
                message: format!("invalid hex literal '0x{hex}'"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_opcodes_without_op_prefix() {
        let ops = parse("DUP HASH160").unwrap();
        assert!(matches!(&ops[0], LirNode::OpCode { name, .. } if name == "OP_DUP"));
        assert!(matches!(&ops[1], LirNode::OpCode { name, .. } if name == "OP_HASH160"));
    }

    #[test]
    fn parses_small_int_and_push() {
        let ops = parse("2 5 ADD").unwrap();
        assert_eq!(ops[0], LirNode::SmallIntOpCode { value: 2, name: "OP_2".into() });
        assert_eq!(ops[1], LirNode::SmallIntOpCode { value: 5, name: "OP_5".into() });
        assert!(matches!(&ops[2], LirNode::OpCode { name, .. } if name == "OP_ADD"));
    }

    #[test]
    fn parses_two_token_push() {
        let ops = parse("0x14 0x1111111111111111111111111111111111111111").unwrap();
        assert_eq!(ops[0], LirNode::Push { data: vec![0x14] });
        assert_eq!(ops[1].clone(), LirNode::Push { data: vec![0x11; 20] });
    }

    #[test]
    fn parses_conditional_markers() {
        let ops = parse("IF 1 ELSE 0 ENDIF").unwrap();
        assert_eq!(ops[0], LirNode::If);
        assert_eq!(ops[2], LirNode::Else);
        assert_eq!(ops[4], LirNode::EndIf);
    }

    #[test]
    fn unknown_token_is_parsing_error() {
        assert!(parse("NOT_A_REAL_OP").is_err());
    }

    #[test]
    fn end_to_end_scenario_one() {
        let ops = parse("2 3 ADD 4 5 ADD").unwrap();
        assert_eq!(ops.len(), 6);
    }
}
