//! End-to-end integration tests for the `txsc` compiler pipeline.
//!
//! Each test feeds source text through [`txsc_codegen::compile`] and checks
//! the rendered hex or ASM against a literal expected value, exercising the
//! full parse -> SIR-optimize -> lower -> inline-to-fixed-point -> emit
//! pipeline the way a caller embedding this crate would.
//!
//! Tests cover the six end-to-end scenarios spec.md §8 specifies literally,
//! plus dialect round-trips and in-source directive handling.

use txsc_codegen::{compile, Dialect, Target};
use txsc_core::CompileOptions;

/// `Peephole` (not `Full`) so these scenarios demonstrate lowering without
/// the SIR folder collapsing e.g. `2 + 3` to a literal `5`.
fn unfolded_options() -> CompileOptions {
    CompileOptions {
        optimization: txsc_core::OptLevel::Peephole,
        implicit_pushes: true,
        ..CompileOptions::default()
    }
}

#[test]
fn end_to_end_scenario_one_txscript_to_asm() {
    let mut options = unfolded_options();
    let out = compile("2 + 3; 4 + 5;", Dialect::TxScript, Target::Asm, &mut options).unwrap();
    assert_eq!(out.text, "2 3 ADD 4 5 ADD");
}

#[test]
fn end_to_end_scenario_two_assumed_input() {
    let mut options = unfolded_options();
    let out = compile("assume a; a + 5;", Dialect::TxScript, Target::Asm, &mut options).unwrap();
    assert_eq!(out.text, "5 ADD");
}

#[test]
fn end_to_end_scenario_three_p2pkh_template() {
    let mut options = unfolded_options();
    let src = "assume sig, pubkey;\nverify hash160(pubkey) == 0x1111111111111111111111111111111111111111;\ncheckSig(sig, pubkey);";
    let out = compile(src, Dialect::TxScript, Target::Asm, &mut options).unwrap();
    assert_eq!(
        out.text,
        format!("DUP HASH160 0x14 0x{} EQUALVERIFY CHECKSIG", "11".repeat(20))
    );
}

#[test]
fn end_to_end_scenario_four_peephole_fuses_equal_verify() {
    let mut options = CompileOptions::default();
    let out = compile("5 5 EQUAL VERIFY", Dialect::Asm, Target::Hex, &mut options).unwrap();
    // 5 5 EQUALVERIFY, small-ints 0x55 0x55, EQUALVERIFY 0x88.
    assert_eq!(out.text, "555588");
}

#[test]
fn end_to_end_scenario_six_raw_byte_script_to_asm() {
    let mut options = CompileOptions::default();
    let out = compile("525593", Dialect::Raw, Target::Asm, &mut options).unwrap();
    assert_eq!(out.text, "2 5 ADD");
}

#[test]
fn asm_dialect_round_trips_through_hex() {
    let mut options = CompileOptions::default();
    let out = compile("DUP HASH160", Dialect::Asm, Target::Hex, &mut options).unwrap();
    assert_eq!(out.text, "76a9");
}

#[test]
fn directive_in_source_disables_peephole() {
    let mut options = CompileOptions::default();
    let src = "#txsc: optimization = 0\nverify 5 == 5;";
    let out = compile(src, Dialect::TxScript, Target::Hex, &mut options).unwrap();
    // Peephole disabled: EQUAL then VERIFY stay separate opcodes.
    assert_eq!(out.text, "55558769");
}

#[test]
fn raw_byte_script_round_trips_back_to_the_same_hex() {
    let mut options = CompileOptions::default();
    let first = compile("525593", Dialect::Raw, Target::Hex, &mut options).unwrap();
    let mut options2 = CompileOptions::default();
    let second = compile(&first.text, Dialect::Raw, Target::Hex, &mut options2).unwrap();
    assert_eq!(first.text, second.text);
}
