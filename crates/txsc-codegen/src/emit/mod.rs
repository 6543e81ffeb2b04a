//! Target emitters (spec §6): turn a fully contextualized LIR program into
//! output text. Opcode numeric values live here, not in `txsc-core` --
//! spec §6: "Opcode numeric values are not part of the core."

pub mod asm;
pub mod hex;
