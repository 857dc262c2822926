//! Disassembler: program blob → canonical assembly text.
//!
//! One instruction per line, preceded by a `.jump_table` line when the
//! program has one. Immediates print as signed decimal, `load_imm_64`
//! values as hex, and branch targets as absolute code offsets.

use std::fmt::Write;

use pvm_common::{Args, Instruction, ProgramCode};

/// Disassemble a program into canonical assembly text.
///
/// For programs produced by [`crate::assemble`], reassembling the output
/// yields an identical blob.
pub fn disassemble(program: &ProgramCode) -> String {
    let mut out = String::new();

    if program.jump_table_len() > 0 {
        let entries: Vec<String> = (0..program.jump_table_len())
            .filter_map(|i| program.jump_table_entry(i))
            .map(|target| target.to_string())
            .collect();
        out.push_str(".jump_table ");
        out.push_str(&entries.join(", "));
        out.push('\n');
    }

    for (pc, decoded) in program.instructions() {
        match decoded {
            Ok(instruction) => out.push_str(&format_instruction(pc, &instruction)),
            Err(err) => {
                let _ = write!(out, "; {pc}: {err}");
            }
        }
        out.push('\n');
    }

    out
}

/// Render one instruction located at `pc`.
pub(crate) fn format_instruction(pc: u32, instruction: &Instruction) -> String {
    let mnemonic = instruction.opcode.mnemonic();
    let imm = |value: u32| value as i32;
    let target = |offset: u32| pc.wrapping_add(offset);

    match instruction.args {
        Args::None => mnemonic.to_string(),
        Args::Imm { imm: value } => format!("{mnemonic} {}", imm(value)),
        Args::RegExtImm { reg, imm } => format!("{mnemonic} {reg}, {imm:#x}"),
        Args::TwoImm { imm_x, imm_y } => {
            format!("{mnemonic} {}, {}", imm(imm_x), imm(imm_y))
        }
        Args::Offset { offset } => format!("{mnemonic} {}", target(offset)),
        Args::RegImm { reg, imm: value } => format!("{mnemonic} {reg}, {}", imm(value)),
        Args::RegTwoImm { reg, imm_x, imm_y } => {
            format!("{mnemonic} {reg}, {}, {}", imm(imm_x), imm(imm_y))
        }
        Args::RegImmOffset {
            reg,
            imm: value,
            offset,
        } => format!("{mnemonic} {reg}, {}, {}", imm(value), target(offset)),
        Args::TwoReg { dst, src } => format!("{mnemonic} {dst}, {src}"),
        Args::TwoRegImm { ra, rb, imm: value } => {
            format!("{mnemonic} {ra}, {rb}, {}", imm(value))
        }
        Args::TwoRegOffset { ra, rb, offset } => {
            format!("{mnemonic} {ra}, {rb}, {}", target(offset))
        }
        Args::TwoRegTwoImm {
            ra,
            rb,
            imm_x,
            imm_y,
        } => format!("{mnemonic} {ra}, {rb}, {}, {}", imm(imm_x), imm(imm_y)),
        Args::ThreeReg { ra, rb, rd } => format!("{mnemonic} {rd}, {ra}, {rb}"),
    }
}
