//! PVM assembler: bidirectional text ↔ program blob translation.
//!
//! One line holds at most one instruction, optionally preceded by
//! `label:` definitions. Branch and jump operands take either a label or
//! an absolute code offset; `.jump_table` lists the entries of the
//! dynamic-jump table in order.
//!
//! # Usage
//!
//! ```
//! use pvm_assembler::{assemble, disassemble};
//!
//! let text = "\
//! load_imm r1, 3
//! loop:
//!   add_imm_64 r1, r1, -1
//!   branch_ne_imm r1, 0, loop
//!   trap
//! ";
//! let program = assemble(text).unwrap();
//! assert_eq!(
//!     disassemble(&program),
//!     "load_imm r1, 3\nadd_imm_64 r1, r1, -1\nbranch_ne_imm r1, 0, 3\ntrap\n"
//! );
//! ```
//!
//! # Roundtrip Guarantee
//!
//! `assemble(disassemble(program))` re-encodes to the same blob for every
//! program the assembler produces. The disassembler emits canonical text;
//! the assembler also accepts hex, unsigned immediates and labels.

pub mod error;

mod disassembler;
mod lexer;
mod parser;

pub use error::AsmError;

use std::collections::HashMap;

use lexer::tokenize_line;
use parser::{parse_line, Item, Target};
use pvm_common::{Args, ProgramBuilder, ProgramCode};

/// Assemble text into a program blob.
///
/// Returns the first error encountered.
pub fn assemble(text: &str) -> Result<ProgramCode, AsmError> {
    // Pass 1: parse every line and place labels. Offset operands always
    // encode in four bytes, so placeholder offsets do not move anything.
    let mut labels: HashMap<String, u32> = HashMap::new();
    let mut items = Vec::new();
    let mut offset = 0u32;

    for (idx, line) in text.lines().enumerate() {
        let line_num = idx + 1;
        let tokens = tokenize_line(line, line_num)?;
        let parsed = parse_line(&tokens, line_num)?;

        for label in parsed.labels {
            if labels.contains_key(&label) {
                return Err(AsmError::DuplicateLabel {
                    line: line_num,
                    label,
                });
            }
            labels.insert(label, offset);
        }

        if let Some(item) = parsed.item {
            if let Item::Instruction { instruction, .. } = &item {
                offset = offset.wrapping_add(instruction.encode().len() as u32);
            }
            items.push((line_num, item));
        }
    }

    // Pass 2: resolve targets and lay the program out.
    let resolve = |target: &Target, line: usize| match target {
        Target::Absolute(at) => Ok(*at),
        Target::Label(name) => labels
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::UndefinedLabel {
                line,
                label: name.clone(),
            }),
    };

    let mut builder = ProgramBuilder::new();
    for (line_num, item) in items {
        match item {
            Item::Instruction {
                mut instruction,
                target,
            } => {
                if let Some(target) = target {
                    let at = resolve(&target, line_num)?;
                    instruction.args = with_offset(instruction.args, builder.offset_to(at));
                }
                builder.push(instruction);
            }
            Item::JumpTable(entries) => {
                for entry in &entries {
                    builder.push_jump_target(resolve(entry, line_num)?);
                }
            }
        }
    }

    Ok(builder.build())
}

/// Replace the offset operand of a branch or jump.
fn with_offset(args: Args, offset: u32) -> Args {
    match args {
        Args::Offset { .. } => Args::Offset { offset },
        Args::RegImmOffset { reg, imm, .. } => Args::RegImmOffset { reg, imm, offset },
        Args::TwoRegOffset { ra, rb, .. } => Args::TwoRegOffset { ra, rb, offset },
        other => other,
    }
}

/// Disassemble a program into canonical assembly text.
///
/// The output is flat: a `.jump_table` line if the program has entries,
/// then one instruction per line with no labels or indentation.
pub fn disassemble(program: &ProgramCode) -> String {
    disassembler::disassemble(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use pvm_common::{Instruction, Opcode, Reg};

    #[test]
    fn assemble_minimal() {
        let program = assemble("load_imm r7, 42\ntrap\n").unwrap();
        let instructions: Vec<_> = program
            .instructions()
            .map(|(_, decoded)| decoded.unwrap())
            .collect();
        assert_eq!(
            instructions,
            vec![
                Instruction::new(
                    Opcode::LoadImm,
                    Args::RegImm {
                        reg: Reg::new(7).unwrap(),
                        imm: 42
                    }
                ),
                Instruction::bare(Opcode::Trap),
            ]
        );
    }

    #[test]
    fn disassemble_minimal() {
        let program = assemble("LOAD_IMM R7, 0x2a\nTRAP\n").unwrap();
        assert_eq!(disassemble(&program), "load_imm r7, 42\ntrap\n");
    }

    #[test]
    fn forward_and_backward_labels() {
        let text = "\
start:
  jump end
  fallthrough
end:
  branch_eq r0, r1, start
";
        let program = assemble(text).unwrap();
        // jump is 5 bytes, fallthrough 1, so `end` sits at 6.
        assert_eq!(
            program.instruction_at(0).unwrap().args,
            Args::Offset { offset: 6 }
        );
        assert_eq!(
            program.instruction_at(6).unwrap().args,
            Args::TwoRegOffset {
                ra: Reg::new(0).unwrap(),
                rb: Reg::new(1).unwrap(),
                offset: (-6i32) as u32
            }
        );
        assert!(program.is_basic_block_start(5));
        assert!(program.is_basic_block_start(6));
    }

    #[test]
    fn labels_on_same_line_as_instruction() {
        let a = assemble("top: jump top\n").unwrap();
        let b = assemble("jump 0\n").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn jump_table_resolves_labels() {
        let text = "\
.jump_table first, second
first: fallthrough
second: trap
";
        let program = assemble(text).unwrap();
        assert_eq!(program.jump_table_len(), 2);
        assert_eq!(program.jump_table_entry(0), Some(0));
        assert_eq!(program.jump_table_entry(1), Some(1));
    }

    #[test]
    fn assemble_with_comments_and_blanks() {
        let text = "\
; a comment

load_imm r1, 1 ; trailing comment
   trap
";
        let program = assemble(text).unwrap();
        assert_eq!(program.instructions().count(), 2);
    }

    #[test]
    fn decimal_and_hex_produce_same_result() {
        let hex = assemble("load_imm_64 r2, 0xff\n").unwrap();
        let dec = assemble("load_imm_64 r2, 255\n").unwrap();
        assert_eq!(hex, dec);
    }

    #[test]
    fn signed_and_unsigned_immediates_agree() {
        let signed = assemble("load_imm r1, -1\n").unwrap();
        let unsigned = assemble("load_imm r1, 4294967295\n").unwrap();
        assert_eq!(signed, unsigned);
    }

    #[test]
    fn error_undefined_label() {
        let err = assemble("trap\njump nowhere\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::UndefinedLabel {
                line: 2,
                label: "nowhere".to_string()
            }
        );
    }

    #[test]
    fn error_duplicate_label() {
        let err = assemble("a: trap\na: trap\n").unwrap_err();
        assert!(matches!(err, AsmError::DuplicateLabel { line: 2, .. }));
    }

    #[test]
    fn error_reports_correct_line() {
        let err = assemble("trap\nfoobar\n").unwrap_err();
        assert!(matches!(err, AsmError::UnknownOpcode { line: 2, .. }));
    }

    #[test]
    fn every_opcode_roundtrips() {
        for opcode in pvm_common::opcode::ALL_OPCODES {
            let operands = match opcode.form() {
                pvm_common::Form::NoArgs => "",
                pvm_common::Form::Imm => " 7",
                pvm_common::Form::RegExtImm => " r1, 0x123456789",
                pvm_common::Form::TwoImm => " -1, 300",
                pvm_common::Form::Offset => " 0",
                pvm_common::Form::RegImm => " r1, -2",
                pvm_common::Form::RegTwoImm => " r1, 2, -3",
                pvm_common::Form::RegImmOffset => " r1, 4, 0",
                pvm_common::Form::TwoReg => " r1, r2",
                pvm_common::Form::TwoRegImm => " r1, r2, 70000",
                pvm_common::Form::TwoRegOffset => " r1, r2, 0",
                pvm_common::Form::TwoRegTwoImm => " r1, r2, 5, -6",
                pvm_common::Form::ThreeReg => " r3, r1, r2",
            };
            let text = format!("{}{operands}\n", opcode.mnemonic());
            let program = assemble(&text).unwrap();
            assert_eq!(disassemble(&program), text, "roundtrip failed for {opcode:?}");
        }
    }

    fn arbitrary_line() -> impl Strategy<Value = String> {
        let reg = || (0u8..13).prop_map(|n| format!("r{n}"));
        prop_oneof![
            Just("fallthrough".to_string()),
            (reg(), any::<i32>()).prop_map(|(r, imm)| format!("load_imm {r}, {imm}")),
            (reg(), any::<u64>()).prop_map(|(r, imm)| format!("load_imm_64 {r}, {imm:#x}")),
            (reg(), reg(), any::<i32>())
                .prop_map(|(a, b, imm)| format!("add_imm_64 {a}, {b}, {imm}")),
            (reg(), reg(), reg()).prop_map(|(d, a, b)| format!("mul_64 {d}, {a}, {b}")),
            (reg(), any::<i32>()).prop_map(|(r, imm)| format!("branch_lt_u_imm {r}, {imm}, 0")),
            (any::<i32>(), any::<i32>()).prop_map(|(x, y)| format!("store_imm_u32 {x}, {y}")),
        ]
    }

    proptest! {
        /// Canonical text survives assemble → disassemble unchanged.
        #[test]
        fn canonical_text_roundtrips(lines in prop::collection::vec(arbitrary_line(), 1..20)) {
            let text: String = lines.iter().map(|line| format!("{line}\n")).collect();
            let program = assemble(&text).unwrap();
            prop_assert_eq!(disassemble(&program), text.clone());
            prop_assert_eq!(assemble(&disassemble(&program)).unwrap().encode(), program.encode());
        }
    }
}
