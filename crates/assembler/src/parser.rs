//! Parser for PVM assembly tokens → instructions.
//!
//! Dispatches on the opcode's operand [`Form`]. Operands are written in
//! encoding order, except three-register forms which put the destination
//! first: `add_64 rd, ra, rb`.

use crate::error::AsmError;
use crate::lexer::Token;
use pvm_common::{Args, Form, Instruction, Opcode, Reg};

/// A jump destination before labels are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Label(String),
    /// Absolute code offset.
    Absolute(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    /// An instruction. If `target` is set, its offset operand is a
    /// placeholder to be filled in once labels are known.
    Instruction {
        instruction: Instruction,
        target: Option<Target>,
    },
    /// `.jump_table` entries, appended in order.
    JumpTable(Vec<Target>),
}

/// Labels defined on a line and what follows them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ParsedLine {
    pub labels: Vec<String>,
    pub item: Option<Item>,
}

/// Parse the tokens of a single line.
pub(crate) fn parse_line(tokens: &[Token], line_num: usize) -> Result<ParsedLine, AsmError> {
    let mut rest = tokens;
    let mut labels = Vec::new();
    while let Some((Token::Label(name), tail)) = rest.split_first() {
        labels.push(name.clone());
        rest = tail;
    }

    let item = match rest.split_first() {
        None => None,
        Some((Token::Directive(name), args)) if name == "jump_table" => Some(Item::JumpTable(
            args.iter()
                .map(|token| parse_target(token, line_num))
                .collect::<Result<_, _>>()?,
        )),
        Some((Token::Directive(name), _)) => {
            return Err(AsmError::UnknownDirective {
                line: line_num,
                token: format!(".{name}"),
            })
        }
        Some((Token::Ident(mnemonic), args)) => Some(parse_instruction(mnemonic, args, line_num)?),
        Some((other, _)) => {
            return Err(AsmError::UnexpectedToken {
                line: line_num,
                token: other.to_string(),
            })
        }
    };

    Ok(ParsedLine { labels, item })
}

/// Number of operands written for each form.
fn operand_count(form: Form) -> usize {
    match form {
        Form::NoArgs => 0,
        Form::Imm | Form::Offset => 1,
        Form::RegExtImm | Form::TwoImm | Form::RegImm | Form::TwoReg => 2,
        Form::RegTwoImm
        | Form::RegImmOffset
        | Form::TwoRegImm
        | Form::TwoRegOffset
        | Form::ThreeReg => 3,
        Form::TwoRegTwoImm => 4,
    }
}

fn parse_instruction(mnemonic: &str, args: &[Token], line_num: usize) -> Result<Item, AsmError> {
    let opcode = Opcode::from_mnemonic(&mnemonic.to_lowercase()).ok_or_else(|| {
        AsmError::UnknownOpcode {
            line: line_num,
            token: mnemonic.to_string(),
        }
    })?;

    let mut ops = Operands {
        tokens: args,
        pos: 0,
        line: line_num,
        opcode,
    };
    let mut target = None;

    let parsed = match opcode.form() {
        Form::NoArgs => Args::None,
        Form::Imm => Args::Imm { imm: ops.imm()? },
        Form::RegExtImm => Args::RegExtImm {
            reg: ops.reg()?,
            imm: ops.imm64()?,
        },
        Form::TwoImm => Args::TwoImm {
            imm_x: ops.imm()?,
            imm_y: ops.imm()?,
        },
        Form::Offset => {
            target = Some(ops.target()?);
            Args::Offset { offset: 0 }
        }
        Form::RegImm => Args::RegImm {
            reg: ops.reg()?,
            imm: ops.imm()?,
        },
        Form::RegTwoImm => Args::RegTwoImm {
            reg: ops.reg()?,
            imm_x: ops.imm()?,
            imm_y: ops.imm()?,
        },
        Form::RegImmOffset => {
            let reg = ops.reg()?;
            let imm = ops.imm()?;
            target = Some(ops.target()?);
            Args::RegImmOffset {
                reg,
                imm,
                offset: 0,
            }
        }
        Form::TwoReg => Args::TwoReg {
            dst: ops.reg()?,
            src: ops.reg()?,
        },
        Form::TwoRegImm => Args::TwoRegImm {
            ra: ops.reg()?,
            rb: ops.reg()?,
            imm: ops.imm()?,
        },
        Form::TwoRegOffset => {
            let ra = ops.reg()?;
            let rb = ops.reg()?;
            target = Some(ops.target()?);
            Args::TwoRegOffset { ra, rb, offset: 0 }
        }
        Form::TwoRegTwoImm => Args::TwoRegTwoImm {
            ra: ops.reg()?,
            rb: ops.reg()?,
            imm_x: ops.imm()?,
            imm_y: ops.imm()?,
        },
        Form::ThreeReg => {
            let rd = ops.reg()?;
            let ra = ops.reg()?;
            let rb = ops.reg()?;
            Args::ThreeReg { ra, rb, rd }
        }
    };
    ops.finish()?;

    Ok(Item::Instruction {
        instruction: Instruction::new(opcode, parsed),
        target,
    })
}

fn parse_target(token: &Token, line_num: usize) -> Result<Target, AsmError> {
    match token {
        Token::Ident(label) => Ok(Target::Label(label.clone())),
        Token::Number(n) => u32::try_from(*n)
            .map(Target::Absolute)
            .map_err(|_| AsmError::InvalidNumber {
                line: line_num,
                token: n.to_string(),
            }),
        other => Err(AsmError::UnexpectedToken {
            line: line_num,
            token: other.to_string(),
        }),
    }
}

/// Cursor over the operand tokens of one instruction.
struct Operands<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
    opcode: Opcode,
}

impl<'a> Operands<'a> {
    fn next(&mut self) -> Result<&'a Token, AsmError> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| AsmError::MissingArgument {
                line: self.line,
                opcode: self.opcode.mnemonic(),
                expected: operand_count(self.opcode.form()),
            })?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token) -> AsmError {
        AsmError::UnexpectedToken {
            line: self.line,
            token: token.to_string(),
        }
    }

    fn reg(&mut self) -> Result<Reg, AsmError> {
        match self.next()? {
            Token::Register(n) => Reg::new(*n).ok_or_else(|| AsmError::InvalidRegister {
                line: self.line,
                token: format!("r{n}"),
            }),
            other => Err(self.unexpected(other)),
        }
    }

    fn number(&mut self, min: i128, max: i128) -> Result<i128, AsmError> {
        let line = self.line;
        match self.next()? {
            Token::Number(n) if (min..=max).contains(n) => Ok(*n),
            Token::Number(n) => Err(AsmError::InvalidNumber {
                line,
                token: n.to_string(),
            }),
            other => Err(self.unexpected(other)),
        }
    }

    /// A 32-bit immediate, written signed or unsigned.
    fn imm(&mut self) -> Result<u32, AsmError> {
        let n = self.number(i128::from(i32::MIN), i128::from(u32::MAX))?;
        Ok(n as i64 as u32)
    }

    /// A 64-bit immediate, written signed or unsigned.
    fn imm64(&mut self) -> Result<u64, AsmError> {
        let n = self.number(i128::from(i64::MIN), i128::from(u64::MAX))?;
        Ok(n as u64)
    }

    fn target(&mut self) -> Result<Target, AsmError> {
        let line = self.line;
        let token = self.next()?;
        parse_target(token, line)
    }

    fn finish(self) -> Result<(), AsmError> {
        match self.tokens.get(self.pos) {
            Some(extra) => Err(self.unexpected(extra)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    fn reg(n: u8) -> Reg {
        Reg::new(n).unwrap()
    }

    fn instruction(tokens: &[Token]) -> (Instruction, Option<Target>) {
        match parse_line(tokens, 1).unwrap().item {
            Some(Item::Instruction { instruction, target }) => (instruction, target),
            other => panic!("expected an instruction, got {other:?}"),
        }
    }

    #[test]
    fn parse_empty_tokens() {
        assert_eq!(parse_line(&[], 1).unwrap(), ParsedLine::default());
    }

    #[test]
    fn parse_no_operands() {
        let (instr, target) = instruction(&[ident("trap")]);
        assert_eq!(instr, Instruction::bare(Opcode::Trap));
        assert_eq!(target, None);
    }

    #[test]
    fn parse_three_registers_destination_first() {
        let (instr, _) = instruction(&[
            ident("sub_64"),
            Token::Register(3),
            Token::Register(1),
            Token::Register(2),
        ]);
        assert_eq!(
            instr.args,
            Args::ThreeReg {
                ra: reg(1),
                rb: reg(2),
                rd: reg(3)
            }
        );
    }

    #[test]
    fn parse_branch_with_label() {
        let (instr, target) = instruction(&[
            ident("branch_ne_imm"),
            Token::Register(1),
            Token::Number(-1),
            ident("loop"),
        ]);
        assert_eq!(instr.opcode, Opcode::BranchNeImm);
        assert_eq!(
            instr.args,
            Args::RegImmOffset {
                reg: reg(1),
                imm: 0xFFFF_FFFF,
                offset: 0
            }
        );
        assert_eq!(target, Some(Target::Label("loop".to_string())));
    }

    #[test]
    fn parse_two_register_branch_with_absolute_target() {
        let (instr, target) = instruction(&[
            ident("branch_lt_u"),
            Token::Register(4),
            Token::Register(5),
            Token::Number(12),
        ]);
        assert_eq!(
            instr.args,
            Args::TwoRegOffset {
                ra: reg(4),
                rb: reg(5),
                offset: 0
            }
        );
        assert_eq!(target, Some(Target::Absolute(12)));
    }

    #[test]
    fn branch_target_must_be_label_or_number() {
        let err = parse_line(
            &[
                ident("branch_eq"),
                Token::Register(1),
                Token::Register(2),
                Token::Register(3),
            ],
            6,
        )
        .unwrap_err();
        assert_eq!(
            err,
            AsmError::UnexpectedToken {
                line: 6,
                token: "r3".to_string()
            }
        );
    }

    #[test]
    fn parse_extended_immediate() {
        let (instr, _) = instruction(&[
            ident("load_imm_64"),
            Token::Register(2),
            Token::Number(-2),
        ]);
        assert_eq!(
            instr.args,
            Args::RegExtImm {
                reg: reg(2),
                imm: u64::MAX - 1
            }
        );
    }

    #[test]
    fn parse_labels_and_jump_table() {
        let parsed = parse_line(
            &[
                Token::Label("a".to_string()),
                Token::Directive("jump_table".to_string()),
                ident("a"),
                Token::Number(7),
            ],
            1,
        )
        .unwrap();
        assert_eq!(parsed.labels, vec!["a".to_string()]);
        assert_eq!(
            parsed.item,
            Some(Item::JumpTable(vec![
                Target::Label("a".to_string()),
                Target::Absolute(7)
            ]))
        );
    }

    #[test]
    fn missing_operand() {
        let err = parse_line(&[ident("add_64"), Token::Register(1)], 4).unwrap_err();
        assert_eq!(
            err,
            AsmError::MissingArgument {
                line: 4,
                opcode: "add_64",
                expected: 3
            }
        );
    }

    #[test]
    fn extra_operand() {
        let err = parse_line(&[ident("trap"), Token::Number(1)], 2).unwrap_err();
        assert!(matches!(err, AsmError::UnexpectedToken { line: 2, .. }));
    }

    #[test]
    fn immediate_out_of_range() {
        let err = parse_line(
            &[ident("load_imm"), Token::Register(1), Token::Number(1 << 32)],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, AsmError::InvalidNumber { .. }));
    }

    #[test]
    fn register_where_immediate_expected() {
        let err = parse_line(&[ident("ecalli"), Token::Register(1)], 1).unwrap_err();
        assert_eq!(
            err,
            AsmError::UnexpectedToken {
                line: 1,
                token: "r1".to_string()
            }
        );
    }

    #[test]
    fn unknown_opcode_and_directive() {
        assert!(matches!(
            parse_line(&[ident("frobnicate")], 1),
            Err(AsmError::UnknownOpcode { .. })
        ));
        assert!(matches!(
            parse_line(&[Token::Directive("data".to_string())], 1),
            Err(AsmError::UnknownDirective { .. })
        ));
    }
}
