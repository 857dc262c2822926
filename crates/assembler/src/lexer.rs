//! Tokenizer for PVM assembly text.

use std::fmt;

use crate::error::AsmError;

/// A single token from an assembly line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// An identifier: opcode mnemonic or label reference.
    Ident(String),
    /// A label definition, `name:`.
    Label(String),
    /// A directive, `.name`.
    Directive(String),
    /// A register `r0`..`r12`.
    Register(u8),
    /// A numeric literal (decimal or hex, optionally negative).
    Number(i128),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => f.write_str(name),
            Token::Label(name) => write!(f, "{name}:"),
            Token::Directive(name) => write!(f, ".{name}"),
            Token::Register(n) => write!(f, "r{n}"),
            Token::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Tokenize a single line of assembly text.
///
/// Returns an empty Vec for blank lines and comment-only lines.
/// Comments start with `;` and extend to end of line. Operands are separated
/// by commas and/or whitespace.
pub(crate) fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, AsmError> {
    let line = match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    };

    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| tokenize_word(word, line_num))
        .collect()
}

fn tokenize_word(word: &str, line_num: usize) -> Result<Token, AsmError> {
    if let Some(name) = word.strip_suffix(':') {
        if !is_identifier(name) {
            return Err(AsmError::UnexpectedToken {
                line: line_num,
                token: word.to_string(),
            });
        }
        return Ok(Token::Label(name.to_string()));
    }
    if let Some(name) = word.strip_prefix('.') {
        return Ok(Token::Directive(name.to_lowercase()));
    }
    if let Some(index) = register_index(word) {
        return match index.parse::<u8>() {
            Ok(n) if n <= 12 => Ok(Token::Register(n)),
            _ => Err(AsmError::InvalidRegister {
                line: line_num,
                token: word.to_string(),
            }),
        };
    }

    let unsigned = word.strip_prefix('-').unwrap_or(word);
    if unsigned.as_bytes().first().is_some_and(|b| b.is_ascii_digit()) {
        return parse_number(word)
            .map(Token::Number)
            .ok_or_else(|| AsmError::InvalidNumber {
                line: line_num,
                token: word.to_string(),
            });
    }

    if !is_identifier(word) {
        return Err(AsmError::UnexpectedToken {
            line: line_num,
            token: word.to_string(),
        });
    }
    Ok(Token::Ident(word.to_string()))
}

/// Digits of a register name such as `r7` or `R12`.
fn register_index(word: &str) -> Option<&str> {
    let digits = word.strip_prefix('r').or_else(|| word.strip_prefix('R'))?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
}

fn parse_number(word: &str) -> Option<i128> {
    let (negative, magnitude) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let value = match magnitude
        .strip_prefix("0x")
        .or_else(|| magnitude.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => magnitude.parse::<u64>().ok()?,
    };
    let value = i128::from(value);
    Some(if negative { -value } else { value })
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line() {
        assert_eq!(tokenize_line("", 1).unwrap(), vec![]);
    }

    #[test]
    fn comment_only() {
        assert_eq!(tokenize_line("   ; this is a comment", 1).unwrap(), vec![]);
    }

    #[test]
    fn instruction_with_operands() {
        assert_eq!(
            tokenize_line("add_imm_64 r1, r2, -8 ; decrement", 1).unwrap(),
            vec![
                Token::Ident("add_imm_64".to_string()),
                Token::Register(1),
                Token::Register(2),
                Token::Number(-8),
            ]
        );
    }

    #[test]
    fn label_and_directive() {
        assert_eq!(
            tokenize_line("loop: .jump_table a,b", 1).unwrap(),
            vec![
                Token::Label("loop".to_string()),
                Token::Directive("jump_table".to_string()),
                Token::Ident("a".to_string()),
                Token::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn hex_numbers() {
        assert_eq!(
            tokenize_line("0xff 0X10 -0x1 18446744073709551615", 1).unwrap(),
            vec![
                Token::Number(255),
                Token::Number(16),
                Token::Number(-1),
                Token::Number(u64::MAX as i128),
            ]
        );
    }

    #[test]
    fn invalid_hex_number() {
        let err = tokenize_line("load_imm r1, 0xZZ", 3).unwrap_err();
        assert_eq!(
            err,
            AsmError::InvalidNumber {
                line: 3,
                token: "0xZZ".to_string()
            }
        );
    }

    #[test]
    fn number_too_large() {
        let err = tokenize_line("99999999999999999999999", 5).unwrap_err();
        assert!(matches!(err, AsmError::InvalidNumber { line: 5, .. }));
    }

    #[test]
    fn register_out_of_range() {
        assert_eq!(
            tokenize_line("move_reg r13, r1", 2).unwrap_err(),
            AsmError::InvalidRegister {
                line: 2,
                token: "r13".to_string()
            }
        );
    }

    #[test]
    fn register_like_labels_are_identifiers() {
        assert_eq!(
            tokenize_line("jump rx", 1).unwrap(),
            vec![Token::Ident("jump".to_string()), Token::Ident("rx".to_string())]
        );
    }

    #[test]
    fn stray_punctuation() {
        assert!(matches!(
            tokenize_line("trap #", 1),
            Err(AsmError::UnexpectedToken { .. })
        ));
    }
}
