//! Decode and blob-structure errors.

use thiserror::Error;

/// Errors that occur while decoding a single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte at the instruction start is not an assigned opcode.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
}

/// Structural errors in a program blob or a standard program blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// Jump-table entry count is missing or exceeds the limit.
    #[error("invalid jump table entries count")]
    InvalidJumpTableEntriesCount,

    /// Jump-table entry width is missing or wider than 8 bytes.
    #[error("invalid jump table encode size")]
    InvalidJumpTableEncodeSize,

    /// Code length is missing or exceeds the limit.
    #[error("invalid code length")]
    InvalidCodeLength,

    /// The sections do not exactly fill the blob.
    #[error("invalid data length: expected {expected} bytes, found {found}")]
    InvalidDataLength { expected: usize, found: usize },

    /// A standard program header field is truncated.
    #[error("truncated standard program header")]
    TruncatedHeader,

    /// The memory a standard program requests does not fit the address space.
    #[error("standard program layout needs {required} bytes of address space")]
    LayoutTooLarge { required: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_opcode() {
        assert_eq!(
            DecodeError::UnknownOpcode(0x0B).to_string(),
            "unknown opcode: 0x0b"
        );
    }

    #[test]
    fn display_invalid_data_length() {
        assert_eq!(
            ProgramError::InvalidDataLength {
                expected: 12,
                found: 10
            }
            .to_string(),
            "invalid data length: expected 12 bytes, found 10"
        );
    }
}
