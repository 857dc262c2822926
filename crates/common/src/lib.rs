//! PVM common types and blob encoding.
//!
//! This crate provides the wire-level building blocks shared by the
//! interpreter, the assembler and the CLI:
//!
//! - [`codec`]: natural-number and fixed-width integer serialisation
//! - [`Opcode`]: the 64-bit PVM opcode table and operand [`Form`]s
//! - [`Instruction`]: decoded instructions with their variable-length encoding
//! - [`ProgramCode`]: parsed program blobs with basic-block analysis
//! - [`StandardProgramBlob`]: a program plus its initial memory image
//! - [`layout`]: address-space constants
//!
//! Parsing never panics on malformed input; structural problems surface as
//! [`ProgramError`] and unknown opcodes as [`DecodeError`].

pub mod codec;
pub mod error;
pub mod instruction;
pub mod layout;
pub mod opcode;
pub mod program;
pub mod standard;

// Re-export commonly used types at the crate root.
pub use error::{DecodeError, ProgramError};
pub use instruction::{Args, Instruction, Reg};
pub use opcode::{Form, Opcode};
pub use program::{ProgramBuilder, ProgramCode};
pub use standard::StandardProgramBlob;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary bytes never panic the parser, and anything it accepts
        /// survives a re-encode.
        #[test]
        fn parse_is_total(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            if let Ok(program) = ProgramCode::parse(&bytes) {
                prop_assert!(program.is_basic_block_start(0));
                prop_assert_eq!(ProgramCode::parse(&program.encode()), Ok(program));
            }
        }

        /// skip never exceeds its cap, whatever the bitmask.
        #[test]
        fn skip_is_bounded(
            bitmask in prop::collection::vec(any::<u8>(), 0..8),
            start in 0u32..80,
        ) {
            prop_assert!(program::skip(start, &bitmask) <= program::MAX_SKIP);
        }

        /// A program of fallthroughs has a block boundary after every byte.
        #[test]
        fn fallthroughs_split_blocks(n in 1usize..40) {
            let mut builder = ProgramBuilder::new();
            for _ in 0..n {
                builder.push(Instruction::bare(Opcode::Fallthrough));
            }
            let program = builder.build();
            prop_assert_eq!(program.basic_block_indices().len(), n + 1);
        }
    }
}
