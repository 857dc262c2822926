//! Program blobs: parsing, basic-block discovery and construction.
//!
//! A program blob has the layout
//!
//! ```text
//! [natural jumpTableCount][u8 entrySize][natural codeLength]
//! [jump table: count * entrySize bytes][code][bitmask: ceil(codeLength / 8) bytes]
//! ```
//!
//! Bit `i` of the bitmask is set when byte `i` of the code starts an
//! instruction. Parsing is a pure function; a parsed [`ProgramCode`] is
//! immutable and can be shared between machines.

use std::collections::HashSet;

use tracing::debug;

use crate::codec::{decode_fixed, decode_natural, encode_natural};
use crate::error::{DecodeError, ProgramError};
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// Upper bound on jump-table entries.
pub const MAX_JUMP_TABLE_ENTRIES: u64 = 1 << 20;

/// Upper bound on the width of a jump-table entry in bytes.
pub const MAX_JUMP_TABLE_ENTRY_SIZE: u8 = 8;

/// Upper bound on the code length in bytes.
pub const MAX_CODE_LENGTH: u64 = 1 << 22;

/// Upper bound on the number of operand bytes of one instruction.
pub const MAX_SKIP: u32 = 24;

/// Number of operand bytes of the instruction starting at `start`.
///
/// Counts the clear bits that follow `start` in `bitmask` up to the next set
/// bit, capped at [`MAX_SKIP`]. Bytes beyond the bitmask read as all ones.
pub fn skip(start: u32, bitmask: &[u8]) -> u32 {
    let begin = start as usize + 1;
    let byte = begin / 8;
    if byte >= bitmask.len() {
        return 0;
    }

    let mut window = [0xFFu8; 4];
    let available = (bitmask.len() - byte).min(4);
    window[..available].copy_from_slice(&bitmask[byte..byte + available]);

    let bits = u32::from_le_bytes(window) >> (begin % 8);
    bits.trailing_zeros().min(MAX_SKIP)
}

/// A parsed, validated program blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramCode {
    jump_table: Vec<u8>,
    jump_table_len: usize,
    jump_table_entry_size: u8,
    code: Vec<u8>,
    bitmask: Vec<u8>,
    basic_block_indices: HashSet<u32>,
}

impl ProgramCode {
    /// Parse a program blob.
    ///
    /// # Errors
    ///
    /// Returns a [`ProgramError`] if a header field is missing or exceeds its
    /// limit, or if the sections do not exactly fill the blob.
    pub fn parse(blob: &[u8]) -> Result<Self, ProgramError> {
        let (count, mut cursor) =
            decode_natural(blob).ok_or(ProgramError::InvalidJumpTableEntriesCount)?;
        if count > MAX_JUMP_TABLE_ENTRIES {
            debug!(count, "rejecting program: too many jump table entries");
            return Err(ProgramError::InvalidJumpTableEntriesCount);
        }

        let entry_size = *blob
            .get(cursor)
            .ok_or(ProgramError::InvalidJumpTableEncodeSize)?;
        if entry_size > MAX_JUMP_TABLE_ENTRY_SIZE {
            debug!(entry_size, "rejecting program: jump table entry too wide");
            return Err(ProgramError::InvalidJumpTableEncodeSize);
        }
        cursor += 1;

        let (code_len, used) =
            decode_natural(&blob[cursor..]).ok_or(ProgramError::InvalidCodeLength)?;
        if code_len > MAX_CODE_LENGTH {
            debug!(code_len, "rejecting program: code too long");
            return Err(ProgramError::InvalidCodeLength);
        }
        cursor += used;

        let count = count as usize;
        let code_len = code_len as usize;
        let table_len = count * usize::from(entry_size);
        let bitmask_len = code_len.div_ceil(8);
        let expected = cursor + table_len + code_len + bitmask_len;
        if blob.len() != expected {
            debug!(expected, found = blob.len(), "rejecting program: section sizes mismatch");
            return Err(ProgramError::InvalidDataLength {
                expected,
                found: blob.len(),
            });
        }

        let jump_table = blob[cursor..cursor + table_len].to_vec();
        cursor += table_len;
        let code = blob[cursor..cursor + code_len].to_vec();
        cursor += code_len;
        let bitmask = blob[cursor..].to_vec();

        Ok(Self::from_parts(jump_table, count, entry_size, code, bitmask))
    }

    fn from_parts(
        jump_table: Vec<u8>,
        jump_table_len: usize,
        jump_table_entry_size: u8,
        code: Vec<u8>,
        bitmask: Vec<u8>,
    ) -> Self {
        let mut program = Self {
            jump_table,
            jump_table_len,
            jump_table_entry_size,
            code,
            bitmask,
            basic_block_indices: HashSet::new(),
        };
        program.basic_block_indices = program.scan_basic_blocks();
        program
    }

    /// Offsets that start a basic block: 0, the end of the code, and the
    /// offset following every block-terminating instruction.
    fn scan_basic_blocks(&self) -> HashSet<u32> {
        let mut blocks = HashSet::from([0]);
        let mut pc = 0u32;
        while let Some(&byte) = self.code.get(pc as usize) {
            let next = pc + self.skip(pc) + 1;
            if Opcode::try_from(byte).is_ok_and(|op| op.is_block_terminator()) {
                blocks.insert(next);
            }
            pc = next;
        }
        blocks.insert(self.code.len() as u32);
        blocks
    }

    /// Re-serialise to the blob format accepted by [`ProgramCode::parse`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = encode_natural(self.jump_table_len as u64);
        out.push(self.jump_table_entry_size);
        out.extend(encode_natural(self.code.len() as u64));
        out.extend_from_slice(&self.jump_table);
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.bitmask);
        out
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn bitmask(&self) -> &[u8] {
        &self.bitmask
    }

    pub fn jump_table(&self) -> &[u8] {
        &self.jump_table
    }

    pub fn jump_table_entry_size(&self) -> u8 {
        self.jump_table_entry_size
    }

    /// Number of jump-table entries.
    pub fn jump_table_len(&self) -> usize {
        self.jump_table_len
    }

    /// Code offset stored in jump-table entry `index`.
    pub fn jump_table_entry(&self, index: usize) -> Option<u32> {
        if index >= self.jump_table_len {
            return None;
        }
        let size = usize::from(self.jump_table_entry_size);
        let start = index * size;
        Some(decode_fixed(&self.jump_table[start..start + size]) as u32)
    }

    pub fn basic_block_indices(&self) -> &HashSet<u32> {
        &self.basic_block_indices
    }

    pub fn is_basic_block_start(&self, offset: u32) -> bool {
        self.basic_block_indices.contains(&offset)
    }

    /// Operand bytes of the instruction at `pc`. Positions past the end of
    /// the code count as instruction starts, so the last instruction never
    /// extends beyond the code.
    pub fn skip(&self, pc: u32) -> u32 {
        let remaining = (self.code.len() as u64).saturating_sub(u64::from(pc) + 1);
        u64::from(skip(pc, &self.bitmask)).min(remaining) as u32
    }

    /// Decode the instruction at `pc`. Offsets past the end decode as `trap`.
    pub fn instruction_at(&self, pc: u32) -> Result<Instruction, DecodeError> {
        Instruction::decode(&self.code, pc, self.skip(pc))
    }

    /// Iterate over `(offset, decoded instruction)` pairs in code order.
    pub fn instructions(&self) -> impl Iterator<Item = (u32, Result<Instruction, DecodeError>)> + '_ {
        let mut pc = 0u32;
        std::iter::from_fn(move || {
            if pc as usize >= self.code.len() {
                return None;
            }
            let at = pc;
            pc += self.skip(pc) + 1;
            Some((at, self.instruction_at(at)))
        })
    }
}

/// Incrementally assembles a [`ProgramCode`] from instructions.
///
/// Instructions are laid out in push order; the bitmask and the narrowest
/// jump-table entry width are derived on [`ProgramBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    starts: Vec<u32>,
    jump_table: Vec<u32>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset at which the next instruction will be placed.
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Relative offset from the next instruction to `target`.
    pub fn offset_to(&self, target: u32) -> u32 {
        target.wrapping_sub(self.offset())
    }

    /// Append an instruction, returning its offset.
    pub fn push(&mut self, instruction: Instruction) -> u32 {
        let at = self.offset();
        self.starts.push(at);
        self.code.extend(instruction.encode());
        at
    }

    /// Append a jump-table entry pointing at `target`, returning the
    /// dynamic-jump address that selects it.
    pub fn push_jump_target(&mut self, target: u32) -> u32 {
        self.jump_table.push(target);
        self.jump_table.len() as u32 * crate::layout::JUMP_ALIGNMENT
    }

    pub fn build(self) -> ProgramCode {
        let mut bitmask = vec![0u8; self.code.len().div_ceil(8)];
        for start in &self.starts {
            bitmask[*start as usize / 8] |= 1 << (start % 8);
        }

        let widest = self.jump_table.iter().copied().max().unwrap_or(0);
        let entry_size = (32 - widest.leading_zeros()).div_ceil(8) as u8;
        let jump_table = self
            .jump_table
            .iter()
            .flat_map(|target| target.to_le_bytes()[..usize::from(entry_size)].to_vec())
            .collect();

        ProgramCode::from_parts(
            jump_table,
            self.jump_table.len(),
            entry_size,
            self.code,
            bitmask,
        )
    }
}
