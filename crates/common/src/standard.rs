//! Standard program blobs: a program plus the initial memory image.
//!
//! ```text
//! [u24 readOnlyLen][u24 readWriteLen][u16 heapPages][u24 stackSize]
//! [readOnly bytes][readWrite bytes][u32 codeLength][program blob]
//! ```
//!
//! All integers are little-endian. The read-only section is mapped as the
//! constant zone, the read-write section seeds the heap.

use tracing::warn;

use crate::codec::{decode_fixed, encode_fixed};
use crate::error::ProgramError;
use crate::layout::{align_to_page, align_to_zone, INPUT_SIZE, PAGE_SIZE, ZONE_SIZE};
use crate::program::ProgramCode;

/// A parsed standard program blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardProgramBlob {
    pub read_only: Vec<u8>,
    pub read_write: Vec<u8>,
    /// Zeroed pages mapped after the read-write data.
    pub heap_pages: u16,
    pub stack_size: u32,
    pub program: ProgramCode,
}

/// Reads little-endian fields from the front of a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProgramError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or(ProgramError::TruncatedHeader)?;
        self.pos += len;
        Ok(slice)
    }

    fn int(&mut self, width: usize) -> Result<u64, ProgramError> {
        self.take(width).map(decode_fixed)
    }
}

impl StandardProgramBlob {
    /// Parse a standard program blob, including the nested program.
    ///
    /// # Errors
    ///
    /// [`ProgramError::TruncatedHeader`] if a field or section runs past the
    /// end, [`ProgramError::LayoutTooLarge`] if the requested memory does not
    /// fit the address space, or any error from [`ProgramCode::parse`].
    pub fn parse(blob: &[u8]) -> Result<Self, ProgramError> {
        let mut reader = Reader { bytes: blob, pos: 0 };
        let read_only_len = reader.int(3)? as usize;
        let read_write_len = reader.int(3)? as usize;
        let heap_pages = reader.int(2)? as u16;
        let stack_size = reader.int(3)? as u32;

        let required = Self::footprint(read_only_len, read_write_len, heap_pages, stack_size);
        if required > 1 << 32 {
            warn!(required, "rejecting standard program: layout exceeds address space");
            return Err(ProgramError::LayoutTooLarge { required });
        }

        let read_only = reader.take(read_only_len)?.to_vec();
        let read_write = reader.take(read_write_len)?.to_vec();
        let code_len = reader.int(4)? as usize;
        let code = reader.take(code_len)?;
        let program = ProgramCode::parse(code)?;

        Ok(Self {
            read_only,
            read_write,
            heap_pages,
            stack_size,
            program,
        })
    }

    /// Address space a program with these sizes occupies.
    fn footprint(read_only: usize, read_write: usize, heap_pages: u16, stack: u32) -> u64 {
        let heap = read_write as u64 + u64::from(heap_pages) * u64::from(PAGE_SIZE);
        5 * u64::from(ZONE_SIZE)
            + align_to_zone(read_only as u64)
            + align_to_zone(heap)
            + align_to_zone(u64::from(stack))
            + u64::from(INPUT_SIZE)
    }

    /// Bytes initially mapped for the heap: the read-write data rounded up
    /// to whole pages, plus the extra zeroed pages.
    pub fn initial_heap_len(&self) -> u64 {
        align_to_page(self.read_write.len() as u64)
            + u64::from(self.heap_pages) * u64::from(PAGE_SIZE)
    }

    pub fn encode(&self) -> Vec<u8> {
        let code = self.program.encode();
        let mut out = Vec::new();
        out.extend(encode_fixed(self.read_only.len() as u64, 3));
        out.extend(encode_fixed(self.read_write.len() as u64, 3));
        out.extend(encode_fixed(u64::from(self.heap_pages), 2));
        out.extend(encode_fixed(u64::from(self.stack_size), 3));
        out.extend_from_slice(&self.read_only);
        out.extend_from_slice(&self.read_write);
        out.extend(encode_fixed(code.len() as u64, 4));
        out.extend(code);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;
    use crate::program::ProgramBuilder;

    fn trap_program() -> ProgramCode {
        let mut builder = ProgramBuilder::new();
        builder.push(Instruction::bare(Opcode::Trap));
        builder.build()
    }

    #[test]
    fn roundtrip() {
        let blob = StandardProgramBlob {
            read_only: b"consts".to_vec(),
            read_write: vec![1, 2, 3],
            heap_pages: 2,
            stack_size: 8192,
            program: trap_program(),
        };
        let bytes = blob.encode();
        assert_eq!(StandardProgramBlob::parse(&bytes).unwrap(), blob);
        assert_eq!(blob.initial_heap_len(), 3 * 4096);
    }

    #[test]
    fn truncated_header() {
        assert_eq!(
            StandardProgramBlob::parse(&[0, 0, 0, 0]),
            Err(ProgramError::TruncatedHeader)
        );
    }

    #[test]
    fn truncated_section() {
        let mut bytes = vec![10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend([0; 4]);
        assert_eq!(
            StandardProgramBlob::parse(&bytes),
            Err(ProgramError::TruncatedHeader)
        );
    }

    #[test]
    fn nested_program_errors_surface() {
        let mut bytes = vec![0; 11];
        bytes.extend(encode_fixed(1, 4));
        bytes.push(0);
        assert_eq!(
            StandardProgramBlob::parse(&bytes),
            Err(ProgramError::InvalidJumpTableEncodeSize)
        );
    }

    #[test]
    fn footprint_accounts_for_zones() {
        let empty = StandardProgramBlob::footprint(0, 0, 0, 0);
        assert_eq!(empty, 5 * 65536 + (1 << 24));

        // one byte of each section costs a whole zone
        let small = StandardProgramBlob::footprint(1, 1, 0, 1);
        assert_eq!(small, empty + 3 * 65536);

        // the largest encodable header still fits
        let largest = StandardProgramBlob::footprint(0xFF_FFFF, 0xFF_FFFF, 0xFFFF, 0xFF_FFFF);
        assert!(largest <= 1 << 32);
    }
}
