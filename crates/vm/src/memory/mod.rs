//! Guest memory: a paged 32-bit address space.
//!
//! Two layouts share the [`Memory`] trait:
//!
//! - [`StandardMemory`]: the fixed zone layout of a standard program
//!   (read-only data, heap, stack, argument).
//! - [`GeneralMemory`]: an arbitrary set of mapped pages backed by sparse
//!   chunks, used for inner machines.
//!
//! Every read and write checks page access for the whole range first and
//! either applies completely or not at all.

mod general;
mod page_map;
mod standard;

pub use general::{merge_chunk, Chunk, GeneralMemory, PageMode};
pub use page_map::{page_span, PageAccess, PageMap, DEFAULT_CACHE_CAPACITY};
pub use standard::StandardMemory;

use crate::error::MemoryError;

/// Byte-addressable guest memory.
pub trait Memory {
    fn page_map(&self) -> &PageMap;

    fn is_readable(&self, address: u32, length: usize) -> bool {
        self.page_map().is_readable(address, length as u64)
    }

    fn is_writable(&self, address: u32, length: usize) -> bool {
        self.page_map().is_writable(address, length as u64)
    }

    /// Fill `buf` from `address`. Unwritten bytes of mapped pages read as zero.
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Read `length` bytes into a new vector.
    fn read_vec(&self, address: u32, length: usize) -> Result<Vec<u8>, MemoryError> {
        self.page_map()
            .check_readable(address, length as u64)
            .map_err(MemoryError::NotReadable)?;
        let mut buf = vec![0u8; length];
        self.read(address, &mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError>;

    /// Grow the heap by `increment` bytes, returning the start of the new
    /// space. An increment of 0 reports the current heap end.
    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError>;
}

/// Split `[address, address + length)` at the top of the address space into
/// at most two `(address, offset into the buffer, length)` pieces.
pub(crate) fn wrapping_segments(address: u32, length: usize) -> Vec<(u32, usize, usize)> {
    let first_len = (u64::from(u32::MAX) - u64::from(address) + 1).min(length as u64) as usize;
    let mut segments = vec![(address, 0, first_len)];
    if first_len < length {
        segments.push((0, first_len, length - first_len));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_split_at_top() {
        assert_eq!(wrapping_segments(0x1000, 8), vec![(0x1000, 0, 8)]);
        assert_eq!(
            wrapping_segments(u32::MAX - 1, 4),
            vec![(u32::MAX - 1, 0, 2), (0, 2, 2)]
        );
    }
}
