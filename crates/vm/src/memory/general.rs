//! Sparse memory with arbitrary page mappings.
//!
//! Contents live in a sorted list of chunks. No two chunks overlap or touch:
//! a write merges every chunk it overlaps or abuts into one contiguous chunk.
//! Mapped bytes outside every chunk read as zero.

use pvm_common::layout::{align_to_page, PAGE_SIZE, ZONE_SIZE};
use tracing::debug;

use super::page_map::{PageAccess, PageMap};
use super::{wrapping_segments, Memory};
use crate::error::MemoryError;

const FIRST_HEAP_PAGE: u32 = ZONE_SIZE / PAGE_SIZE;

/// Bytes stored from `start`. Never crosses the top of the address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start: u32,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn end(&self) -> u64 {
        u64::from(self.start) + self.data.len() as u64
    }
}

/// Write `bytes` at `start` into the sorted `chunks`, merging every chunk
/// the write overlaps or abuts.
pub fn merge_chunk(chunks: &mut Vec<Chunk>, start: u32, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let end = u64::from(start) + bytes.len() as u64;
    let first = chunks.partition_point(|chunk| chunk.end() < u64::from(start));
    let last = chunks.partition_point(|chunk| u64::from(chunk.start) <= end);

    if first == last {
        chunks.insert(
            first,
            Chunk {
                start,
                data: bytes.to_vec(),
            },
        );
        return;
    }

    let merged_start = chunks[first].start.min(start);
    let merged_end = chunks[last - 1].end().max(end);
    let mut data = vec![0u8; (merged_end - u64::from(merged_start)) as usize];
    for chunk in &chunks[first..last] {
        let offset = (chunk.start - merged_start) as usize;
        data[offset..offset + chunk.data.len()].copy_from_slice(&chunk.data);
    }
    let offset = (start - merged_start) as usize;
    data[offset..offset + bytes.len()].copy_from_slice(bytes);

    chunks.splice(
        first..last,
        std::iter::once(Chunk {
            start: merged_start,
            data,
        }),
    );
}

/// Drop stored bytes in `[start, end)`, splitting chunks at the edges.
fn clear_range(chunks: &mut Vec<Chunk>, start: u64, end: u64) {
    let mut kept = Vec::with_capacity(chunks.len() + 1);
    for chunk in chunks.drain(..) {
        let chunk_start = u64::from(chunk.start);
        if chunk.end() <= start || chunk_start >= end {
            kept.push(chunk);
            continue;
        }
        if chunk_start < start {
            kept.push(Chunk {
                start: chunk.start,
                data: chunk.data[..(start - chunk_start) as usize].to_vec(),
            });
        }
        if chunk.end() > end {
            kept.push(Chunk {
                start: end as u32,
                data: chunk.data[(end - chunk_start) as usize..].to_vec(),
            });
        }
    }
    *chunks = kept;
}

/// How [`GeneralMemory::set_pages`] changes a page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Unmap and discard contents.
    Void = 0,
    /// Zero and map read-only.
    ZeroReadOnly = 1,
    /// Zero and map read-write.
    ZeroReadWrite = 2,
    /// Map read-only, keeping contents.
    ReadOnly = 3,
    /// Map read-write, keeping contents.
    ReadWrite = 4,
}

impl TryFrom<u64> for PageMode {
    type Error = u64;

    fn try_from(mode: u64) -> Result<Self, u64> {
        Ok(match mode {
            0 => PageMode::Void,
            1 => PageMode::ZeroReadOnly,
            2 => PageMode::ZeroReadWrite,
            3 => PageMode::ReadOnly,
            4 => PageMode::ReadWrite,
            other => return Err(other),
        })
    }
}

impl PageMode {
    /// Whether the mode keeps existing contents, which requires the pages to
    /// be mapped already.
    pub fn keeps_contents(self) -> bool {
        matches!(self, PageMode::ReadOnly | PageMode::ReadWrite)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneralMemory {
    page_map: PageMap,
    chunks: Vec<Chunk>,
}

impl GeneralMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_map(page_map: PageMap) -> Self {
        Self {
            page_map,
            chunks: Vec::new(),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Apply `mode` to `count` pages from page `first`.
    pub fn set_pages(&mut self, first: u32, count: u32, mode: PageMode) {
        let start = u64::from(first) * u64::from(PAGE_SIZE);
        let end = start + u64::from(count) * u64::from(PAGE_SIZE);
        match mode {
            PageMode::Void => {
                clear_range(&mut self.chunks, start, end);
                self.page_map.remove_access_pages(first, count);
            }
            PageMode::ZeroReadOnly => {
                clear_range(&mut self.chunks, start, end);
                self.page_map.update_pages(first, count, PageAccess::ReadOnly);
            }
            PageMode::ZeroReadWrite => {
                clear_range(&mut self.chunks, start, end);
                self.page_map.update_pages(first, count, PageAccess::ReadWrite);
            }
            PageMode::ReadOnly => self.page_map.update_pages(first, count, PageAccess::ReadOnly),
            PageMode::ReadWrite => self.page_map.update_pages(first, count, PageAccess::ReadWrite),
        }
    }

    /// Whether every page of the range has some access.
    pub fn pages_mapped(&self, first: u32, count: u32) -> bool {
        (0..count).all(|i| self.page_map.is_page_readable(first.wrapping_add(i)))
    }
}

impl Memory for GeneralMemory {
    fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.page_map
            .check_readable(address, buf.len() as u64)
            .map_err(MemoryError::NotReadable)?;

        buf.fill(0);
        for (start, offset, len) in wrapping_segments(address, buf.len()) {
            let seg_start = u64::from(start);
            let seg_end = seg_start + len as u64;
            let first = self.chunks.partition_point(|chunk| chunk.end() <= seg_start);
            for chunk in self.chunks[first..]
                .iter()
                .take_while(|chunk| u64::from(chunk.start) < seg_end)
            {
                let from = seg_start.max(u64::from(chunk.start));
                let to = seg_end.min(chunk.end());
                let src = (from - u64::from(chunk.start)) as usize;
                let dst = offset + (from - seg_start) as usize;
                let n = (to - from) as usize;
                buf[dst..dst + n].copy_from_slice(&chunk.data[src..src + n]);
            }
        }
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.page_map
            .check_writable(address, data.len() as u64)
            .map_err(MemoryError::NotWritable)?;

        for (start, offset, len) in wrapping_segments(address, data.len()) {
            merge_chunk(&mut self.chunks, start, &data[offset..offset + len]);
        }
        Ok(())
    }

    /// Map `increment` bytes of fresh read-write pages in the first gap at or
    /// above the reserved zone. An increment of 0 reports where the next
    /// single page would go.
    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError> {
        let pages = (align_to_page(u64::from(increment)) / u64::from(PAGE_SIZE)) as u32;
        let page = self
            .page_map
            .find_gap(pages.max(1), FIRST_HEAP_PAGE)
            .ok_or_else(|| {
                debug!(increment, "no gap for sbrk");
                MemoryError::OutOfMemory(0)
            })?;
        if pages > 0 {
            self.page_map.update_pages(page, pages, PageAccess::ReadWrite);
        }
        Ok(page * PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk(start: u32, data: &[u8]) -> Chunk {
        Chunk {
            start,
            data: data.to_vec(),
        }
    }

    #[test]
    fn disjoint_writes_stay_apart() {
        let mut chunks = Vec::new();
        merge_chunk(&mut chunks, 10, &[1, 2]);
        merge_chunk(&mut chunks, 0, &[9]);
        assert_eq!(chunks, vec![chunk(0, &[9]), chunk(10, &[1, 2])]);
    }

    #[test]
    fn bridging_write_merges_both_neighbours() {
        let mut chunks = vec![chunk(0, &[1, 1]), chunk(6, &[2, 2])];
        merge_chunk(&mut chunks, 1, &[7; 5]);
        assert_eq!(chunks, vec![chunk(0, &[1, 7, 7, 7, 7, 7, 2, 2])]);
    }

    #[test]
    fn write_ending_at_chunk_start_joins_only_that_chunk() {
        let mut chunks = vec![chunk(0, &[1, 1]), chunk(6, &[2, 2])];
        merge_chunk(&mut chunks, 4, &[5, 5]);
        assert_eq!(chunks, vec![chunk(0, &[1, 1]), chunk(4, &[5, 5, 2, 2])]);

        merge_chunk(&mut chunks, 2, &[3]);
        assert_eq!(chunks, vec![chunk(0, &[1, 1, 3]), chunk(4, &[5, 5, 2, 2])]);
    }

    #[test]
    fn abutting_writes_merge() {
        let mut chunks = vec![chunk(4, &[1, 2])];
        merge_chunk(&mut chunks, 6, &[3]);
        merge_chunk(&mut chunks, 2, &[5, 6]);
        assert_eq!(chunks, vec![chunk(2, &[5, 6, 1, 2, 3])]);
    }

    #[test]
    fn clear_splits_chunks() {
        let mut chunks = vec![chunk(0, &[1, 2, 3, 4, 5])];
        clear_range(&mut chunks, 1, 3);
        assert_eq!(chunks, vec![chunk(0, &[1]), chunk(3, &[4, 5])]);
    }

    #[test]
    fn page_modes() {
        let mut memory = GeneralMemory::new();
        memory.set_pages(16, 1, PageMode::ZeroReadWrite);
        memory.write(0x1_0000, b"hello").unwrap();

        memory.set_pages(16, 1, PageMode::ReadOnly);
        assert_eq!(memory.read_vec(0x1_0000, 5).unwrap(), b"hello");
        assert_eq!(
            memory.write(0x1_0000, b"x"),
            Err(MemoryError::NotWritable(0x1_0000))
        );

        memory.set_pages(16, 1, PageMode::ZeroReadOnly);
        assert_eq!(memory.read_vec(0x1_0000, 5).unwrap(), vec![0; 5]);

        memory.set_pages(16, 1, PageMode::Void);
        assert!(!memory.pages_mapped(16, 1));
        assert_eq!(
            memory.read_vec(0x1_0000, 1),
            Err(MemoryError::NotReadable(0x1_0000))
        );
        assert_eq!(PageMode::try_from(5), Err(5));
    }

    #[test]
    fn write_across_the_top_wraps() {
        let mut memory = GeneralMemory::new();
        memory.set_pages(0, 1, PageMode::ZeroReadWrite);
        memory.set_pages(pvm_common::layout::PAGE_COUNT - 1, 1, PageMode::ZeroReadWrite);
        memory.write(u32::MAX - 1, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read_vec(u32::MAX - 1, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(memory.chunks().len(), 2);
    }

    #[test]
    fn sbrk_fills_first_gap() {
        let mut memory = GeneralMemory::new();
        memory.set_pages(17, 1, PageMode::ZeroReadWrite);

        assert_eq!(memory.sbrk(0).unwrap(), 0x1_0000);
        assert_eq!(memory.sbrk(100).unwrap(), 0x1_0000);
        assert!(memory.is_writable(0x1_0000, 4096));
        // pages 16 and 17 are now taken
        assert_eq!(memory.sbrk(8192).unwrap(), 18 * 4096);
        assert!(memory.is_writable(18 * 4096, 8192));
    }

    proptest! {
        /// Chunks stay sorted and separated, and reads match a flat model.
        #[test]
        fn chunks_match_flat_model(
            writes in prop::collection::vec((0u32..200, prop::collection::vec(any::<u8>(), 1..20)), 1..30),
        ) {
            let mut memory = GeneralMemory::new();
            memory.set_pages(0, 1, PageMode::ZeroReadWrite);
            let mut model = vec![0u8; 256];
            for (start, bytes) in &writes {
                memory.write(*start, bytes).unwrap();
                model[*start as usize..*start as usize + bytes.len()].copy_from_slice(bytes);
            }
            for pair in memory.chunks().windows(2) {
                prop_assert!(pair[0].end() < u64::from(pair[1].start));
            }
            prop_assert_eq!(memory.read_vec(0, 256).unwrap(), model);
        }
    }
}
