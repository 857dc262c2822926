//! Memory of a standard program.
//!
//! ```text
//! 0 ............ ZZ                reserved
//! ZZ ........... ZZ + P(ro)        read-only data            (read-only)
//! 2ZZ + Z(ro) .. heap end          read-write data, heap     (read-write)
//! S - P(stack) . S                 stack                     (read-write)
//! S + ZZ ....... S + ZZ + P(arg)   argument                  (read-only)
//! ```
//!
//! `S` is [`STACK_BASE`]; `P` and `Z` round up to pages and zones. The heap
//! grows upwards with [`Memory::sbrk`] until it would reach the stack.

use pvm_common::layout::{
    align_to_page, align_to_zone, INPUT_SIZE, INPUT_START, STACK_BASE, ZONE_SIZE,
};
use pvm_common::StandardProgramBlob;
use tracing::debug;

use super::page_map::{PageAccess, PageMap};
use super::Memory;
use crate::error::MemoryError;

/// A contiguous region. `data` may be shorter than the region; the rest
/// reads as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Zone {
    start: u32,
    end: u32,
    data: Vec<u8>,
}

impl Zone {
    fn new(start: u32, len: u64, data: Vec<u8>) -> Self {
        Self {
            start,
            end: (u64::from(start) + len) as u32,
            data,
        }
    }

    fn contains(&self, address: u32) -> bool {
        self.start <= address && address < self.end
    }

    fn read(&self, address: u32, buf: &mut [u8]) {
        let offset = (address - self.start) as usize;
        let stored = self.data.len().saturating_sub(offset).min(buf.len());
        buf[..stored].copy_from_slice(&self.data[offset..offset + stored]);
        buf[stored..].fill(0);
    }

    fn write(&mut self, address: u32, bytes: &[u8]) {
        let offset = (address - self.start) as usize;
        if self.data.len() < offset + bytes.len() {
            self.data.resize(offset + bytes.len(), 0);
        }
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

#[derive(Debug, Clone)]
pub struct StandardMemory {
    page_map: PageMap,
    read_only: Zone,
    heap: Zone,
    stack: Zone,
    argument: Zone,
    heap_end: u32,
}

impl StandardMemory {
    /// Lay out memory for `blob` invoked with `argument`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ArgumentTooLarge`] if the argument exceeds the
    /// argument zone, [`MemoryError::OutOfMemory`] if the heap would overlap
    /// the stack.
    pub fn new(blob: &StandardProgramBlob, argument: &[u8]) -> Result<Self, MemoryError> {
        Self::with_page_map(blob, argument, PageMap::new())
    }

    /// Like [`StandardMemory::new`], recording permissions in `page_map`.
    pub fn with_page_map(
        blob: &StandardProgramBlob,
        argument: &[u8],
        mut page_map: PageMap,
    ) -> Result<Self, MemoryError> {
        if argument.len() > INPUT_SIZE as usize {
            return Err(MemoryError::ArgumentTooLarge(argument.len()));
        }

        let read_only_len = align_to_page(blob.read_only.len() as u64);
        let read_only = Zone::new(ZONE_SIZE, read_only_len, blob.read_only.clone());

        let heap_start = 2 * u64::from(ZONE_SIZE) + align_to_zone(blob.read_only.len() as u64);
        let heap_len = blob.initial_heap_len();
        let stack_len = align_to_page(u64::from(blob.stack_size));
        let stack_start = u64::from(STACK_BASE) - stack_len;
        if heap_start + heap_len > stack_start {
            debug!(heap_start, heap_len, stack_start, "heap overlaps the stack");
            return Err(MemoryError::OutOfMemory(heap_start as u32));
        }
        let heap = Zone::new(heap_start as u32, heap_len, blob.read_write.clone());
        let stack = Zone::new(stack_start as u32, stack_len, Vec::new());

        let argument_len = align_to_page(argument.len() as u64);
        let argument = Zone::new(INPUT_START, argument_len, argument.to_vec());

        page_map.update(read_only.start, read_only_len, PageAccess::ReadOnly);
        page_map.update(heap.start, heap_len, PageAccess::ReadWrite);
        page_map.update(stack.start, stack_len, PageAccess::ReadWrite);
        page_map.update(argument.start, argument_len, PageAccess::ReadOnly);

        Ok(Self {
            page_map,
            heap_end: heap.end,
            read_only,
            heap,
            stack,
            argument,
        })
    }

    /// Current end of the heap, the address the next `sbrk` returns.
    pub fn heap_end(&self) -> u32 {
        self.heap_end
    }

    fn zones(&self) -> [&Zone; 4] {
        [&self.read_only, &self.heap, &self.stack, &self.argument]
    }

    fn zone_mut(&mut self, address: u32) -> Option<&mut Zone> {
        [
            &mut self.read_only,
            &mut self.heap,
            &mut self.stack,
            &mut self.argument,
        ]
        .into_iter()
        .find(|zone| zone.contains(address))
    }
}

impl Memory for StandardMemory {
    fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.page_map
            .check_readable(address, buf.len() as u64)
            .map_err(MemoryError::NotReadable)?;

        let mut done = 0;
        while done < buf.len() {
            let at = address.wrapping_add(done as u32);
            let zone = self
                .zones()
                .into_iter()
                .find(|zone| zone.contains(at))
                .ok_or(MemoryError::NotReadable(at))?;
            let n = (buf.len() - done).min((zone.end - at) as usize);
            zone.read(at, &mut buf[done..done + n]);
            done += n;
        }
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.page_map
            .check_writable(address, data.len() as u64)
            .map_err(MemoryError::NotWritable)?;

        let mut done = 0;
        while done < data.len() {
            let at = address.wrapping_add(done as u32);
            let zone = self.zone_mut(at).ok_or(MemoryError::NotWritable(at))?;
            let n = (data.len() - done).min((zone.end - at) as usize);
            zone.write(at, &data[done..done + n]);
            done += n;
        }
        Ok(())
    }

    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError> {
        let previous = self.heap_end;
        if increment == 0 {
            return Ok(previous);
        }

        let new_end = u64::from(previous) + u64::from(increment);
        let mapped_end = align_to_page(new_end);
        if mapped_end > u64::from(self.stack.start) {
            debug!(previous, increment, "sbrk would collide with the stack");
            return Err(MemoryError::OutOfMemory(previous));
        }

        let mapped_from = u64::from(self.heap.end);
        if mapped_end > mapped_from {
            self.page_map.update(
                mapped_from as u32,
                mapped_end - mapped_from,
                PageAccess::ReadWrite,
            );
            self.heap.end = mapped_end as u32;
        }
        self.heap_end = new_end as u32;
        Ok(previous)
    }
}
