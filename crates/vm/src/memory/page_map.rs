//! Per-page access permissions with a small access-check cache.
//!
//! Pages are tracked in two bitsets, one bit per page of the 32-bit address
//! space. A page mapped read-write has both bits set. Access checks over a
//! range are memoised in an LRU cache keyed by `(first page, page count,
//! access kind)`; every mutation clears it.

use std::cell::RefCell;
use std::collections::VecDeque;

use pvm_common::layout::{PAGE_COUNT, PAGE_SIZE};

/// Default number of memoised access checks.
pub const DEFAULT_CACHE_CAPACITY: usize = 8;

/// Access granted to a mapped page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageAccess {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AccessKind {
    Read,
    Write,
}

type CacheKey = (u32, u32, AccessKind);

/// Most recently used entries sit at the front.
#[derive(Debug, Clone)]
struct AccessCache {
    capacity: usize,
    entries: VecDeque<(CacheKey, Option<u32>)>,
}

impl AccessCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    fn get(&mut self, key: CacheKey) -> Option<Option<u32>> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(pos)?;
        self.entries.push_front(entry);
        Some(entry.1)
    }

    fn insert(&mut self, key: CacheKey, value: Option<u32>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((key, value));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Readable and writable page bitsets.
#[derive(Debug, Clone)]
pub struct PageMap {
    readable: Vec<u64>,
    writable: Vec<u64>,
    cache: RefCell<AccessCache>,
}

impl Default for PageMap {
    fn default() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

fn get_bit(bits: &[u64], page: u32) -> bool {
    bits.get(page as usize / 64)
        .is_some_and(|word| (word >> (page % 64)) & 1 == 1)
}

fn set_bit(bits: &mut Vec<u64>, page: u32, value: bool) {
    let word = page as usize / 64;
    if word >= bits.len() {
        if !value {
            return;
        }
        bits.resize(word + 1, 0);
    }
    if value {
        bits[word] |= 1 << (page % 64);
    } else {
        bits[word] &= !(1 << (page % 64));
    }
}

/// Pages touched by `length` bytes starting at `address`, as
/// `(first page, count)`. The count is clamped to the whole address space.
pub fn page_span(address: u32, length: u64) -> (u32, u32) {
    let first = address / PAGE_SIZE;
    if length == 0 {
        return (first, 0);
    }
    let last = (u64::from(address) + length - 1) / u64::from(PAGE_SIZE);
    let count = (last - u64::from(first) + 1).min(u64::from(PAGE_COUNT));
    (first, count as u32)
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page map memoising up to `capacity` access checks; 0 disables the cache.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            readable: Vec::new(),
            writable: Vec::new(),
            cache: RefCell::new(AccessCache::new(capacity)),
        }
    }

    /// Grant `access` to every page overlapping `[address, address + length)`.
    pub fn update(&mut self, address: u32, length: u64, access: PageAccess) {
        let (first, count) = page_span(address, length);
        self.update_pages(first, count, access);
    }

    /// Grant `access` to `count` pages starting at page `first`.
    pub fn update_pages(&mut self, first: u32, count: u32, access: PageAccess) {
        for page in page_range(first, count) {
            set_bit(&mut self.readable, page, true);
            set_bit(&mut self.writable, page, access == PageAccess::ReadWrite);
        }
        self.cache.get_mut().clear();
    }

    /// Revoke all access to `count` pages starting at page `first`.
    pub fn remove_access_pages(&mut self, first: u32, count: u32) {
        for page in page_range(first, count) {
            set_bit(&mut self.readable, page, false);
            set_bit(&mut self.writable, page, false);
        }
        self.cache.get_mut().clear();
    }

    pub fn is_page_readable(&self, page: u32) -> bool {
        get_bit(&self.readable, page)
    }

    pub fn is_page_writable(&self, page: u32) -> bool {
        get_bit(&self.writable, page)
    }

    /// Whether every byte of the range is readable.
    pub fn is_readable(&self, address: u32, length: u64) -> bool {
        self.check_readable(address, length).is_ok()
    }

    /// Whether every byte of the range is writable.
    pub fn is_writable(&self, address: u32, length: u64) -> bool {
        self.check_writable(address, length).is_ok()
    }

    /// `Err` carries the first address that is not readable.
    pub fn check_readable(&self, address: u32, length: u64) -> Result<(), u32> {
        self.check(address, length, AccessKind::Read)
    }

    /// `Err` carries the first address that is not writable.
    pub fn check_writable(&self, address: u32, length: u64) -> Result<(), u32> {
        self.check(address, length, AccessKind::Write)
    }

    fn check(&self, address: u32, length: u64, kind: AccessKind) -> Result<(), u32> {
        if length > 1 << 32 {
            return Err(address);
        }
        let (first, count) = page_span(address, length);
        match self.first_denied_page(first, count, kind) {
            None => Ok(()),
            Some(page) if page == first => Err(address),
            Some(page) => Err(page * PAGE_SIZE),
        }
    }

    fn first_denied_page(&self, first: u32, count: u32, kind: AccessKind) -> Option<u32> {
        let key = (first, count, kind);
        if let Some(cached) = self.cache.borrow_mut().get(key) {
            return cached;
        }

        let bits = match kind {
            AccessKind::Read => &self.readable,
            AccessKind::Write => &self.writable,
        };
        let denied = page_range(first, count).find(|&page| !get_bit(bits, page));
        self.cache.borrow_mut().insert(key, denied);
        denied
    }

    /// First page at or after `from` that starts `count` consecutive
    /// unmapped pages, if the run fits below the top of the address space.
    pub fn find_gap(&self, count: u32, from: u32) -> Option<u32> {
        let mut run_start = from;
        let mut run_len = 0u32;
        for page in from..PAGE_COUNT {
            if run_len == count {
                break;
            }
            if self.is_page_readable(page) {
                run_start = page + 1;
                run_len = 0;
            } else {
                run_len += 1;
            }
        }
        (run_len == count && u64::from(run_start) + u64::from(count) <= u64::from(PAGE_COUNT))
            .then_some(run_start)
    }
}

/// `count` consecutive pages from `first`, wrapping at the top of the
/// address space.
fn page_range(first: u32, count: u32) -> impl Iterator<Item = u32> {
    (0..count).map(move |i| (first.wrapping_add(i)) % PAGE_COUNT)
}
