//! Errors raised by the memory subsystem and the invocation entry points.
//!
//! Guest misbehaviour is never an error at the API level: the engine turns
//! every [`MemoryError`] an instruction raises into an
//! [`ExitReason`](crate::exit::ExitReason). These types surface only to
//! embedders calling memory or setup functions directly.

use pvm_common::ProgramError;
use thiserror::Error;

/// Errors from reading, writing or resizing guest memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Part of the range is not mapped readable.
    #[error("address {0:#010x} is not readable")]
    NotReadable(u32),

    /// Part of the range is not mapped writable.
    #[error("address {0:#010x} is not writable")]
    NotWritable(u32),

    /// Instructions may not touch the lowest zone of the address space.
    #[error("address {0:#010x} is in the reserved zone")]
    ReservedAddress(u32),

    /// The heap cannot grow by the requested amount.
    #[error("out of memory growing the heap from {0:#010x}")]
    OutOfMemory(u32),

    /// The invocation argument does not fit the argument zone.
    #[error("argument of {0} bytes exceeds the argument zone")]
    ArgumentTooLarge(usize),
}

impl MemoryError {
    /// The faulting address, for errors the guest can recover from by having
    /// the embedder map the page.
    pub fn fault_address(&self) -> Option<u32> {
        match self {
            MemoryError::NotReadable(address) | MemoryError::NotWritable(address) => Some(*address),
            MemoryError::ReservedAddress(_)
            | MemoryError::OutOfMemory(_)
            | MemoryError::ArgumentTooLarge(_) => None,
        }
    }
}

/// Errors from setting up an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("invalid program blob: {0}")]
    Program(#[from] ProgramError),

    #[error("invalid initial memory: {0}")]
    Memory(#[from] MemoryError),
}

/// Errors from managing inner machines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InnerError {
    /// No machine is registered under this id.
    #[error("no inner machine with id {0}")]
    UnknownMachine(u64),

    /// An inner-memory access touched an inaccessible page.
    #[error("inner machine memory access out of bounds: {0}")]
    OutOfBounds(#[source] MemoryError),

    /// A page request used an unknown mode or a reserved page range.
    #[error("invalid page request: mode {mode}, pages {page}+{count}")]
    InvalidPageRequest { mode: u64, page: u32, count: u32 },

    /// The code handed to a new machine is not a valid program blob.
    #[error("invalid inner program: {0}")]
    InvalidCode(#[from] ProgramError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            MemoryError::NotReadable(0x1_0000).to_string(),
            "address 0x00010000 is not readable"
        );
        assert_eq!(
            InnerError::UnknownMachine(3).to_string(),
            "no inner machine with id 3"
        );
        assert_eq!(
            InvokeError::from(ProgramError::InvalidCodeLength).to_string(),
            "invalid program blob: invalid code length"
        );
    }

    #[test]
    fn only_access_errors_have_fault_addresses() {
        assert_eq!(MemoryError::NotWritable(0x2_0000).fault_address(), Some(0x2_0000));
        assert_eq!(MemoryError::ReservedAddress(4).fault_address(), None);
        assert_eq!(MemoryError::OutOfMemory(0).fault_address(), None);
    }
}
