//! How an invocation stops.

use std::fmt;

/// Why the machine panicked. Panics are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanicReason {
    /// `trap`, a fetch past the end of the code, or an illegal memory access.
    Trap,
    /// The byte at `pc` is not an assigned opcode.
    InvalidInstructionIndex,
    /// A dynamic jump address failed validation.
    InvalidDynamicJump,
    /// A static branch or jump target is not the start of a basic block.
    InvalidBranch,
}

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    Halt,
    Panic(PanicReason),
    OutOfGas,
    /// `ecalli` with this index; `pc` still points at the `ecalli`.
    HostCall(u32),
    /// An access touched an inaccessible page; `pc` still points at the
    /// faulting instruction.
    PageFault(u32),
}

/// Result of executing one instruction or one host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Continue,
    Exit(ExitReason),
}

impl fmt::Display for PanicReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PanicReason::Trap => "trap",
            PanicReason::InvalidInstructionIndex => "invalid instruction index",
            PanicReason::InvalidDynamicJump => "invalid dynamic jump",
            PanicReason::InvalidBranch => "invalid branch",
        };
        f.write_str(text)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Halt => write!(f, "halt"),
            ExitReason::Panic(reason) => write!(f, "panic ({reason})"),
            ExitReason::OutOfGas => write!(f, "out of gas"),
            ExitReason::HostCall(index) => write!(f, "host call {index}"),
            ExitReason::PageFault(address) => write!(f, "page fault at {address:#010x}"),
        }
    }
}
