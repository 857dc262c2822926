//! PVM interpreter: executes parsed program blobs under a gas budget.
//!
//! The machine has:
//! - 13 64-bit registers and a signed gas counter
//! - a paged 32-bit address space, laid out either as a standard program
//!   ([`StandardMemory`]) or as free-form pages ([`GeneralMemory`])
//! - a host-call boundary where the embedder services `ecalli`
//!
//! Execution is deterministic: the same program, state and host responses
//! always produce the same exit, gas and memory.
//!
//! # Usage
//!
//! ```
//! use pvm_common::{Instruction, Opcode, ProgramBuilder};
//! use pvm_vm::{Engine, ExitReason, Gas, GeneralMemory, PanicReason, Registers, VmState};
//!
//! let mut builder = ProgramBuilder::new();
//! builder.push(Instruction::bare(Opcode::Fallthrough));
//! builder.push(Instruction::bare(Opcode::Trap));
//! let program = builder.build();
//!
//! let mut state = VmState::new(0, Registers::default(), Gas::new(10), GeneralMemory::new());
//! let exit = Engine::run(&program, &mut state);
//! assert_eq!(exit, ExitReason::Panic(PanicReason::Trap));
//! assert_eq!(state.gas(), Gas::new(8));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod execute;
pub mod exit;
pub mod gas;
pub mod host;
pub mod inner;
pub mod memory;
pub mod registers;
pub mod state;

pub use config::PvmConfig;
pub use engine::{invoke, invoke_with_config, Engine, Invocation};
pub use error::{InnerError, InvokeError, MemoryError};
pub use execute::step;
pub use exit::{ExecOutcome, ExitReason, PanicReason};
pub use gas::Gas;
pub use host::{InvocationContext, NoHostCalls};
pub use inner::{InnerInvocation, InnerMachines};
pub use memory::{GeneralMemory, Memory, PageAccess, PageMap, PageMode, StandardMemory};
pub use registers::Registers;
pub use state::VmState;
