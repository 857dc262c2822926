//! The boundary between guest code and the embedder.
//!
//! `ecalli n` stops execution with [`ExitReason::HostCall`] and leaves `pc`
//! on the `ecalli`. The embedder services the call by inspecting and mutating
//! the [`VmState`], then resumes after [`VmState::skip_host_call`].
//! [`InvocationContext`] packages that loop for embedders that service calls
//! inline.
//!
//! [`ExitReason::HostCall`]: crate::exit::ExitReason::HostCall

use crate::exit::ExecOutcome;
use crate::memory::Memory;
use crate::state::VmState;

/// Services host calls raised by a running machine.
pub trait InvocationContext<M: Memory> {
    /// Handle host call `index`. Returning [`ExecOutcome::Continue`] resumes
    /// the guest after the `ecalli`; [`ExecOutcome::Exit`] ends the
    /// invocation with that reason.
    fn dispatch(&mut self, index: u32, state: &mut VmState<M>) -> ExecOutcome;
}

impl<M, F> InvocationContext<M> for F
where
    M: Memory,
    F: FnMut(u32, &mut VmState<M>) -> ExecOutcome,
{
    fn dispatch(&mut self, index: u32, state: &mut VmState<M>) -> ExecOutcome {
        self(index, state)
    }
}

/// Context that ends the invocation at the first host call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHostCalls;

impl<M: Memory> InvocationContext<M> for NoHostCalls {
    fn dispatch(&mut self, index: u32, _state: &mut VmState<M>) -> ExecOutcome {
        ExecOutcome::Exit(crate::exit::ExitReason::HostCall(index))
    }
}
