//! The fetch-execute loop and the standard-program entry point.

use pvm_common::{ProgramCode, StandardProgramBlob};
use tracing::debug;

use crate::config::PvmConfig;
use crate::error::InvokeError;
use crate::execute::step;
use crate::exit::{ExecOutcome, ExitReason};
use crate::gas::Gas;
use crate::host::{InvocationContext, NoHostCalls};
use crate::memory::{Memory, PageMap, StandardMemory};
use crate::registers::Registers;
use crate::state::VmState;

/// Drives a [`VmState`] through a program.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine;

impl Engine {
    /// Step until the machine exits. Host calls end the run; the caller may
    /// service one, call [`VmState::skip_host_call`] and run again.
    pub fn run<M: Memory>(program: &ProgramCode, state: &mut VmState<M>) -> ExitReason {
        Self::run_with(program, state, &mut NoHostCalls)
    }

    /// Step until the machine exits, handing each host call to `ctx`.
    pub fn run_with<M, C>(program: &ProgramCode, state: &mut VmState<M>, ctx: &mut C) -> ExitReason
    where
        M: Memory,
        C: InvocationContext<M> + ?Sized,
    {
        loop {
            match step(program, state) {
                ExecOutcome::Continue => {}
                ExecOutcome::Exit(ExitReason::HostCall(index)) => {
                    debug!(index, pc = state.pc(), gas = state.gas().value(), "host call");
                    match ctx.dispatch(index, state) {
                        ExecOutcome::Continue => state.skip_host_call(program),
                        ExecOutcome::Exit(reason) => {
                            debug!(%reason, pc = state.pc(), "host ended invocation");
                            return reason;
                        }
                    }
                }
                ExecOutcome::Exit(reason) => {
                    debug!(%reason, pc = state.pc(), gas = state.gas().value(), "exit");
                    return reason;
                }
            }
        }
    }
}

/// Result of [`invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub exit: ExitReason,
    /// Gas left when the machine stopped.
    pub gas: Gas,
    /// Bytes at `(r7, r8)` after a halt, if that range is readable.
    pub output: Option<Vec<u8>>,
    pub registers: Registers,
}

/// Run a standard program blob from `pc` with `gas` and `argument`.
///
/// # Errors
///
/// Fails if the blob does not parse or its memory cannot be laid out. Guest
/// behaviour never produces an error; it is reported in
/// [`Invocation::exit`].
pub fn invoke<C>(
    blob: &[u8],
    pc: u32,
    gas: u64,
    argument: &[u8],
    ctx: &mut C,
) -> Result<Invocation, InvokeError>
where
    C: InvocationContext<StandardMemory> + ?Sized,
{
    let config = PvmConfig {
        gas,
        pc,
        ..PvmConfig::default()
    };
    invoke_with_config(&config, blob, argument, ctx)
}

/// [`invoke`] with entry point, gas and cache size taken from `config`.
pub fn invoke_with_config<C>(
    config: &PvmConfig,
    blob: &[u8],
    argument: &[u8],
    ctx: &mut C,
) -> Result<Invocation, InvokeError>
where
    C: InvocationContext<StandardMemory> + ?Sized,
{
    let blob = StandardProgramBlob::parse(blob)?;
    let page_map = PageMap::with_cache_capacity(config.access_cache_capacity);
    let memory = StandardMemory::with_page_map(&blob, argument, page_map)?;
    let registers = Registers::standard(argument.len() as u32);
    let mut state = VmState::new(config.pc, registers, Gas::from(config.gas), memory);

    let exit = Engine::run_with(&blob.program, &mut state, ctx);
    let output = match exit {
        ExitReason::Halt => read_output(&state),
        _ => None,
    };
    Ok(Invocation {
        exit,
        gas: state.gas(),
        output,
        registers: *state.registers(),
    })
}

fn read_output<M: Memory>(state: &VmState<M>) -> Option<Vec<u8>> {
    let registers = state.registers();
    let address = u32::try_from(registers.by_index(7)?).ok()?;
    let length = usize::try_from(registers.by_index(8)?).ok()?;
    state.memory().read_vec(address, length).ok()
}
