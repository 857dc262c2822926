//! Nested machines managed by a host.
//!
//! A guest with the right host calls can create further machines, each with
//! its own code, [`GeneralMemory`] and `pc`, and run them for a gas budget.
//! The registry here implements those operations on top of [`Engine`];
//! wiring them to host-call indices is left to the embedder.

use std::collections::HashMap;

use pvm_common::layout::{PAGE_COUNT, PAGE_SIZE, ZONE_SIZE};
use pvm_common::ProgramCode;
use tracing::debug;

use crate::engine::Engine;
use crate::error::InnerError;
use crate::exit::ExitReason;
use crate::gas::Gas;
use crate::memory::{GeneralMemory, Memory, PageMap, PageMode};
use crate::registers::Registers;
use crate::state::VmState;

const FIRST_USER_PAGE: u32 = ZONE_SIZE / PAGE_SIZE;

#[derive(Debug, Clone)]
struct InnerMachine {
    program: ProgramCode,
    memory: GeneralMemory,
    pc: u32,
}

/// Outcome of running an inner machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerInvocation {
    pub exit: ExitReason,
    pub gas: Gas,
    pub registers: Registers,
}

#[derive(Debug, Clone, Default)]
pub struct InnerMachines {
    machines: HashMap<u64, InnerMachine>,
    cache_capacity: Option<usize>,
}

impl InnerMachines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose machines memoise `capacity` page-access checks.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            machines: HashMap::new(),
            cache_capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.machines.contains_key(&id)
    }

    /// Register a machine running `code` from `pc` with empty memory. Ids are
    /// the lowest not in use.
    pub fn create(&mut self, code: &[u8], pc: u32) -> Result<u64, InnerError> {
        let program = ProgramCode::parse(code)?;
        let id = (0u64..)
            .find(|id| !self.machines.contains_key(id))
            .unwrap_or_default();
        let memory = match self.cache_capacity {
            Some(capacity) => GeneralMemory::with_page_map(PageMap::with_cache_capacity(capacity)),
            None => GeneralMemory::new(),
        };
        self.machines.insert(
            id,
            InnerMachine {
                program,
                memory,
                pc,
            },
        );
        debug!(id, pc, "created inner machine");
        Ok(id)
    }

    /// Copy `length` bytes out of machine `id`'s memory.
    pub fn peek(&self, id: u64, address: u32, length: usize) -> Result<Vec<u8>, InnerError> {
        self.machine(id)?
            .memory
            .read_vec(address, length)
            .map_err(InnerError::OutOfBounds)
    }

    /// Copy `data` into machine `id`'s memory. The range must be writable.
    pub fn poke(&mut self, id: u64, address: u32, data: &[u8]) -> Result<(), InnerError> {
        self.machine_mut(id)?
            .memory
            .write(address, data)
            .map_err(InnerError::OutOfBounds)
    }

    /// Change access to `count` pages from `page` according to `mode`
    /// (see [`PageMode`]). Pages below the reserved zone cannot be touched,
    /// and modes that keep contents need the pages mapped already.
    pub fn pages(&mut self, id: u64, page: u32, count: u32, mode: u64) -> Result<(), InnerError> {
        let machine = self.machine_mut(id)?;
        let invalid = InnerError::InvalidPageRequest { mode, page, count };
        let mode = PageMode::try_from(mode).map_err(|_| invalid.clone())?;
        if page < FIRST_USER_PAGE || u64::from(page) + u64::from(count) > u64::from(PAGE_COUNT) {
            return Err(invalid);
        }
        if mode.keeps_contents() && !machine.memory.pages_mapped(page, count) {
            return Err(invalid);
        }
        machine.memory.set_pages(page, count, mode);
        Ok(())
    }

    /// Run machine `id` from its stored `pc`.
    ///
    /// After a host call the stored `pc` points past the `ecalli`, so the
    /// next invocation resumes there. Every other exit leaves it where the
    /// machine stopped.
    pub fn invoke(
        &mut self,
        id: u64,
        gas: Gas,
        registers: Registers,
    ) -> Result<InnerInvocation, InnerError> {
        let machine = self.machine_mut(id)?;
        let memory = std::mem::take(&mut machine.memory);
        let mut state = VmState::new(machine.pc, registers, gas, memory);

        let exit = Engine::run(&machine.program, &mut state);
        if let ExitReason::HostCall(_) = exit {
            state.skip_host_call(&machine.program);
        }
        debug!(id, %exit, pc = state.pc(), "inner machine stopped");

        let (pc, registers, gas, memory) = state.into_parts();
        machine.pc = pc;
        machine.memory = memory;
        Ok(InnerInvocation {
            exit,
            gas,
            registers,
        })
    }

    /// Remove machine `id`, returning its final `pc`.
    pub fn expunge(&mut self, id: u64) -> Result<u32, InnerError> {
        let machine = self
            .machines
            .remove(&id)
            .ok_or(InnerError::UnknownMachine(id))?;
        debug!(id, pc = machine.pc, "expunged inner machine");
        Ok(machine.pc)
    }

    fn machine(&self, id: u64) -> Result<&InnerMachine, InnerError> {
        self.machines.get(&id).ok_or(InnerError::UnknownMachine(id))
    }

    fn machine_mut(&mut self, id: u64) -> Result<&mut InnerMachine, InnerError> {
        self.machines
            .get_mut(&id)
            .ok_or(InnerError::UnknownMachine(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use crate::exit::PanicReason;
    use pvm_common::{Args, Instruction, Opcode, ProgramBuilder, Reg};

    fn reg(n: u8) -> Reg {
        Reg::new(n).unwrap()
    }

    /// r1 = 5; ecalli 3; r2 = r1 + r1; trap
    fn program() -> Vec<u8> {
        let mut builder = ProgramBuilder::new();
        builder.push(Instruction::new(Opcode::LoadImm, Args::RegImm { reg: reg(1), imm: 5 }));
        builder.push(Instruction::new(Opcode::Ecalli, Args::Imm { imm: 3 }));
        builder.push(Instruction::new(
            Opcode::Add64,
            Args::ThreeReg { ra: reg(1), rb: reg(1), rd: reg(2) },
        ));
        builder.push(Instruction::bare(Opcode::Trap));
        builder.build().encode()
    }

    #[test]
    fn ids_reuse_lowest_free() {
        let mut machines = InnerMachines::new();
        assert_eq!(machines.create(&program(), 0).unwrap(), 0);
        assert_eq!(machines.create(&program(), 0).unwrap(), 1);
        assert_eq!(machines.expunge(0).unwrap(), 0);
        assert_eq!(machines.create(&program(), 0).unwrap(), 0);
        assert_eq!(machines.len(), 2);
    }

    #[test]
    fn invalid_code_is_rejected() {
        let mut machines = InnerMachines::new();
        assert!(matches!(
            machines.create(&[0xFF], 0),
            Err(InnerError::InvalidCode(_))
        ));
        assert!(machines.is_empty());
    }

    #[test]
    fn host_call_resumes_after_ecalli() {
        let mut machines = InnerMachines::new();
        let id = machines.create(&program(), 0).unwrap();

        let first = machines.invoke(id, Gas::new(100), Registers::default()).unwrap();
        assert_eq!(first.exit, ExitReason::HostCall(3));
        assert_eq!(first.gas, Gas::new(98));
        assert_eq!(first.registers.by_index(1), Some(5));

        let second = machines.invoke(id, Gas::new(100), first.registers).unwrap();
        assert_eq!(second.exit, ExitReason::Panic(PanicReason::Trap));
        assert_eq!(second.registers.by_index(2), Some(10));
        assert_eq!(second.gas, Gas::new(98));
    }

    #[test]
    fn memory_operations() {
        let mut machines = InnerMachines::new();
        let id = machines.create(&program(), 0).unwrap();

        assert_eq!(
            machines.poke(id, 0x1_0000, b"hi"),
            Err(InnerError::OutOfBounds(MemoryError::NotWritable(0x1_0000)))
        );
        machines.pages(id, 16, 2, 2).unwrap();
        machines.poke(id, 0x1_0FFF, b"hi").unwrap();
        assert_eq!(machines.peek(id, 0x1_0FFF, 2).unwrap(), b"hi");

        machines.pages(id, 16, 2, 3).unwrap();
        assert!(machines.poke(id, 0x1_0000, b"x").is_err());
        assert_eq!(machines.peek(id, 0x1_0FFF, 2).unwrap(), b"hi");

        machines.pages(id, 16, 2, 0).unwrap();
        assert!(machines.peek(id, 0x1_0FFF, 2).is_err());
    }

    #[test]
    fn invalid_page_requests() {
        let mut machines = InnerMachines::new();
        let id = machines.create(&program(), 0).unwrap();
        let invalid = |mode, page, count| InnerError::InvalidPageRequest { mode, page, count };

        assert_eq!(machines.pages(id, 16, 1, 5), Err(invalid(5, 16, 1)));
        assert_eq!(machines.pages(id, 15, 1, 2), Err(invalid(2, 15, 1)));
        assert_eq!(
            machines.pages(id, PAGE_COUNT - 1, 2, 2),
            Err(invalid(2, PAGE_COUNT - 1, 2))
        );
        // keeping contents requires mapped pages
        assert_eq!(machines.pages(id, 16, 1, 4), Err(invalid(4, 16, 1)));
        assert_eq!(machines.pages(9, 16, 1, 2), Err(InnerError::UnknownMachine(9)));
    }
}
