//! Machine state: program counter, registers, gas and memory.

use pvm_common::layout::ZONE_SIZE;
use pvm_common::ProgramCode;

use crate::error::MemoryError;
use crate::gas::Gas;
use crate::memory::Memory;
use crate::registers::Registers;

/// Everything an invocation mutates. Owned by exactly one caller; there is
/// no shared or global state, so states of different machines never alias.
#[derive(Debug, Clone)]
pub struct VmState<M: Memory> {
    pub(crate) pc: u32,
    pub(crate) registers: Registers,
    pub(crate) gas: Gas,
    pub(crate) memory: M,
}

impl<M: Memory> VmState<M> {
    pub fn new(pc: u32, registers: Registers, gas: Gas, memory: M) -> Self {
        Self {
            pc,
            registers,
            gas,
            memory,
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn gas(&self) -> Gas {
        self.gas
    }

    pub fn gas_mut(&mut self) -> &mut Gas {
        &mut self.gas
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_memory(self) -> M {
        self.memory
    }

    /// Split into `(pc, registers, gas, memory)`.
    pub fn into_parts(self) -> (u32, Registers, Gas, M) {
        (self.pc, self.registers, self.gas, self.memory)
    }

    /// Move `pc` past the `ecalli` it stopped on, so execution resumes at the
    /// following instruction.
    pub fn skip_host_call(&mut self, program: &ProgramCode) {
        self.pc = self.pc.wrapping_add(program.skip(self.pc) + 1);
    }

    /// Guest load. Addresses in the reserved lowest zone are refused before
    /// memory is consulted.
    pub(crate) fn load(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        if address < ZONE_SIZE {
            return Err(MemoryError::ReservedAddress(address));
        }
        self.memory.read(address, buf)
    }

    pub(crate) fn store(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        if address < ZONE_SIZE {
            return Err(MemoryError::ReservedAddress(address));
        }
        self.memory.write(address, data)
    }
}
