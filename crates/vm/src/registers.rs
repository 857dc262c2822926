//! The 13 general-purpose 64-bit registers.

use std::ops::{Index, IndexMut};

use pvm_common::layout::{HALT_ADDRESS, INPUT_START, STACK_BASE};
use pvm_common::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers([u64; Reg::COUNT]);

impl Registers {
    /// Initial registers of a standard program receiving an argument of
    /// `argument_len` bytes: the halt address as return address, the stack
    /// pointer, and the argument's location.
    pub fn standard(argument_len: u32) -> Self {
        let mut regs = Self::default();
        regs.0[0] = u64::from(HALT_ADDRESS);
        regs.0[1] = u64::from(STACK_BASE);
        regs.0[7] = u64::from(INPUT_START);
        regs.0[8] = u64::from(argument_len);
        regs
    }

    pub fn get(&self, reg: Reg) -> u64 {
        self.0[reg.index()]
    }

    pub fn set(&mut self, reg: Reg, value: u64) {
        self.0[reg.index()] = value;
    }

    /// Register by raw index, for host-call ABIs.
    pub fn by_index(&self, index: usize) -> Option<u64> {
        self.0.get(index).copied()
    }

    pub fn values(&self) -> &[u64; Reg::COUNT] {
        &self.0
    }
}

impl Index<Reg> for Registers {
    type Output = u64;

    fn index(&self, reg: Reg) -> &u64 {
        &self.0[reg.index()]
    }
}

impl IndexMut<Reg> for Registers {
    fn index_mut(&mut self, reg: Reg) -> &mut u64 {
        &mut self.0[reg.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(n: u8) -> Reg {
        Reg::new(n).unwrap()
    }

    #[test]
    fn standard_initial_values() {
        let regs = Registers::standard(5);
        assert_eq!(regs.get(reg(0)), 0xFFFF_0000);
        assert_eq!(regs.get(reg(1)), 0xFEFE_0000);
        assert_eq!(regs.get(reg(7)), 0xFEFF_0000);
        assert_eq!(regs.get(reg(8)), 5);
        assert_eq!(regs.get(reg(12)), 0);
    }

    #[test]
    fn indexed_access() {
        let mut regs = Registers::default();
        regs.set(reg(3), 0x8000_0000);
        assert_eq!(regs[reg(3)], 0x8000_0000);
        regs[reg(4)] = 7;
        assert_eq!(regs.get(reg(4)), 7);
        assert_eq!(regs.by_index(4), Some(7));
        assert_eq!(regs.by_index(13), None);
    }
}
