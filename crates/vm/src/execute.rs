//! Single-step execution and opcode dispatch.
//!
//! [`step`] charges gas, decodes the instruction at `pc` and applies it. The
//! dispatch is one exhaustive `match` over [`Opcode`]; helpers pull the
//! operands out of [`Args`] for each form.

use pvm_common::instruction::sign_extend;
use pvm_common::layout::HALT_ADDRESS;
use pvm_common::{Args, Instruction, Opcode, ProgramCode, Reg};
use tracing::{debug, trace};

use crate::error::MemoryError;
use crate::exit::{ExecOutcome, ExitReason, PanicReason};
use crate::memory::Memory;
use crate::state::VmState;

/// Where control goes after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Fall through to the next instruction.
    Advance,
    Jump(u32),
    Exit(ExitReason),
}

/// Why an instruction could not complete.
#[derive(Debug)]
enum Fault {
    Memory(MemoryError),
    /// Operands do not match the opcode's form.
    Malformed,
}

impl From<MemoryError> for Fault {
    fn from(err: MemoryError) -> Self {
        Fault::Memory(err)
    }
}

type Exec = Result<Next, Fault>;

fn panic(reason: PanicReason) -> Next {
    Next::Exit(ExitReason::Panic(reason))
}

/// Execute one instruction.
///
/// Gas is charged before the instruction runs, so an instruction that
/// faults has still been paid for. A host call or page fault leaves `pc` on
/// the instruction that raised it.
pub fn step<M: Memory>(program: &ProgramCode, state: &mut VmState<M>) -> ExecOutcome {
    if state.gas.is_exhausted() {
        return ExecOutcome::Exit(ExitReason::OutOfGas);
    }

    let pc = state.pc;
    let decoded = program.instruction_at(pc);
    let cost = decoded.as_ref().map_or(1, |instr| instr.opcode.gas_cost());
    state.gas.consume(cost);

    let instruction = match decoded {
        Ok(instruction) => instruction,
        Err(err) => {
            debug!(pc, %err, "undecodable instruction");
            return ExecOutcome::Exit(ExitReason::Panic(PanicReason::InvalidInstructionIndex));
        }
    };
    trace!(pc, opcode = instruction.opcode.mnemonic(), gas = state.gas.value(), "step");

    let next = match state.execute(program, instruction) {
        Ok(next) => next,
        Err(Fault::Memory(err)) => match err.fault_address() {
            Some(address) => Next::Exit(ExitReason::PageFault(address)),
            None => {
                debug!(pc, %err, "illegal memory operation");
                panic(PanicReason::Trap)
            }
        },
        Err(Fault::Malformed) => panic(PanicReason::InvalidInstructionIndex),
    };

    match next {
        Next::Advance => {
            state.pc = pc.wrapping_add(program.skip(pc) + 1);
            ExecOutcome::Continue
        }
        Next::Jump(target) => {
            state.pc = target;
            ExecOutcome::Continue
        }
        Next::Exit(reason) => ExecOutcome::Exit(reason),
    }
}

/// Target of the dynamic jump to `address`, or the exit it causes.
fn dynamic_jump(program: &ProgramCode, address: u32) -> Next {
    if address == HALT_ADDRESS {
        return Next::Exit(ExitReason::Halt);
    }
    let slots = program.jump_table_len() as u64 * 2;
    if address == 0 || u64::from(address) > slots || address % 2 != 0 {
        return panic(PanicReason::InvalidDynamicJump);
    }
    match program.jump_table_entry((address / 2 - 1) as usize) {
        Some(target) if program.is_basic_block_start(target) => Next::Jump(target),
        _ => panic(PanicReason::InvalidDynamicJump),
    }
}

/// Static branch to `pc + offset` when `taken`. The target must start a
/// basic block whether or not the branch is taken.
fn static_branch(program: &ProgramCode, pc: u32, offset: u32, taken: bool) -> Next {
    let target = pc.wrapping_add(offset);
    if !program.is_basic_block_start(target) {
        return panic(PanicReason::InvalidBranch);
    }
    if taken {
        Next::Jump(target)
    } else {
        Next::Advance
    }
}

fn sext32(value: u32) -> u64 {
    sign_extend(value)
}

fn div_u32(a: u32, b: u32) -> u32 {
    a.checked_div(b).unwrap_or(u32::MAX)
}

fn rem_u32(a: u32, b: u32) -> u32 {
    a.checked_rem(b).unwrap_or(a)
}

fn div_s32(a: u32, b: u32) -> u32 {
    let (a, b) = (a as i32, b as i32);
    if b == 0 {
        u32::MAX
    } else {
        a.wrapping_div(b) as u32
    }
}

fn rem_s32(a: u32, b: u32) -> u32 {
    let (a, b) = (a as i32, b as i32);
    if b == 0 {
        a as u32
    } else {
        a.wrapping_rem(b) as u32
    }
}

fn div_u64(a: u64, b: u64) -> u64 {
    a.checked_div(b).unwrap_or(u64::MAX)
}

fn rem_u64(a: u64, b: u64) -> u64 {
    a.checked_rem(b).unwrap_or(a)
}

fn div_s64(a: u64, b: u64) -> u64 {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        u64::MAX
    } else {
        a.wrapping_div(b) as u64
    }
}

fn rem_s64(a: u64, b: u64) -> u64 {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        a as u64
    } else {
        a.wrapping_rem(b) as u64
    }
}

fn mul_upper_ss(a: u64, b: u64) -> u64 {
    ((i128::from(a as i64) * i128::from(b as i64)) >> 64) as u64
}

fn mul_upper_uu(a: u64, b: u64) -> u64 {
    ((u128::from(a) * u128::from(b)) >> 64) as u64
}

fn mul_upper_su(a: u64, b: u64) -> u64 {
    ((i128::from(a as i64) * i128::from(b)) >> 64) as u64
}

fn signed_lt(a: u64, b: u64) -> bool {
    (a as i64) < (b as i64)
}

/// Widen a little-endian value of `width` bytes, sign-extending if `signed`.
fn widen(bytes: [u8; 8], width: usize, signed: bool) -> u64 {
    let value = u64::from_le_bytes(bytes);
    if !signed || width == 8 {
        return value;
    }
    let shift = 64 - 8 * width as u32;
    (((value << shift) as i64) >> shift) as u64
}

impl<M: Memory> VmState<M> {
    fn reg(&self, reg: Reg) -> u64 {
        self.registers.get(reg)
    }

    fn set_reg(&mut self, reg: Reg, value: u64) {
        self.registers.set(reg, value);
    }

    fn load_word(&self, address: u32, width: usize, signed: bool) -> Result<u64, MemoryError> {
        let mut bytes = [0u8; 8];
        self.load(address, &mut bytes[..width])?;
        Ok(widen(bytes, width, signed))
    }

    fn store_word(&mut self, address: u32, value: u64, width: usize) -> Result<(), MemoryError> {
        self.store(address, &value.to_le_bytes()[..width])
    }

    fn execute(&mut self, program: &ProgramCode, instruction: Instruction) -> Exec {
        let Instruction { opcode, args } = instruction;
        let pc = self.pc;

        match opcode {
            // Control
            Opcode::Trap => Ok(panic(PanicReason::Trap)),
            Opcode::Fallthrough => Ok(Next::Advance),
            Opcode::Ecalli => match args {
                Args::Imm { imm } => Ok(Next::Exit(ExitReason::HostCall(imm))),
                _ => Err(Fault::Malformed),
            },
            Opcode::Jump => match args {
                Args::Offset { offset } => Ok(static_branch(program, pc, offset, true)),
                _ => Err(Fault::Malformed),
            },
            Opcode::JumpInd => match args {
                Args::RegImm { reg, imm } => {
                    Ok(dynamic_jump(program, (self.reg(reg) as u32).wrapping_add(imm)))
                }
                _ => Err(Fault::Malformed),
            },
            Opcode::LoadImmJump => match args {
                Args::RegImmOffset { reg, imm, offset } => {
                    self.set_reg(reg, sext32(imm));
                    Ok(static_branch(program, pc, offset, true))
                }
                _ => Err(Fault::Malformed),
            },
            Opcode::LoadImmJumpInd => match args {
                Args::TwoRegTwoImm { ra, rb, imm_x, imm_y } => {
                    let address = (self.reg(rb) as u32).wrapping_add(imm_y);
                    self.set_reg(ra, sext32(imm_x));
                    Ok(dynamic_jump(program, address))
                }
                _ => Err(Fault::Malformed),
            },

            // Immediate loads
            Opcode::LoadImm64 => match args {
                Args::RegExtImm { reg, imm } => {
                    self.set_reg(reg, imm);
                    Ok(Next::Advance)
                }
                _ => Err(Fault::Malformed),
            },
            Opcode::LoadImm => match args {
                Args::RegImm { reg, imm } => {
                    self.set_reg(reg, sext32(imm));
                    Ok(Next::Advance)
                }
                _ => Err(Fault::Malformed),
            },

            // Stores of immediates
            Opcode::StoreImmU8 => self.exec_store_imm(args, 1),
            Opcode::StoreImmU16 => self.exec_store_imm(args, 2),
            Opcode::StoreImmU32 => self.exec_store_imm(args, 4),
            Opcode::StoreImmU64 => self.exec_store_imm(args, 8),
            Opcode::StoreImmIndU8 => self.exec_store_imm_ind(args, 1),
            Opcode::StoreImmIndU16 => self.exec_store_imm_ind(args, 2),
            Opcode::StoreImmIndU32 => self.exec_store_imm_ind(args, 4),
            Opcode::StoreImmIndU64 => self.exec_store_imm_ind(args, 8),

            // Absolute loads and stores
            Opcode::LoadU8 => self.exec_load(args, 1, false),
            Opcode::LoadI8 => self.exec_load(args, 1, true),
            Opcode::LoadU16 => self.exec_load(args, 2, false),
            Opcode::LoadI16 => self.exec_load(args, 2, true),
            Opcode::LoadU32 => self.exec_load(args, 4, false),
            Opcode::LoadI32 => self.exec_load(args, 4, true),
            Opcode::LoadU64 => self.exec_load(args, 8, false),
            Opcode::StoreU8 => self.exec_store(args, 1),
            Opcode::StoreU16 => self.exec_store(args, 2),
            Opcode::StoreU32 => self.exec_store(args, 4),
            Opcode::StoreU64 => self.exec_store(args, 8),

            // Indirect loads and stores
            Opcode::LoadIndU8 => self.exec_load_ind(args, 1, false),
            Opcode::LoadIndI8 => self.exec_load_ind(args, 1, true),
            Opcode::LoadIndU16 => self.exec_load_ind(args, 2, false),
            Opcode::LoadIndI16 => self.exec_load_ind(args, 2, true),
            Opcode::LoadIndU32 => self.exec_load_ind(args, 4, false),
            Opcode::LoadIndI32 => self.exec_load_ind(args, 4, true),
            Opcode::LoadIndU64 => self.exec_load_ind(args, 8, false),
            Opcode::StoreIndU8 => self.exec_store_ind(args, 1),
            Opcode::StoreIndU16 => self.exec_store_ind(args, 2),
            Opcode::StoreIndU32 => self.exec_store_ind(args, 4),
            Opcode::StoreIndU64 => self.exec_store_ind(args, 8),

            // Branches against an immediate
            Opcode::BranchEqImm => self.exec_branch_imm(program, args, |a, b| a == b),
            Opcode::BranchNeImm => self.exec_branch_imm(program, args, |a, b| a != b),
            Opcode::BranchLtUImm => self.exec_branch_imm(program, args, |a, b| a < b),
            Opcode::BranchLeUImm => self.exec_branch_imm(program, args, |a, b| a <= b),
            Opcode::BranchGeUImm => self.exec_branch_imm(program, args, |a, b| a >= b),
            Opcode::BranchGtUImm => self.exec_branch_imm(program, args, |a, b| a > b),
            Opcode::BranchLtSImm => self.exec_branch_imm(program, args, signed_lt),
            Opcode::BranchLeSImm => self.exec_branch_imm(program, args, |a, b| !signed_lt(b, a)),
            Opcode::BranchGeSImm => self.exec_branch_imm(program, args, |a, b| !signed_lt(a, b)),
            Opcode::BranchGtSImm => self.exec_branch_imm(program, args, |a, b| signed_lt(b, a)),

            // Branches between registers
            Opcode::BranchEq => self.exec_branch(program, args, |a, b| a == b),
            Opcode::BranchNe => self.exec_branch(program, args, |a, b| a != b),
            Opcode::BranchLtU => self.exec_branch(program, args, |a, b| a < b),
            Opcode::BranchLtS => self.exec_branch(program, args, signed_lt),
            Opcode::BranchGeU => self.exec_branch(program, args, |a, b| a >= b),
            Opcode::BranchGeS => self.exec_branch(program, args, |a, b| !signed_lt(a, b)),

            // Two-register operations
            Opcode::MoveReg => self.exec_unary(args, |a| a),
            Opcode::Sbrk => self.exec_sbrk(args),
            Opcode::CountSetBits64 => self.exec_unary(args, |a| u64::from(a.count_ones())),
            Opcode::CountSetBits32 => self.exec_unary(args, |a| u64::from((a as u32).count_ones())),
            Opcode::LeadingZeroBits64 => self.exec_unary(args, |a| u64::from(a.leading_zeros())),
            Opcode::LeadingZeroBits32 => {
                self.exec_unary(args, |a| u64::from((a as u32).leading_zeros()))
            }
            Opcode::TrailingZeroBits64 => self.exec_unary(args, |a| u64::from(a.trailing_zeros())),
            Opcode::TrailingZeroBits32 => {
                self.exec_unary(args, |a| u64::from((a as u32).trailing_zeros()))
            }
            Opcode::SignExtend8 => self.exec_unary(args, |a| a as u8 as i8 as i64 as u64),
            Opcode::SignExtend16 => self.exec_unary(args, |a| a as u16 as i16 as i64 as u64),
            Opcode::ZeroExtend16 => self.exec_unary(args, |a| u64::from(a as u16)),
            Opcode::ReverseBytes => self.exec_unary(args, u64::swap_bytes),

            // Register-immediate arithmetic, 32-bit
            Opcode::AddImm32 => self.exec_imm32(args, u32::wrapping_add),
            Opcode::MulImm32 => self.exec_imm32(args, u32::wrapping_mul),
            Opcode::NegAddImm32 => self.exec_imm32(args, |a, imm| imm.wrapping_sub(a)),
            Opcode::ShloLImm32 => self.exec_imm32(args, |a, imm| a << (imm & 31)),
            Opcode::ShloRImm32 => self.exec_imm32(args, |a, imm| a >> (imm & 31)),
            Opcode::SharRImm32 => self.exec_imm32(args, |a, imm| ((a as i32) >> (imm & 31)) as u32),
            Opcode::ShloLImmAlt32 => self.exec_imm32(args, |a, imm| imm << (a & 31)),
            Opcode::ShloRImmAlt32 => self.exec_imm32(args, |a, imm| imm >> (a & 31)),
            Opcode::SharRImmAlt32 => self.exec_imm32(args, |a, imm| ((imm as i32) >> (a & 31)) as u32),
            Opcode::RotR32Imm => self.exec_imm32(args, |a, imm| a.rotate_right(imm & 31)),
            Opcode::RotR32ImmAlt => self.exec_imm32(args, |a, imm| imm.rotate_right(a & 31)),

            // Register-immediate arithmetic, 64-bit
            Opcode::AddImm64 => self.exec_imm64(args, u64::wrapping_add),
            Opcode::MulImm64 => self.exec_imm64(args, u64::wrapping_mul),
            Opcode::NegAddImm64 => self.exec_imm64(args, |a, imm| imm.wrapping_sub(a)),
            Opcode::AndImm => self.exec_imm64(args, |a, imm| a & imm),
            Opcode::XorImm => self.exec_imm64(args, |a, imm| a ^ imm),
            Opcode::OrImm => self.exec_imm64(args, |a, imm| a | imm),
            Opcode::SetLtUImm => self.exec_imm64(args, |a, imm| u64::from(a < imm)),
            Opcode::SetLtSImm => self.exec_imm64(args, |a, imm| u64::from(signed_lt(a, imm))),
            Opcode::SetGtUImm => self.exec_imm64(args, |a, imm| u64::from(a > imm)),
            Opcode::SetGtSImm => self.exec_imm64(args, |a, imm| u64::from(signed_lt(imm, a))),
            Opcode::ShloLImm64 => self.exec_imm64(args, |a, imm| a << (imm & 63)),
            Opcode::ShloRImm64 => self.exec_imm64(args, |a, imm| a >> (imm & 63)),
            Opcode::SharRImm64 => self.exec_imm64(args, |a, imm| ((a as i64) >> (imm & 63)) as u64),
            Opcode::ShloLImmAlt64 => self.exec_imm64(args, |a, imm| imm << (a & 63)),
            Opcode::ShloRImmAlt64 => self.exec_imm64(args, |a, imm| imm >> (a & 63)),
            Opcode::SharRImmAlt64 => self.exec_imm64(args, |a, imm| ((imm as i64) >> (a & 63)) as u64),
            Opcode::RotR64Imm => self.exec_imm64(args, |a, imm| a.rotate_right((imm & 63) as u32)),
            Opcode::RotR64ImmAlt => self.exec_imm64(args, |a, imm| imm.rotate_right((a & 63) as u32)),
            Opcode::CmovIzImm => self.exec_cmov_imm(args, true),
            Opcode::CmovNzImm => self.exec_cmov_imm(args, false),

            // Three-register arithmetic, 32-bit
            Opcode::Add32 => self.exec_three32(args, u32::wrapping_add),
            Opcode::Sub32 => self.exec_three32(args, u32::wrapping_sub),
            Opcode::Mul32 => self.exec_three32(args, u32::wrapping_mul),
            Opcode::DivU32 => self.exec_three32(args, div_u32),
            Opcode::DivS32 => self.exec_three32(args, div_s32),
            Opcode::RemU32 => self.exec_three32(args, rem_u32),
            Opcode::RemS32 => self.exec_three32(args, rem_s32),
            Opcode::ShloL32 => self.exec_three32(args, |a, b| a << (b & 31)),
            Opcode::ShloR32 => self.exec_three32(args, |a, b| a >> (b & 31)),
            Opcode::SharR32 => self.exec_three32(args, |a, b| ((a as i32) >> (b & 31)) as u32),
            Opcode::RotL32 => self.exec_three32(args, |a, b| a.rotate_left(b & 31)),
            Opcode::RotR32 => self.exec_three32(args, |a, b| a.rotate_right(b & 31)),

            // Three-register arithmetic, 64-bit
            Opcode::Add64 => self.exec_three(args, u64::wrapping_add),
            Opcode::Sub64 => self.exec_three(args, u64::wrapping_sub),
            Opcode::Mul64 => self.exec_three(args, u64::wrapping_mul),
            Opcode::DivU64 => self.exec_three(args, div_u64),
            Opcode::DivS64 => self.exec_three(args, div_s64),
            Opcode::RemU64 => self.exec_three(args, rem_u64),
            Opcode::RemS64 => self.exec_three(args, rem_s64),
            Opcode::ShloL64 => self.exec_three(args, |a, b| a << (b & 63)),
            Opcode::ShloR64 => self.exec_three(args, |a, b| a >> (b & 63)),
            Opcode::SharR64 => self.exec_three(args, |a, b| ((a as i64) >> (b & 63)) as u64),
            Opcode::RotL64 => self.exec_three(args, |a, b| a.rotate_left((b & 63) as u32)),
            Opcode::RotR64 => self.exec_three(args, |a, b| a.rotate_right((b & 63) as u32)),
            Opcode::MulUpperSS => self.exec_three(args, mul_upper_ss),
            Opcode::MulUpperUU => self.exec_three(args, mul_upper_uu),
            Opcode::MulUpperSU => self.exec_three(args, mul_upper_su),

            // Logic and comparison
            Opcode::And => self.exec_three(args, |a, b| a & b),
            Opcode::Xor => self.exec_three(args, |a, b| a ^ b),
            Opcode::Or => self.exec_three(args, |a, b| a | b),
            Opcode::AndInv => self.exec_three(args, |a, b| a & !b),
            Opcode::OrInv => self.exec_three(args, |a, b| a | !b),
            Opcode::Xnor => self.exec_three(args, |a, b| !(a ^ b)),
            Opcode::SetLtU => self.exec_three(args, |a, b| u64::from(a < b)),
            Opcode::SetLtS => self.exec_three(args, |a, b| u64::from(signed_lt(a, b))),
            Opcode::Max => self.exec_three(args, |a, b| (a as i64).max(b as i64) as u64),
            Opcode::MaxU => self.exec_three(args, u64::max),
            Opcode::Min => self.exec_three(args, |a, b| (a as i64).min(b as i64) as u64),
            Opcode::MinU => self.exec_three(args, u64::min),
            Opcode::CmovIz => self.exec_cmov(args, true),
            Opcode::CmovNz => self.exec_cmov(args, false),
        }
    }

    fn exec_store_imm(&mut self, args: Args, width: usize) -> Exec {
        let Args::TwoImm { imm_x, imm_y } = args else {
            return Err(Fault::Malformed);
        };
        self.store_word(imm_x, sext32(imm_y), width)?;
        Ok(Next::Advance)
    }

    fn exec_store_imm_ind(&mut self, args: Args, width: usize) -> Exec {
        let Args::RegTwoImm { reg, imm_x, imm_y } = args else {
            return Err(Fault::Malformed);
        };
        let address = (self.reg(reg) as u32).wrapping_add(imm_x);
        self.store_word(address, sext32(imm_y), width)?;
        Ok(Next::Advance)
    }

    fn exec_load(&mut self, args: Args, width: usize, signed: bool) -> Exec {
        let Args::RegImm { reg, imm } = args else {
            return Err(Fault::Malformed);
        };
        let value = self.load_word(imm, width, signed)?;
        self.set_reg(reg, value);
        Ok(Next::Advance)
    }

    fn exec_store(&mut self, args: Args, width: usize) -> Exec {
        let Args::RegImm { reg, imm } = args else {
            return Err(Fault::Malformed);
        };
        self.store_word(imm, self.reg(reg), width)?;
        Ok(Next::Advance)
    }

    fn exec_load_ind(&mut self, args: Args, width: usize, signed: bool) -> Exec {
        let Args::TwoRegImm { ra, rb, imm } = args else {
            return Err(Fault::Malformed);
        };
        let address = (self.reg(rb) as u32).wrapping_add(imm);
        let value = self.load_word(address, width, signed)?;
        self.set_reg(ra, value);
        Ok(Next::Advance)
    }

    fn exec_store_ind(&mut self, args: Args, width: usize) -> Exec {
        let Args::TwoRegImm { ra, rb, imm } = args else {
            return Err(Fault::Malformed);
        };
        let address = (self.reg(rb) as u32).wrapping_add(imm);
        self.store_word(address, self.reg(ra), width)?;
        Ok(Next::Advance)
    }

    fn exec_branch_imm(
        &mut self,
        program: &ProgramCode,
        args: Args,
        cond: impl Fn(u64, u64) -> bool,
    ) -> Exec {
        let Args::RegImmOffset { reg, imm, offset } = args else {
            return Err(Fault::Malformed);
        };
        let taken = cond(self.reg(reg), sext32(imm));
        Ok(static_branch(program, self.pc, offset, taken))
    }

    fn exec_branch(
        &mut self,
        program: &ProgramCode,
        args: Args,
        cond: impl Fn(u64, u64) -> bool,
    ) -> Exec {
        let Args::TwoRegOffset { ra, rb, offset } = args else {
            return Err(Fault::Malformed);
        };
        let taken = cond(self.reg(ra), self.reg(rb));
        Ok(static_branch(program, self.pc, offset, taken))
    }

    fn exec_unary(&mut self, args: Args, op: impl Fn(u64) -> u64) -> Exec {
        let Args::TwoReg { dst, src } = args else {
            return Err(Fault::Malformed);
        };
        self.set_reg(dst, op(self.reg(src)));
        Ok(Next::Advance)
    }

    /// `dst = sbrk(src)`. A size that does not fit the address space is out
    /// of memory.
    fn exec_sbrk(&mut self, args: Args) -> Exec {
        let Args::TwoReg { dst, src } = args else {
            return Err(Fault::Malformed);
        };
        let increment = self.reg(src) as u32;
        let previous = self.memory.sbrk(increment)?;
        self.set_reg(dst, u64::from(previous));
        Ok(Next::Advance)
    }

    /// `ra = op(rb, imm)` on the low 32 bits, sign-extended.
    fn exec_imm32(&mut self, args: Args, op: impl Fn(u32, u32) -> u32) -> Exec {
        let Args::TwoRegImm { ra, rb, imm } = args else {
            return Err(Fault::Malformed);
        };
        self.set_reg(ra, sext32(op(self.reg(rb) as u32, imm)));
        Ok(Next::Advance)
    }

    /// `ra = op(rb, imm)` with the immediate sign-extended to 64 bits.
    fn exec_imm64(&mut self, args: Args, op: impl Fn(u64, u64) -> u64) -> Exec {
        let Args::TwoRegImm { ra, rb, imm } = args else {
            return Err(Fault::Malformed);
        };
        self.set_reg(ra, op(self.reg(rb), sext32(imm)));
        Ok(Next::Advance)
    }

    /// `ra = imm` if `rb` is zero (`if_zero`) or non-zero (otherwise);
    /// `ra` is left alone when the condition fails.
    fn exec_cmov_imm(&mut self, args: Args, if_zero: bool) -> Exec {
        let Args::TwoRegImm { ra, rb, imm } = args else {
            return Err(Fault::Malformed);
        };
        if (self.reg(rb) == 0) == if_zero {
            self.set_reg(ra, sext32(imm));
        }
        Ok(Next::Advance)
    }

    /// `rd = op(ra, rb)` on the low 32 bits, sign-extended.
    fn exec_three32(&mut self, args: Args, op: impl Fn(u32, u32) -> u32) -> Exec {
        let Args::ThreeReg { ra, rb, rd } = args else {
            return Err(Fault::Malformed);
        };
        self.set_reg(rd, sext32(op(self.reg(ra) as u32, self.reg(rb) as u32)));
        Ok(Next::Advance)
    }

    fn exec_three(&mut self, args: Args, op: impl Fn(u64, u64) -> u64) -> Exec {
        let Args::ThreeReg { ra, rb, rd } = args else {
            return Err(Fault::Malformed);
        };
        self.set_reg(rd, op(self.reg(ra), self.reg(rb)));
        Ok(Next::Advance)
    }

    fn exec_cmov(&mut self, args: Args, if_zero: bool) -> Exec {
        let Args::ThreeReg { ra, rb, rd } = args else {
            return Err(Fault::Malformed);
        };
        if (self.reg(rb) == 0) == if_zero {
            self.set_reg(rd, self.reg(ra));
        }
        Ok(Next::Advance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_edge_cases() {
        assert_eq!(div_u32(7, 0), u32::MAX);
        assert_eq!(rem_u32(7, 0), 7);
        assert_eq!(div_s32(i32::MIN as u32, -1i32 as u32), i32::MIN as u32);
        assert_eq!(rem_s32(i32::MIN as u32, -1i32 as u32), 0);
        assert_eq!(rem_s32(-7i32 as u32, 2), -1i32 as u32);

        assert_eq!(div_u64(7, 0), u64::MAX);
        assert_eq!(rem_u64(7, 0), 7);
        assert_eq!(div_s64(i64::MIN as u64, -1i64 as u64), i64::MIN as u64);
        assert_eq!(rem_s64(i64::MIN as u64, -1i64 as u64), 0);
        assert_eq!(div_s64(-7i64 as u64, 2), -3i64 as u64);
    }

    #[test]
    fn upper_multiplication() {
        assert_eq!(mul_upper_uu(u64::MAX, 2), 1);
        assert_eq!(mul_upper_ss(-1i64 as u64, 2), u64::MAX);
        assert_eq!(mul_upper_su(-1i64 as u64, u64::MAX), u64::MAX);
        assert_eq!(mul_upper_su(2, u64::MAX), 1);
    }

    #[test]
    fn widening_loads() {
        let bytes = [0x80, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(widen(bytes, 1, false), 0x80);
        assert_eq!(widen(bytes, 1, true), 0xFFFF_FFFF_FFFF_FF80);
        assert_eq!(widen(bytes, 2, true), 0x80);
        assert_eq!(widen([0xFF; 8], 8, true), u64::MAX);
    }
}
