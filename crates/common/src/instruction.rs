//! Decoded instructions and their variable-length byte encoding.
//!
//! An instruction is an [`Opcode`] byte followed by `skip` operand bytes,
//! where `skip` comes from the program's bitmask (see
//! [`crate::program::skip`]). How the operand bytes are split into registers
//! and immediates depends only on the opcode's [`Form`]:
//!
//! ```text
//! Form           operand bytes
//! -------------  ------------------------------------------------------
//! Imm            imm(0..min(4, l))
//! RegExtImm      reg | 8-byte little-endian value
//! TwoImm         lx | imm_x(lx) | imm_y(rest)
//! Offset         offset(0..min(4, l))
//! RegImm         reg | imm(rest)
//! RegTwoImm      reg + lx<<4 | imm_x(lx) | imm_y(rest)
//! RegImmOffset   reg + lx<<4 | imm(lx) | offset(rest)
//! TwoReg         dst + src<<4
//! TwoRegImm      ra + rb<<4 | imm(rest)
//! TwoRegOffset   ra + rb<<4 | offset(rest)
//! TwoRegTwoImm   ra + rb<<4 | lx | imm_x(lx) | imm_y(rest)
//! ThreeReg       ra + rb<<4 | rd
//! ```
//!
//! Lengths are capped at 4 bytes, register nibbles are clamped to 12, and
//! bytes past the end of the code read as zero.

use std::fmt;

use crate::codec::decode_fixed;
use crate::error::DecodeError;
use crate::opcode::{Form, Opcode};

/// Index of one of the 13 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u8);

impl Reg {
    /// Number of registers.
    pub const COUNT: usize = 13;

    /// Returns the register with `index`, if it exists.
    pub fn new(index: u8) -> Option<Reg> {
        (usize::from(index) < Self::COUNT).then_some(Reg(index))
    }

    /// Returns the register with `index`, clamping out-of-range values to r12.
    pub fn clamped(index: u8) -> Reg {
        Reg(index.min(Self::COUNT as u8 - 1))
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Operands of an instruction, one variant per [`Form`].
///
/// Immediates are kept as the 32-bit sign-extended value; 64-bit consumers
/// widen them with [`sign_extend`]. Offsets are relative to the
/// instruction's own address and wrap modulo 2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Args {
    None,
    Imm { imm: u32 },
    RegExtImm { reg: Reg, imm: u64 },
    TwoImm { imm_x: u32, imm_y: u32 },
    Offset { offset: u32 },
    RegImm { reg: Reg, imm: u32 },
    RegTwoImm { reg: Reg, imm_x: u32, imm_y: u32 },
    RegImmOffset { reg: Reg, imm: u32, offset: u32 },
    TwoReg { dst: Reg, src: Reg },
    TwoRegImm { ra: Reg, rb: Reg, imm: u32 },
    TwoRegOffset { ra: Reg, rb: Reg, offset: u32 },
    TwoRegTwoImm { ra: Reg, rb: Reg, imm_x: u32, imm_y: u32 },
    ThreeReg { ra: Reg, rb: Reg, rd: Reg },
}

impl Args {
    pub fn form(&self) -> Form {
        match self {
            Args::None => Form::NoArgs,
            Args::Imm { .. } => Form::Imm,
            Args::RegExtImm { .. } => Form::RegExtImm,
            Args::TwoImm { .. } => Form::TwoImm,
            Args::Offset { .. } => Form::Offset,
            Args::RegImm { .. } => Form::RegImm,
            Args::RegTwoImm { .. } => Form::RegTwoImm,
            Args::RegImmOffset { .. } => Form::RegImmOffset,
            Args::TwoReg { .. } => Form::TwoReg,
            Args::TwoRegImm { .. } => Form::TwoRegImm,
            Args::TwoRegOffset { .. } => Form::TwoRegOffset,
            Args::TwoRegTwoImm { .. } => Form::TwoRegTwoImm,
            Args::ThreeReg { .. } => Form::ThreeReg,
        }
    }
}

/// A single decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub args: Args,
}

/// Operand bytes read past the opcode. Covers the widest form (`RegExtImm`).
const OPERAND_WINDOW: usize = 16;

impl Instruction {
    pub fn new(opcode: Opcode, args: Args) -> Self {
        debug_assert_eq!(opcode.form(), args.form(), "operand form mismatch for {opcode:?}");
        Self { opcode, args }
    }

    /// Shorthand for instructions without operands.
    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Args::None)
    }

    /// Whether the operands have the layout the opcode expects.
    pub fn is_well_formed(&self) -> bool {
        self.opcode.form() == self.args.form()
    }

    /// Decode the instruction starting at `pc`, which has `skip` operand bytes.
    ///
    /// A `pc` at or past the end of `code` decodes as `trap`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownOpcode`] if the byte at `pc` is not an
    /// assigned opcode.
    pub fn decode(code: &[u8], pc: u32, skip: u32) -> Result<Instruction, DecodeError> {
        let start = pc as usize;
        let opcode = match code.get(start) {
            Some(&byte) => Opcode::try_from(byte)?,
            None => return Ok(Instruction::bare(Opcode::Trap)),
        };

        let mut data = [0u8; OPERAND_WINDOW];
        let available = code.get(start + 1..).unwrap_or(&[]);
        let copied = available.len().min(OPERAND_WINDOW);
        data[..copied].copy_from_slice(&available[..copied]);

        let len = skip as usize;
        let low = Reg::clamped(data[0] & 0x0F);
        let high = Reg::clamped(data[0] >> 4);

        let args = match opcode.form() {
            Form::NoArgs => Args::None,
            Form::Imm => Args::Imm {
                imm: decode_immediate(&data[..len.min(4)]),
            },
            Form::RegExtImm => Args::RegExtImm {
                reg: low,
                imm: decode_fixed(&data[1..9]),
            },
            Form::TwoImm => {
                let (imm_x, imm_y) = decode_two_immediates(&data, 0, usize::from(data[0]), len);
                Args::TwoImm { imm_x, imm_y }
            }
            Form::Offset => Args::Offset {
                offset: decode_immediate(&data[..len.min(4)]),
            },
            Form::RegImm => Args::RegImm {
                reg: low,
                imm: decode_trailing(&data, 1, len),
            },
            Form::RegTwoImm => {
                let (imm_x, imm_y) =
                    decode_two_immediates(&data, 0, usize::from(data[0] >> 4), len);
                Args::RegTwoImm { reg: low, imm_x, imm_y }
            }
            Form::RegImmOffset => {
                let (imm, offset) =
                    decode_two_immediates(&data, 0, usize::from(data[0] >> 4), len);
                Args::RegImmOffset { reg: low, imm, offset }
            }
            Form::TwoReg => Args::TwoReg {
                dst: low,
                src: high,
            },
            Form::TwoRegImm => Args::TwoRegImm {
                ra: low,
                rb: high,
                imm: decode_trailing(&data, 1, len),
            },
            Form::TwoRegOffset => Args::TwoRegOffset {
                ra: low,
                rb: high,
                offset: decode_trailing(&data, 1, len),
            },
            Form::TwoRegTwoImm => {
                let (imm_x, imm_y) = decode_two_immediates(&data, 1, usize::from(data[1]), len);
                Args::TwoRegTwoImm {
                    ra: low,
                    rb: high,
                    imm_x,
                    imm_y,
                }
            }
            Form::ThreeReg => Args::ThreeReg {
                ra: low,
                rb: high,
                rd: Reg::clamped(data[1]),
            },
        };

        Ok(Instruction { opcode, args })
    }

    /// Encode to canonical bytes: shortest immediates, 4-byte offsets and
    /// 8-byte extended immediates.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode as u8];
        match self.args {
            Args::None => {}
            Args::Imm { imm } => push_immediate(&mut out, imm),
            Args::RegExtImm { reg, imm } => {
                out.push(reg.0);
                out.extend_from_slice(&imm.to_le_bytes());
            }
            Args::TwoImm { imm_x, imm_y } => {
                out.push(immediate_len(imm_x) as u8);
                push_immediate(&mut out, imm_x);
                push_immediate(&mut out, imm_y);
            }
            Args::Offset { offset } => out.extend_from_slice(&offset.to_le_bytes()),
            Args::RegImm { reg, imm } => {
                out.push(reg.0);
                push_immediate(&mut out, imm);
            }
            Args::RegTwoImm { reg, imm_x, imm_y } => {
                out.push(reg.0 | (immediate_len(imm_x) as u8) << 4);
                push_immediate(&mut out, imm_x);
                push_immediate(&mut out, imm_y);
            }
            Args::RegImmOffset { reg, imm, offset } => {
                out.push(reg.0 | (immediate_len(imm) as u8) << 4);
                push_immediate(&mut out, imm);
                out.extend_from_slice(&offset.to_le_bytes());
            }
            Args::TwoReg { dst, src } => out.push(dst.0 | src.0 << 4),
            Args::TwoRegImm { ra, rb, imm } => {
                out.push(ra.0 | rb.0 << 4);
                push_immediate(&mut out, imm);
            }
            Args::TwoRegOffset { ra, rb, offset } => {
                out.push(ra.0 | rb.0 << 4);
                out.extend_from_slice(&offset.to_le_bytes());
            }
            Args::TwoRegTwoImm {
                ra,
                rb,
                imm_x,
                imm_y,
            } => {
                out.push(ra.0 | rb.0 << 4);
                out.push(immediate_len(imm_x) as u8);
                push_immediate(&mut out, imm_x);
                push_immediate(&mut out, imm_y);
            }
            Args::ThreeReg { ra, rb, rd } => {
                out.push(ra.0 | rb.0 << 4);
                out.push(rd.0);
            }
        }
        out
    }
}

/// Decode a little-endian immediate of up to 4 bytes, sign-extending from
/// the most significant supplied bit.
///
/// ```
/// use pvm_common::instruction::decode_immediate;
///
/// assert_eq!(decode_immediate(&[0xFF]), 0xFFFF_FFFF);
/// assert_eq!(decode_immediate(&[0x7F]), 0x7F);
/// assert_eq!(decode_immediate(&[]), 0);
/// ```
pub fn decode_immediate(bytes: &[u8]) -> u32 {
    let len = bytes.len().min(4);
    if len == 0 {
        return 0;
    }
    let value = decode_fixed(&bytes[..len]) as u32;
    let shift = 32 - 8 * len as u32;
    (((value << shift) as i32) >> shift) as u32
}

/// Sign-extend a 32-bit immediate to 64 bits.
pub fn sign_extend(imm: u32) -> u64 {
    imm as i32 as i64 as u64
}

/// Immediate occupying the operand bytes from `from` to the end of the
/// instruction, capped at 4.
fn decode_trailing(data: &[u8; OPERAND_WINDOW], from: usize, len: usize) -> u32 {
    let n = len.saturating_sub(from).min(4);
    decode_immediate(&data[from..from + n])
}

/// Two immediates after the byte at `header`: the first with length
/// `min(4, length_bits & 7)`, the second taking what remains of the
/// instruction (capped at 4).
fn decode_two_immediates(
    data: &[u8; OPERAND_WINDOW],
    header: usize,
    length_bits: usize,
    len: usize,
) -> (u32, u32) {
    let x_start = header + 1;
    let x_len = (length_bits & 7).min(4);
    let y_start = x_start + x_len;
    let y_len = len.saturating_sub(y_start).min(4);
    (
        decode_immediate(&data[x_start..x_start + x_len]),
        decode_immediate(&data[y_start..y_start + y_len]),
    )
}

/// Number of bytes needed to encode `imm` so it decodes back unchanged.
pub fn immediate_len(imm: u32) -> usize {
    (0..4)
        .find(|&n| decode_immediate(&imm.to_le_bytes()[..n]) == imm)
        .unwrap_or(4)
}

fn push_immediate(out: &mut Vec<u8>, imm: u32) {
    out.extend_from_slice(&imm.to_le_bytes()[..immediate_len(imm)]);
}
