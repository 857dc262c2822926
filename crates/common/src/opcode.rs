//! Opcode definitions for the 64-bit PVM instruction set.
//!
//! Every opcode has a fixed byte value, an assembly mnemonic and an operand
//! [`Form`] that determines how the bytes following it are decoded. The table
//! is declared once in a single macro table so the enum, the byte mapping and the
//! mnemonic list cannot drift apart.

use crate::error::DecodeError;

/// Operand layout of an instruction, shared by every opcode with that layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    /// No operands.
    NoArgs,
    /// One immediate.
    Imm,
    /// One register and a full 8-byte immediate.
    RegExtImm,
    /// Two immediates, the first with an explicit length.
    TwoImm,
    /// One relative offset.
    Offset,
    /// One register and one immediate.
    RegImm,
    /// One register and two immediates.
    RegTwoImm,
    /// One register, one immediate and a relative offset.
    RegImmOffset,
    /// Two registers.
    TwoReg,
    /// Two registers and one immediate.
    TwoRegImm,
    /// Two registers and a relative offset.
    TwoRegOffset,
    /// Two registers and two immediates.
    TwoRegTwoImm,
    /// Three registers.
    ThreeReg,
}

macro_rules! opcodes {
    ($( $name:ident = $byte:literal, $mnemonic:literal, $form:ident; )*) => {
        /// Identifies the operation to perform.
        ///
        /// `#[repr(u8)]` pins each variant to its wire byte.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Opcode {
            $( $name = $byte, )*
        }

        /// All assigned opcodes, in byte order.
        pub const ALL_OPCODES: &[Opcode] = &[ $( Opcode::$name, )* ];

        impl TryFrom<u8> for Opcode {
            type Error = DecodeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $byte => Ok(Opcode::$name), )*
                    _ => Err(DecodeError::UnknownOpcode(value)),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this opcode.
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand layout of this opcode.
            pub fn form(&self) -> Form {
                match self {
                    $( Opcode::$name => Form::$form, )*
                }
            }
        }
    };
}

opcodes! {
    Trap = 0, "trap", NoArgs;
    Fallthrough = 1, "fallthrough", NoArgs;

    Ecalli = 10, "ecalli", Imm;

    LoadImm64 = 20, "load_imm_64", RegExtImm;

    StoreImmU8 = 30, "store_imm_u8", TwoImm;
    StoreImmU16 = 31, "store_imm_u16", TwoImm;
    StoreImmU32 = 32, "store_imm_u32", TwoImm;
    StoreImmU64 = 33, "store_imm_u64", TwoImm;

    Jump = 40, "jump", Offset;

    JumpInd = 50, "jump_ind", RegImm;
    LoadImm = 51, "load_imm", RegImm;
    LoadU8 = 52, "load_u8", RegImm;
    LoadI8 = 53, "load_i8", RegImm;
    LoadU16 = 54, "load_u16", RegImm;
    LoadI16 = 55, "load_i16", RegImm;
    LoadU32 = 56, "load_u32", RegImm;
    LoadI32 = 57, "load_i32", RegImm;
    LoadU64 = 58, "load_u64", RegImm;
    StoreU8 = 59, "store_u8", RegImm;
    StoreU16 = 60, "store_u16", RegImm;
    StoreU32 = 61, "store_u32", RegImm;
    StoreU64 = 62, "store_u64", RegImm;

    StoreImmIndU8 = 70, "store_imm_ind_u8", RegTwoImm;
    StoreImmIndU16 = 71, "store_imm_ind_u16", RegTwoImm;
    StoreImmIndU32 = 72, "store_imm_ind_u32", RegTwoImm;
    StoreImmIndU64 = 73, "store_imm_ind_u64", RegTwoImm;

    LoadImmJump = 80, "load_imm_jump", RegImmOffset;
    BranchEqImm = 81, "branch_eq_imm", RegImmOffset;
    BranchNeImm = 82, "branch_ne_imm", RegImmOffset;
    BranchLtUImm = 83, "branch_lt_u_imm", RegImmOffset;
    BranchLeUImm = 84, "branch_le_u_imm", RegImmOffset;
    BranchGeUImm = 85, "branch_ge_u_imm", RegImmOffset;
    BranchGtUImm = 86, "branch_gt_u_imm", RegImmOffset;
    BranchLtSImm = 87, "branch_lt_s_imm", RegImmOffset;
    BranchLeSImm = 88, "branch_le_s_imm", RegImmOffset;
    BranchGeSImm = 89, "branch_ge_s_imm", RegImmOffset;
    BranchGtSImm = 90, "branch_gt_s_imm", RegImmOffset;

    MoveReg = 100, "move_reg", TwoReg;
    Sbrk = 101, "sbrk", TwoReg;
    CountSetBits64 = 102, "count_set_bits_64", TwoReg;
    CountSetBits32 = 103, "count_set_bits_32", TwoReg;
    LeadingZeroBits64 = 104, "leading_zero_bits_64", TwoReg;
    LeadingZeroBits32 = 105, "leading_zero_bits_32", TwoReg;
    TrailingZeroBits64 = 106, "trailing_zero_bits_64", TwoReg;
    TrailingZeroBits32 = 107, "trailing_zero_bits_32", TwoReg;
    SignExtend8 = 108, "sign_extend_8", TwoReg;
    SignExtend16 = 109, "sign_extend_16", TwoReg;
    ZeroExtend16 = 110, "zero_extend_16", TwoReg;
    ReverseBytes = 111, "reverse_bytes", TwoReg;

    StoreIndU8 = 120, "store_ind_u8", TwoRegImm;
    StoreIndU16 = 121, "store_ind_u16", TwoRegImm;
    StoreIndU32 = 122, "store_ind_u32", TwoRegImm;
    StoreIndU64 = 123, "store_ind_u64", TwoRegImm;
    LoadIndU8 = 124, "load_ind_u8", TwoRegImm;
    LoadIndI8 = 125, "load_ind_i8", TwoRegImm;
    LoadIndU16 = 126, "load_ind_u16", TwoRegImm;
    LoadIndI16 = 127, "load_ind_i16", TwoRegImm;
    LoadIndU32 = 128, "load_ind_u32", TwoRegImm;
    LoadIndI32 = 129, "load_ind_i32", TwoRegImm;
    LoadIndU64 = 130, "load_ind_u64", TwoRegImm;
    AddImm32 = 131, "add_imm_32", TwoRegImm;
    AndImm = 132, "and_imm", TwoRegImm;
    XorImm = 133, "xor_imm", TwoRegImm;
    OrImm = 134, "or_imm", TwoRegImm;
    MulImm32 = 135, "mul_imm_32", TwoRegImm;
    SetLtUImm = 136, "set_lt_u_imm", TwoRegImm;
    SetLtSImm = 137, "set_lt_s_imm", TwoRegImm;
    ShloLImm32 = 138, "shlo_l_imm_32", TwoRegImm;
    ShloRImm32 = 139, "shlo_r_imm_32", TwoRegImm;
    SharRImm32 = 140, "shar_r_imm_32", TwoRegImm;
    NegAddImm32 = 141, "neg_add_imm_32", TwoRegImm;
    SetGtUImm = 142, "set_gt_u_imm", TwoRegImm;
    SetGtSImm = 143, "set_gt_s_imm", TwoRegImm;
    ShloLImmAlt32 = 144, "shlo_l_imm_alt_32", TwoRegImm;
    ShloRImmAlt32 = 145, "shlo_r_imm_alt_32", TwoRegImm;
    SharRImmAlt32 = 146, "shar_r_imm_alt_32", TwoRegImm;
    CmovIzImm = 147, "cmov_iz_imm", TwoRegImm;
    CmovNzImm = 148, "cmov_nz_imm", TwoRegImm;
    AddImm64 = 149, "add_imm_64", TwoRegImm;
    MulImm64 = 150, "mul_imm_64", TwoRegImm;
    ShloLImm64 = 151, "shlo_l_imm_64", TwoRegImm;
    ShloRImm64 = 152, "shlo_r_imm_64", TwoRegImm;
    SharRImm64 = 153, "shar_r_imm_64", TwoRegImm;
    NegAddImm64 = 154, "neg_add_imm_64", TwoRegImm;
    ShloLImmAlt64 = 155, "shlo_l_imm_alt_64", TwoRegImm;
    ShloRImmAlt64 = 156, "shlo_r_imm_alt_64", TwoRegImm;
    SharRImmAlt64 = 157, "shar_r_imm_alt_64", TwoRegImm;
    RotR64Imm = 158, "rot_r_64_imm", TwoRegImm;
    RotR64ImmAlt = 159, "rot_r_64_imm_alt", TwoRegImm;
    RotR32Imm = 160, "rot_r_32_imm", TwoRegImm;
    RotR32ImmAlt = 161, "rot_r_32_imm_alt", TwoRegImm;

    BranchEq = 170, "branch_eq", TwoRegOffset;
    BranchNe = 171, "branch_ne", TwoRegOffset;
    BranchLtU = 172, "branch_lt_u", TwoRegOffset;
    BranchLtS = 173, "branch_lt_s", TwoRegOffset;
    BranchGeU = 174, "branch_ge_u", TwoRegOffset;
    BranchGeS = 175, "branch_ge_s", TwoRegOffset;

    LoadImmJumpInd = 180, "load_imm_jump_ind", TwoRegTwoImm;

    Add32 = 190, "add_32", ThreeReg;
    Sub32 = 191, "sub_32", ThreeReg;
    Mul32 = 192, "mul_32", ThreeReg;
    DivU32 = 193, "div_u_32", ThreeReg;
    DivS32 = 194, "div_s_32", ThreeReg;
    RemU32 = 195, "rem_u_32", ThreeReg;
    RemS32 = 196, "rem_s_32", ThreeReg;
    ShloL32 = 197, "shlo_l_32", ThreeReg;
    ShloR32 = 198, "shlo_r_32", ThreeReg;
    SharR32 = 199, "shar_r_32", ThreeReg;
    Add64 = 200, "add_64", ThreeReg;
    Sub64 = 201, "sub_64", ThreeReg;
    Mul64 = 202, "mul_64", ThreeReg;
    DivU64 = 203, "div_u_64", ThreeReg;
    DivS64 = 204, "div_s_64", ThreeReg;
    RemU64 = 205, "rem_u_64", ThreeReg;
    RemS64 = 206, "rem_s_64", ThreeReg;
    ShloL64 = 207, "shlo_l_64", ThreeReg;
    ShloR64 = 208, "shlo_r_64", ThreeReg;
    SharR64 = 209, "shar_r_64", ThreeReg;
    And = 210, "and", ThreeReg;
    Xor = 211, "xor", ThreeReg;
    Or = 212, "or", ThreeReg;
    MulUpperSS = 213, "mul_upper_s_s", ThreeReg;
    MulUpperUU = 214, "mul_upper_u_u", ThreeReg;
    MulUpperSU = 215, "mul_upper_s_u", ThreeReg;
    SetLtU = 216, "set_lt_u", ThreeReg;
    SetLtS = 217, "set_lt_s", ThreeReg;
    CmovIz = 218, "cmov_iz", ThreeReg;
    CmovNz = 219, "cmov_nz", ThreeReg;
    RotL64 = 220, "rot_l_64", ThreeReg;
    RotL32 = 221, "rot_l_32", ThreeReg;
    RotR64 = 222, "rot_r_64", ThreeReg;
    RotR32 = 223, "rot_r_32", ThreeReg;
    AndInv = 224, "and_inv", ThreeReg;
    OrInv = 225, "or_inv", ThreeReg;
    Xnor = 226, "xnor", ThreeReg;
    Max = 227, "max", ThreeReg;
    MaxU = 228, "max_u", ThreeReg;
    Min = 229, "min", ThreeReg;
    MinU = 230, "min_u", ThreeReg;
}

impl Opcode {
    /// Whether this opcode ends a basic block.
    ///
    /// The set is consensus-critical: the instruction following any of these
    /// is a valid jump target, and no other position is.
    pub fn is_block_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Trap
                | Opcode::Fallthrough
                | Opcode::Jump
                | Opcode::JumpInd
                | Opcode::LoadImmJump
                | Opcode::LoadImmJumpInd
                | Opcode::BranchEq
                | Opcode::BranchNe
                | Opcode::BranchGeU
                | Opcode::BranchGeS
                | Opcode::BranchLtU
                | Opcode::BranchLtS
                | Opcode::BranchEqImm
                | Opcode::BranchNeImm
                | Opcode::BranchLtUImm
                | Opcode::BranchLtSImm
                | Opcode::BranchLeUImm
                | Opcode::BranchLeSImm
                | Opcode::BranchGeUImm
                | Opcode::BranchGeSImm
                | Opcode::BranchGtUImm
                | Opcode::BranchGtSImm
        )
    }

    /// Gas charged for executing this opcode.
    pub fn gas_cost(&self) -> u64 {
        1
    }

    /// Look up an opcode by its assembly mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| op.mnemonic() == mnemonic)
    }
}
