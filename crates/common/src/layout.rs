//! Address-space constants shared by the blob parsers and the memory subsystem.
//!
//! These values are consensus-critical; every node must lay programs out at
//! exactly these addresses.

/// Size of a memory page in bytes.
pub const PAGE_SIZE: u32 = 1 << 12;

/// Size of a zone, the alignment unit between standard memory regions.
pub const ZONE_SIZE: u32 = 1 << 16;

/// Space reserved for the invocation argument.
pub const INPUT_SIZE: u32 = 1 << 24;

/// Dynamic-jump addresses are multiples of this factor.
pub const JUMP_ALIGNMENT: u32 = 2;

/// Jumping to this address halts the machine.
pub const HALT_ADDRESS: u32 = 0xFFFF_0000;

/// Number of pages in the 32-bit address space.
pub const PAGE_COUNT: u32 = 1 << 20;

/// One past the highest stack address of a standard program.
pub const STACK_BASE: u32 = (u32::MAX - 2 * ZONE_SIZE - INPUT_SIZE) + 1;

/// Start of the argument region of a standard program.
pub const INPUT_START: u32 = STACK_BASE + ZONE_SIZE;

/// Round `len` up to a whole number of pages.
pub fn align_to_page(len: u64) -> u64 {
    len.div_ceil(u64::from(PAGE_SIZE)) * u64::from(PAGE_SIZE)
}

/// Round `len` up to a whole number of zones.
pub fn align_to_zone(len: u64) -> u64 {
    len.div_ceil(u64::from(ZONE_SIZE)) * u64::from(ZONE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_addresses() {
        assert_eq!(STACK_BASE, 0xFEFE_0000);
        assert_eq!(INPUT_START, 0xFEFF_0000);
        assert_eq!(HALT_ADDRESS, (u32::MAX - ZONE_SIZE) + 1);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_to_page(0), 0);
        assert_eq!(align_to_page(1), 4096);
        assert_eq!(align_to_page(4096), 4096);
        assert_eq!(align_to_zone(65537), 131072);
    }
}
