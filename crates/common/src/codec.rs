//! Integer serialisation used by program blobs.
//!
//! Two encodings appear on the wire:
//!
//! - **Natural numbers**: a variable-length form whose first byte is a length
//!   prefix. The number of leading one bits `l` (0..=8) is the count of
//!   little-endian bytes that follow; the remaining low bits of the prefix
//!   (below the terminating zero bit) carry the most-significant part of the
//!   value. A prefix of `0xFF` is followed by a full 8-byte value.
//! - **Fixed-width** little-endian integers of 0..=8 bytes.

/// Decode a natural number from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// input ends before the encoding does.
pub fn decode_natural(bytes: &[u8]) -> Option<(u64, usize)> {
    let prefix = *bytes.first()?;
    let len = prefix.leading_ones() as usize;
    let rest = bytes.get(1..1 + len)?;
    let low = decode_fixed(rest);

    if len == 8 {
        return Some((low, 9));
    }

    let mask = 0xFFu8.checked_shr(len as u32 + 1).unwrap_or(0);
    let high = u64::from(prefix & mask);
    Some((low | (high << (8 * len)), len + 1))
}

/// Encode `value` as a natural number in its shortest form.
pub fn encode_natural(value: u64) -> Vec<u8> {
    for len in 0..8usize {
        if value < 1u64 << (7 * (len + 1)) {
            let prefix_ones = !(0xFFu8 >> len);
            let high = (value >> (8 * len)) as u8;
            let mut out = Vec::with_capacity(len + 1);
            out.push(prefix_ones | high);
            out.extend_from_slice(&value.to_le_bytes()[..len]);
            return out;
        }
    }

    let mut out = Vec::with_capacity(9);
    out.push(0xFF);
    out.extend_from_slice(&value.to_le_bytes());
    out
}

/// Decode a little-endian integer from up to 8 bytes. Extra bytes are ignored.
pub fn decode_fixed(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (8 * i)))
}

/// Encode the low `width` bytes of `value` little-endian. `width` is capped at 8.
pub fn encode_fixed(value: u64, width: usize) -> Vec<u8> {
    value.to_le_bytes()[..width.min(8)].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_byte_values() {
        assert_eq!(encode_natural(0), vec![0x00]);
        assert_eq!(encode_natural(127), vec![0x7F]);
        assert_eq!(decode_natural(&[0x05]), Some((5, 1)));
    }

    #[test]
    fn two_byte_boundary() {
        // 128 needs one trailing byte: prefix 0b10xx_xxxx
        assert_eq!(encode_natural(128), vec![0x80, 0x80]);
        assert_eq!(decode_natural(&[0x80, 0x80]), Some((128, 2)));
        assert_eq!(encode_natural(0x3FFF), vec![0xBF, 0xFF]);
    }

    #[test]
    fn full_width_prefix() {
        let bytes = encode_natural(u64::MAX);
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(bytes.len(), 9);
        assert_eq!(decode_natural(&bytes), Some((u64::MAX, 9)));
    }

    #[test]
    fn truncated_input() {
        assert_eq!(decode_natural(&[]), None);
        assert_eq!(decode_natural(&[0xC0, 0x01]), None);
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        assert_eq!(decode_natural(&[0x03, 0xAA, 0xBB]), Some((3, 1)));
    }

    #[test]
    fn fixed_width() {
        assert_eq!(decode_fixed(&[0x34, 0x12]), 0x1234);
        assert_eq!(decode_fixed(&[]), 0);
        assert_eq!(encode_fixed(0x0011_2233, 3), vec![0x33, 0x22, 0x11]);
        assert_eq!(encode_fixed(7, 0), Vec::<u8>::new());
    }

    proptest! {
        #[test]
        fn natural_roundtrip(value in any::<u64>()) {
            let bytes = encode_natural(value);
            prop_assert_eq!(decode_natural(&bytes), Some((value, bytes.len())));
        }

        #[test]
        fn natural_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..12)) {
            if let Some((_, used)) = decode_natural(&bytes) {
                prop_assert!(used <= bytes.len());
            }
        }
    }
}
