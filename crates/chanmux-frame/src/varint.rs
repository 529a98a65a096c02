//! Unsigned LEB128 varints: 7 data bits per byte, least significant group
//! first, high bit set on every byte except the last.

use bytes::BufMut;

use crate::error::{FrameError, Result};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const DATA_MASK: u8 = 0x7f;

/// Number of bytes `value` occupies on the wire.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append the varint encoding of `value` to `dst`.
pub fn encode(value: u64, dst: &mut impl BufMut) {
    let mut value = value;
    while value >= u64::from(CONTINUATION) {
        dst.put_u8((value as u8 & DATA_MASK) | CONTINUATION);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decode a varint starting at `offset`.
///
/// Returns `Ok(None)` if `src` ends before the varint does, otherwise the
/// value and the number of bytes it occupied.
pub fn decode(src: &[u8], offset: usize) -> Result<Option<(u64, usize)>> {
    let mut acc = VarintAccumulator::new();
    for (consumed, byte) in src.iter().skip(offset).enumerate() {
        if let Some(value) = acc.push(*byte)? {
            return Ok(Some((value, consumed + 1)));
        }
    }
    Ok(None)
}

/// Incremental varint decoder fed one byte at a time.
///
/// Holds the partial value between transport chunks, so a varint split
/// across reads never needs to be re-buffered.
#[derive(Debug, Clone, Default)]
pub struct VarintAccumulator {
    value: u64,
    len: usize,
}

impl VarintAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte; yields the value once its last byte arrives.
    pub fn push(&mut self, byte: u8) -> Result<Option<u64>> {
        if self.len == MAX_VARINT_LEN {
            return Err(FrameError::InvalidVarint);
        }
        let shift = 7 * self.len as u32;
        let group = u64::from(byte & DATA_MASK);
        // The tenth byte may only carry the single remaining bit.
        if self.len == MAX_VARINT_LEN - 1 && group > 1 {
            return Err(FrameError::InvalidVarint);
        }
        self.value |= group << shift;
        self.len += 1;

        if byte & CONTINUATION != 0 {
            return Ok(None);
        }
        let value = self.value;
        self.reset();
        Ok(Some(value))
    }

    /// Whether any byte of a varint has been consumed.
    pub fn is_partial(&self) -> bool {
        self.len > 0
    }

    pub fn reset(&mut self) {
        self.value = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode(value, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn single_byte_values() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(1), vec![0x01]);
        assert_eq!(encoded(127), vec![0x7f]);
    }

    #[test]
    fn multi_byte_values() {
        assert_eq!(encoded(128), vec![0x80, 0x01]);
        assert_eq!(encoded(300), vec![0xac, 0x02]);
        assert_eq!(encoded(16_384), vec![0x80, 0x80, 0x01]);
    }

    #[test]
    fn encoded_len_matches_encoding() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(encoded_len(value), encoded(value).len(), "value {value}");
        }
        assert_eq!(encoded_len(u64::MAX), MAX_VARINT_LEN);
    }

    #[test]
    fn decode_at_offset() {
        let bytes = [0xff, 0xac, 0x02, 0x07];
        assert_eq!(decode(&bytes, 1).unwrap(), Some((300, 2)));
        assert_eq!(decode(&bytes, 3).unwrap(), Some((7, 1)));
    }

    #[test]
    fn decode_incomplete() {
        assert_eq!(decode(&[0x80, 0x80], 0).unwrap(), None);
        assert_eq!(decode(&[], 0).unwrap(), None);
    }

    #[test]
    fn decode_max_value() {
        let bytes = encoded(u64::MAX);
        assert_eq!(decode(&bytes, 0).unwrap(), Some((u64::MAX, MAX_VARINT_LEN)));
    }

    #[test]
    fn rejects_overlong_varint() {
        let bytes = [0x80; 11];
        assert!(matches!(decode(&bytes, 0), Err(FrameError::InvalidVarint)));
    }

    #[test]
    fn rejects_overflowing_tenth_byte() {
        let mut bytes = vec![0xff; 9];
        bytes.push(0x02);
        assert!(matches!(decode(&bytes, 0), Err(FrameError::InvalidVarint)));
    }

    #[test]
    fn accumulator_spans_pushes_and_resets() {
        let mut acc = VarintAccumulator::new();
        assert_eq!(acc.push(0xac).unwrap(), None);
        assert!(acc.is_partial());
        assert_eq!(acc.push(0x02).unwrap(), Some(300));
        assert!(!acc.is_partial());
        assert_eq!(acc.push(0x05).unwrap(), Some(5));
    }
}
