//! Mixed-radix (byte, bit) offset arithmetic.
//!
//! The random-access reader locates record `k` at
//! `header_bits + k * record_bits`. [`OffsetTracker`] accumulates that in
//! byte/bit form so the whole-byte part becomes a seek and the bit part a
//! skip inside the first byte read.

use std::fmt;

/// Bit-precise signed position: `byte_index * 8 + bit_index`.
///
/// `bit_index` is always normalized to `0..8`; negative positions borrow
/// from `byte_index` (e.g. -1 bit is byte -1, bit 7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OffsetTracker {
    byte_index: i64,
    bit_index: u8,
}

impl OffsetTracker {
    /// Create a tracker at `byte_index * 8 + bit_index`, normalizing the bit part.
    #[must_use]
    pub const fn new(byte_index: i64, bit_index: i64) -> Self {
        let mut tracker = Self {
            byte_index: 0,
            bit_index: 0,
        };
        tracker.add_multiple(1, byte_index, bit_index);
        tracker
    }

    /// Create a tracker from an absolute bit count.
    #[must_use]
    pub const fn from_bits(bits: i64) -> Self {
        Self::new(0, bits)
    }

    /// Whole bytes.
    #[must_use]
    pub const fn byte_index(&self) -> i64 {
        self.byte_index
    }

    /// Bits past `byte_index`, in `0..8`.
    #[must_use]
    pub const fn bit_index(&self) -> u8 {
        self.bit_index
    }

    /// Position as a plain bit count.
    #[must_use]
    pub const fn total_bits(&self) -> i64 {
        self.byte_index * 8 + self.bit_index as i64
    }

    /// Add `n * (bytes * 8 + bits)` bits.
    ///
    /// Any operand may be negative; carries and borrows keep `bit_index`
    /// in `0..8`.
    pub const fn add_multiple(&mut self, n: i64, bytes: i64, bits: i64) {
        let bit_sum = self.bit_index as i64 + n * bits;
        self.byte_index += n * bytes + bit_sum.div_euclid(8);
        self.bit_index = bit_sum.rem_euclid(8) as u8;
    }

    /// Subtract `n * (bytes * 8 + bits)` bits.
    pub const fn subtract_multiple(&mut self, n: i64, bytes: i64, bits: i64) {
        self.add_multiple(-n, bytes, bits);
    }
}

impl fmt::Display for OffsetTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.byte_index, self.bit_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_into_bytes() {
        let mut offset = OffsetTracker::default();
        offset.add_multiple(3, 0, 5);
        assert_eq!((offset.byte_index(), offset.bit_index()), (1, 7));
        offset.add_multiple(1, 2, 1);
        assert_eq!((offset.byte_index(), offset.bit_index()), (4, 0));
    }

    #[test]
    fn test_borrow_from_bytes() {
        let mut offset = OffsetTracker::new(2, 3);
        offset.subtract_multiple(1, 0, 4);
        assert_eq!((offset.byte_index(), offset.bit_index()), (1, 7));

        let negative = OffsetTracker::from_bits(-1);
        assert_eq!((negative.byte_index(), negative.bit_index()), (-1, 7));
        assert_eq!(negative.total_bits(), -1);
    }

    #[test]
    fn test_negative_multiplier() {
        let mut offset = OffsetTracker::new(10, 0);
        offset.add_multiple(-2, 1, 3);
        assert_eq!(offset.total_bits(), 80 - 22);
    }

    #[test]
    fn test_header_plus_records() {
        // 124-bit header, 44-bit records, third record
        let mut offset = OffsetTracker::from_bits(124);
        offset.add_multiple(2, 5, 4);
        assert_eq!((offset.byte_index(), offset.bit_index()), (26, 4));
    }

    #[test]
    fn test_display() {
        assert_eq!(OffsetTracker::new(5, 9).to_string(), "6:1");
    }
}
