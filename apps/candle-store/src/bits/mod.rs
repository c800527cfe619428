//! Bit sequence utilities.
//!
//! [`BitBuf`] is a growable, MSB-first bit sequence backed by packed bytes.
//! Bit 0 of the sequence is the most significant bit of the first byte, so a
//! buffer converts to its on-disk form without reordering. Bits past `len`
//! inside the last byte are always zero, which makes the final byte
//! left-justified and zero-padded for free.
//!
//! [`OffsetTracker`] lives in [`offset`].

pub mod offset;

pub use offset::OffsetTracker;

use std::fmt;

/// Growable MSB-first bit sequence.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitBuf {
    bytes: Vec<u8>,
    len: usize,
}

impl BitBuf {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            len: 0,
        }
    }

    /// Create an empty buffer with room for `bits` bits.
    #[must_use]
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            len: 0,
        }
    }

    /// Encode the low-order `width` bits of `value`, most significant first.
    ///
    /// Higher-order bits of `value` are dropped. Widths above 64 are
    /// zero-extended on the left.
    #[must_use]
    pub fn from_unsigned(value: u64, width: usize) -> Self {
        let mut buf = Self::with_capacity(width);
        buf.push_unsigned(value, width);
        buf
    }

    /// Wrap whole bytes; the resulting length is `bytes.len() * 8`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Encode each character of an ASCII string as 8 bits.
    ///
    /// Callers validate ASCII beforehand; non-ASCII bytes are encoded as-is.
    #[must_use]
    pub fn from_ascii(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Number of bits held.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bits.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        let offset = self.len % 8;
        if offset == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> offset;
        }
        self.len += 1;
    }

    /// Append the low-order `width` bits of `value`, most significant first.
    pub fn push_unsigned(&mut self, value: u64, width: usize) {
        for i in (0..width).rev() {
            let bit = i < 64 && (value >> i) & 1 == 1;
            self.push(bit);
        }
    }

    /// Append every bit of `other`.
    pub fn extend(&mut self, other: &Self) {
        if self.len % 8 == 0 {
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
            return;
        }
        let whole = other.len / 8;
        for &byte in &other.bytes[..whole] {
            self.push_unsigned(u64::from(byte), 8);
        }
        let tail = other.len % 8;
        if tail > 0 {
            let byte = other.bytes[whole] >> (8 - tail);
            self.push_unsigned(u64::from(byte), tail);
        }
    }

    /// Concatenate several sequences in order.
    #[must_use]
    pub fn concat<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut out = Self::new();
        for part in parts {
            out.extend(part);
        }
        out
    }

    /// Read `width` bits starting at `start` as an unsigned integer.
    ///
    /// Returns `None` if the range runs past the end or `width > 64`.
    #[must_use]
    pub fn read_unsigned(&self, start: usize, width: usize) -> Option<u64> {
        if width > 64 || start.checked_add(width)? > self.len {
            return None;
        }
        let mut value = 0u64;
        for index in start..start + width {
            let bit = self.bytes[index / 8] & (0x80 >> (index % 8)) != 0;
            value = (value << 1) | u64::from(bit);
        }
        Some(value)
    }

    /// The whole buffer as an unsigned integer (at most 64 bits).
    #[must_use]
    pub fn to_unsigned(&self) -> Option<u64> {
        self.read_unsigned(0, self.len)
    }

    /// Copy of `len` bits starting at `start`.
    #[must_use]
    pub fn subset(&self, start: usize, len: usize) -> Option<Self> {
        if start.checked_add(len)? > self.len {
            return None;
        }
        let mut out = Self::with_capacity(len);
        for index in start..start + len {
            out.push(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0);
        }
        Some(out)
    }

    /// Overwrite bits starting at `start` with `bits`, growing as needed.
    pub fn insert_at(&mut self, start: usize, bits: &Self) {
        let end = start + bits.len;
        while self.len < end {
            self.push(false);
        }
        for (offset, bit) in bits.iter().enumerate() {
            let index = start + offset;
            let mask = 0x80 >> (index % 8);
            if bit {
                self.bytes[index / 8] |= mask;
            } else {
                self.bytes[index / 8] &= !mask;
            }
        }
    }

    /// Decode `chars` 8-bit ASCII characters starting at `start`.
    #[must_use]
    pub fn read_ascii(&self, start: usize, chars: usize) -> Option<String> {
        let mut text = String::with_capacity(chars);
        for i in 0..chars {
            let byte = self.read_unsigned(start + i * 8, 8)? as u8;
            if !byte.is_ascii() {
                return None;
            }
            text.push(char::from(byte));
        }
        Some(text)
    }

    /// Remove and return every complete leading byte.
    ///
    /// Only valid while the buffer starts on a byte boundary, which holds for
    /// buffers built by pushing from empty. The 0..=7 leftover bits stay.
    pub fn take_whole_bytes(&mut self) -> Vec<u8> {
        let whole = self.len / 8;
        let tail = self.len % 8;
        let rest = if tail > 0 {
            vec![self.bytes[whole]]
        } else {
            Vec::new()
        };
        let mut out = std::mem::replace(&mut self.bytes, rest);
        out.truncate(whole);
        self.len = tail;
        out
    }

    /// Packed bytes; a trailing partial byte is left-justified and zero-padded.
    #[must_use]
    pub fn as_padded_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into packed bytes, padding the last byte with zeros.
    #[must_use]
    pub fn into_padded_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Iterate over bits in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |index| self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }
}

impl fmt::Debug for BitBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitBuf({self})")
    }
}

impl fmt::Display for BitBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromIterator<bool> for BitBuf {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let mut buf = Self::new();
        for bit in iter {
            buf.push(bit);
        }
        buf
    }
}
