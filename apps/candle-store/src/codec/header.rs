//! Two-tier binary header.
//!
//! Tier 1 is always 89 bits:
//!
//! | field            | bits |
//! |------------------|------|
//! | freeform tag     | 10   |
//! | interval seconds | 25   |
//! | count width      | 5    |
//! | record bits      | 9    |
//! | gap width        | 3    |
//! | timestamp width  | 6    |
//! | price whole      | 6    |
//! | price fraction   | 6    |
//! | volume whole     | 6    |
//! | volume fraction  | 6    |
//! | symbol bits      | 7    |
//!
//! Tier 2 is sized by tier 1: the ASCII symbol (8 bits per character), the
//! record count (`count width` bits) and a zero gap (`gap width` bits) that
//! exists only to pad the header to a byte boundary.
//!
//! [`Header`] is an immutable value. A writer takes a fresh snapshot with the
//! final record count for every write instead of mutating a shared instance.

use std::io::Read;

use tracing::debug;

use crate::bits::BitBuf;
use crate::codec::quantize::fraction_digits;
use crate::error::{Result, StoreError};

/// Bits in tier 1.
pub const TIER1_BITS: usize = 89;

/// Bytes read before tier 1 can be decoded.
pub const TIER1_BYTES: usize = TIER1_BITS.div_ceil(8);

const FREEFORM_BITS: u32 = 10;
const INTERVAL_BITS: u32 = 25;
const COUNT_WIDTH_BITS: u32 = 5;
const RECORD_BITS_BITS: u32 = 9;
const GAP_WIDTH_BITS: u32 = 3;
const FIELD_WIDTH_BITS: u32 = 6;
const SYMBOL_BITS_BITS: u32 = 7;

/// Largest free-form tag.
pub const MAX_FREEFORM: u16 = (1 << FREEFORM_BITS) - 1;
/// Largest interval in seconds.
pub const MAX_INTERVAL_SECS: u32 = (1 << INTERVAL_BITS) - 1;
/// Largest record-count width.
pub const MAX_COUNT_WIDTH: u8 = (1 << COUNT_WIDTH_BITS) - 1;
/// Largest per-record length in bits.
pub const MAX_RECORD_BITS: usize = (1 << RECORD_BITS_BITS) - 1;
/// Largest gap width.
pub const MAX_GAP_WIDTH: u8 = (1 << GAP_WIDTH_BITS) - 1;
/// Largest timestamp / price / volume field width.
pub const MAX_FIELD_WIDTH: u8 = (1 << FIELD_WIDTH_BITS) - 1;
/// Longest symbol in characters (`8 * chars` must fit 7 bits).
pub const MAX_SYMBOL_CHARS: usize = ((1 << SYMBOL_BITS_BITS) - 1) / 8;

/// Gap width that byte-aligns a header with this symbol and count width.
#[must_use]
pub const fn aligned_gap_width(symbol_chars: usize, count_width: u8) -> u8 {
    let unpadded = TIER1_BITS + symbol_chars * 8 + count_width as usize;
    ((8 - unpadded % 8) % 8) as u8
}

/// Header describing one candle stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    freeform: u16,
    interval_secs: u32,
    count_width: u8,
    gap_width: u8,
    timestamp_width: u8,
    price_whole_width: u8,
    price_fraction_width: u8,
    volume_whole_width: u8,
    volume_fraction_width: u8,
    symbol: String,
    record_count: u64,
}

impl Header {
    /// Build a header from explicit widths with a record count of zero.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any value does not fit its field.
    pub fn from_widths(
        symbol: &str,
        interval_secs: u32,
        freeform: u16,
        count_width: u8,
        gap_width: u8,
        timestamp_width: u8,
        price_whole_width: u8,
        price_fraction_width: u8,
        volume_whole_width: u8,
        volume_fraction_width: u8,
    ) -> Result<Self> {
        HeaderBuilder::new(symbol)
            .interval(interval_secs)
            .freeform(freeform)
            .count_width(count_width)
            .gap_width(gap_width)
            .timestamp_width(timestamp_width)
            .price_widths(price_whole_width, price_fraction_width)
            .volume_widths(volume_whole_width, volume_fraction_width)
            .build()
    }

    /// Start a builder with the standard widths and an aligned gap.
    #[must_use]
    pub fn builder(symbol: &str) -> HeaderBuilder {
        HeaderBuilder::new(symbol)
    }

    /// Tiny widths (4-bit fields, 3-bit count) for tests and demos.
    pub fn mini(symbol: &str, interval_secs: u32, gap_width: u8) -> Result<Self> {
        HeaderBuilder::mini(symbol)
            .interval(interval_secs)
            .gap_width(gap_width)
            .build()
    }

    /// Standard widths with an explicit gap.
    pub fn standard(symbol: &str, interval_secs: u32, gap_width: u8) -> Result<Self> {
        HeaderBuilder::new(symbol)
            .interval(interval_secs)
            .gap_width(gap_width)
            .build()
    }

    /// Standard widths with a byte-aligned header.
    pub fn standard_aligned(symbol: &str, interval_secs: u32) -> Result<Self> {
        HeaderBuilder::new(symbol).interval(interval_secs).build()
    }

    /// Widest layout: 63-bit timestamp, 31-bit count, 52-bit values.
    pub fn wide_aligned(
        symbol: &str,
        interval_secs: u32,
        price_fraction_width: u8,
        volume_fraction_width: u8,
    ) -> Result<Self> {
        HeaderBuilder::wide(symbol, price_fraction_width, volume_fraction_width)?
            .interval(interval_secs)
            .build()
    }

    /// Copy with a new record count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordCountOverflow`] if `count` needs more than
    /// `count_width` bits.
    pub fn with_record_count(&self, count: u64) -> Result<Self> {
        check_count(count, self.count_width)?;
        Ok(Self {
            record_count: count,
            ..self.clone()
        })
    }

    /// Copy with a new gap width.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidGapWidth`] unless `gap_width` is in `0..=7`.
    pub fn with_gap_width(&self, gap_width: u8) -> Result<Self> {
        if gap_width > MAX_GAP_WIDTH {
            return Err(StoreError::InvalidGapWidth(gap_width));
        }
        Ok(Self {
            gap_width,
            ..self.clone()
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Ticker symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Candle interval in seconds. Metadata only.
    #[must_use]
    pub const fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    /// Opaque free-form tag.
    #[must_use]
    pub const fn freeform(&self) -> u16 {
        self.freeform
    }

    /// Width of the record-count field.
    #[must_use]
    pub const fn count_width(&self) -> u8 {
        self.count_width
    }

    /// Width of the gap field.
    #[must_use]
    pub const fn gap_width(&self) -> u8 {
        self.gap_width
    }

    /// Width of the timestamp field.
    #[must_use]
    pub const fn timestamp_width(&self) -> u8 {
        self.timestamp_width
    }

    /// Width of each price whole field.
    #[must_use]
    pub const fn price_whole_width(&self) -> u8 {
        self.price_whole_width
    }

    /// Width of each price fraction field.
    #[must_use]
    pub const fn price_fraction_width(&self) -> u8 {
        self.price_fraction_width
    }

    /// Width of the volume whole field.
    #[must_use]
    pub const fn volume_whole_width(&self) -> u8 {
        self.volume_whole_width
    }

    /// Width of the volume fraction field.
    #[must_use]
    pub const fn volume_fraction_width(&self) -> u8 {
        self.volume_fraction_width
    }

    /// Records the stream holds.
    #[must_use]
    pub const fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Decimal digits kept for prices.
    #[must_use]
    pub const fn price_digits(&self) -> u8 {
        fraction_digits(self.price_fraction_width)
    }

    /// Decimal digits kept for volume.
    #[must_use]
    pub const fn volume_digits(&self) -> u8 {
        fraction_digits(self.volume_fraction_width)
    }

    /// Bits per record: timestamp + 4 prices + volume.
    #[must_use]
    pub const fn record_bits(&self) -> usize {
        record_bits_for(
            self.timestamp_width,
            self.price_whole_width,
            self.price_fraction_width,
            self.volume_whole_width,
            self.volume_fraction_width,
        )
    }

    /// Bits of the symbol field.
    #[must_use]
    pub fn symbol_bits(&self) -> usize {
        self.symbol.len() * 8
    }

    /// Bits in tier 2.
    #[must_use]
    pub fn tier2_bits(&self) -> usize {
        self.symbol_bits() + self.count_width as usize + self.gap_width as usize
    }

    /// Bits in the whole header.
    #[must_use]
    pub fn header_bits(&self) -> usize {
        TIER1_BITS + self.tier2_bits()
    }

    /// Bytes touched by the header, including a partial last byte.
    #[must_use]
    pub fn header_bytes(&self) -> usize {
        self.header_bits().div_ceil(8)
    }

    /// Whether records start on a byte boundary.
    #[must_use]
    pub fn is_byte_aligned(&self) -> bool {
        self.header_bits() % 8 == 0
    }

    /// Exact byte length of a stream holding `records` records.
    #[must_use]
    pub fn stream_len(&self, records: u64) -> u64 {
        (self.header_bits() as u64 + records * self.record_bits() as u64).div_ceil(8)
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    /// Tier 1 then tier 2, in declaration order.
    #[must_use]
    pub fn to_flat_bits(&self) -> BitBuf {
        let mut bits = BitBuf::with_capacity(self.header_bits());
        bits.push_unsigned(u64::from(self.freeform), FREEFORM_BITS as usize);
        bits.push_unsigned(u64::from(self.interval_secs), INTERVAL_BITS as usize);
        bits.push_unsigned(u64::from(self.count_width), COUNT_WIDTH_BITS as usize);
        bits.push_unsigned(self.record_bits() as u64, RECORD_BITS_BITS as usize);
        bits.push_unsigned(u64::from(self.gap_width), GAP_WIDTH_BITS as usize);
        for width in [
            self.timestamp_width,
            self.price_whole_width,
            self.price_fraction_width,
            self.volume_whole_width,
            self.volume_fraction_width,
        ] {
            bits.push_unsigned(u64::from(width), FIELD_WIDTH_BITS as usize);
        }
        bits.push_unsigned(self.symbol_bits() as u64, SYMBOL_BITS_BITS as usize);

        bits.extend(&BitBuf::from_ascii(&self.symbol));
        bits.push_unsigned(self.record_count, self.count_width as usize);
        bits.push_unsigned(0, self.gap_width as usize);
        bits
    }

    // -------------------------------------------------------------------------
    // Decoding
    // -------------------------------------------------------------------------

    /// Decode a header from the start of `bits`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TruncatedHeader`] if `bits` ends early and
    /// [`StoreError::MalformedHeader`] if the fields are inconsistent.
    pub fn from_bits(bits: &BitBuf) -> Result<Self> {
        let tier1 = Tier1::decode(bits)?;
        let total = TIER1_BITS + tier1.tier2_bits();
        if bits.len() < total {
            return Err(StoreError::TruncatedHeader {
                needed_bits: total as u64,
                available_bits: bits.len() as u64,
            });
        }
        tier1.finish(bits)
    }

    /// Two-pass decode from a byte stream.
    ///
    /// Pass 1 reads the 12 bytes covering tier 1. Pass 2 reads exactly the
    /// bytes tier 1 says tier 2 needs. Returns the header and the bits read
    /// past its end (0..=7 bits of the first record).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TruncatedHeader`] on a short stream,
    /// [`StoreError::MalformedHeader`] on inconsistent fields and
    /// [`StoreError::Io`] on read failure.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<(Self, BitBuf)> {
        let mut first = [0u8; TIER1_BYTES];
        read_header_bytes(reader, &mut first, TIER1_BITS, 0)?;
        let mut bits = BitBuf::from_bytes(&first);
        let tier1 = Tier1::decode(&bits)?;

        let total_bits = TIER1_BITS + tier1.tier2_bits();
        let remaining = total_bits.div_ceil(8).saturating_sub(TIER1_BYTES);
        if remaining > 0 {
            let mut rest = vec![0u8; remaining];
            read_header_bytes(reader, &mut rest, total_bits, TIER1_BYTES)?;
            bits.extend(&BitBuf::from_bytes(&rest));
        }

        let header = tier1.finish(&bits)?;
        let leftover = bits
            .subset(total_bits, bits.len() - total_bits)
            .unwrap_or_default();
        debug!(
            symbol = header.symbol(),
            records = header.record_count(),
            header_bits = total_bits,
            "Decoded header"
        );
        Ok((header, leftover))
    }
}

/// Tier-1 fields, decoded before tier 2's size is known.
#[derive(Debug, Clone, Copy)]
struct Tier1 {
    freeform: u16,
    interval_secs: u32,
    count_width: u8,
    record_bits: usize,
    gap_width: u8,
    timestamp_width: u8,
    price_whole_width: u8,
    price_fraction_width: u8,
    volume_whole_width: u8,
    volume_fraction_width: u8,
    symbol_bits: usize,
}

impl Tier1 {
    fn decode(bits: &BitBuf) -> Result<Self> {
        if bits.len() < TIER1_BITS {
            return Err(StoreError::TruncatedHeader {
                needed_bits: TIER1_BITS as u64,
                available_bits: bits.len() as u64,
            });
        }
        let mut cursor = 0usize;
        let mut next = |width: u32| {
            let value = bits.read_unsigned(cursor, width as usize).unwrap_or(0);
            cursor += width as usize;
            value
        };
        Ok(Self {
            freeform: next(FREEFORM_BITS) as u16,
            interval_secs: next(INTERVAL_BITS) as u32,
            count_width: next(COUNT_WIDTH_BITS) as u8,
            record_bits: next(RECORD_BITS_BITS) as usize,
            gap_width: next(GAP_WIDTH_BITS) as u8,
            timestamp_width: next(FIELD_WIDTH_BITS) as u8,
            price_whole_width: next(FIELD_WIDTH_BITS) as u8,
            price_fraction_width: next(FIELD_WIDTH_BITS) as u8,
            volume_whole_width: next(FIELD_WIDTH_BITS) as u8,
            volume_fraction_width: next(FIELD_WIDTH_BITS) as u8,
            symbol_bits: next(SYMBOL_BITS_BITS) as usize,
        })
    }

    const fn tier2_bits(&self) -> usize {
        self.symbol_bits + self.count_width as usize + self.gap_width as usize
    }

    fn finish(self, bits: &BitBuf) -> Result<Header> {
        if self.symbol_bits % 8 != 0 {
            return Err(StoreError::MalformedHeader(format!(
                "symbol field is {} bits, not a whole number of characters",
                self.symbol_bits
            )));
        }
        let computed = record_bits_for(
            self.timestamp_width,
            self.price_whole_width,
            self.price_fraction_width,
            self.volume_whole_width,
            self.volume_fraction_width,
        );
        if computed != self.record_bits {
            return Err(StoreError::MalformedHeader(format!(
                "stored record length {} does not match field widths ({computed})",
                self.record_bits
            )));
        }

        let symbol = bits
            .read_ascii(TIER1_BITS, self.symbol_bits / 8)
            .ok_or_else(|| StoreError::MalformedHeader("symbol is not ASCII".to_string()))?;
        let count_start = TIER1_BITS + self.symbol_bits;
        let record_count = bits
            .read_unsigned(count_start, self.count_width as usize)
            .ok_or(StoreError::TruncatedHeader {
                needed_bits: (count_start + self.count_width as usize) as u64,
                available_bits: bits.len() as u64,
            })?;

        Ok(Header {
            freeform: self.freeform,
            interval_secs: self.interval_secs,
            count_width: self.count_width,
            gap_width: self.gap_width,
            timestamp_width: self.timestamp_width,
            price_whole_width: self.price_whole_width,
            price_fraction_width: self.price_fraction_width,
            volume_whole_width: self.volume_whole_width,
            volume_fraction_width: self.volume_fraction_width,
            symbol,
            record_count,
        })
    }
}

const fn record_bits_for(
    timestamp: u8,
    price_whole: u8,
    price_fraction: u8,
    volume_whole: u8,
    volume_fraction: u8,
) -> usize {
    timestamp as usize
        + 4 * (price_whole as usize + price_fraction as usize)
        + volume_whole as usize
        + volume_fraction as usize
}

const fn check_count(count: u64, width: u8) -> Result<()> {
    if width < 64 && count >> width != 0 {
        return Err(StoreError::RecordCountOverflow { count, width });
    }
    Ok(())
}

/// Fill `buf` or report how many header bits were actually available.
fn read_header_bytes<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    needed_bits: usize,
    already_read: usize,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(StoreError::TruncatedHeader {
                    needed_bits: needed_bits as u64,
                    available_bits: ((already_read + filled) * 8) as u64,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Header`].
///
/// Defaults to the standard layout (16-bit count, 44-bit timestamp, 31/15-bit
/// prices and volume) with a byte-aligned gap.
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    symbol: String,
    interval_secs: u32,
    freeform: u16,
    count_width: u8,
    gap_width: Option<u8>,
    timestamp_width: u8,
    price_whole_width: u8,
    price_fraction_width: u8,
    volume_whole_width: u8,
    volume_fraction_width: u8,
    record_count: u64,
}

impl HeaderBuilder {
    /// Create a builder with the standard widths.
    #[must_use]
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval_secs: 0,
            freeform: 0,
            count_width: 16,
            gap_width: None,
            timestamp_width: 44,
            price_whole_width: 31,
            price_fraction_width: 15,
            volume_whole_width: 31,
            volume_fraction_width: 15,
            record_count: 0,
        }
    }

    /// Builder with 4-bit timestamp and value fields and a 3-bit count.
    #[must_use]
    pub fn mini(symbol: &str) -> Self {
        Self::new(symbol)
            .count_width(3)
            .timestamp_width(4)
            .price_widths(4, 4)
            .volume_widths(4, 4)
    }

    /// Builder with the widest layout. Whole widths are `52 - fraction`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidWidth`] if a fraction width exceeds 52.
    pub fn wide(
        symbol: &str,
        price_fraction_width: u8,
        volume_fraction_width: u8,
    ) -> Result<Self> {
        const WIDE_VALUE_BITS: u8 = 52;
        for (field, width) in [
            ("price_fraction_width", price_fraction_width),
            ("volume_fraction_width", volume_fraction_width),
        ] {
            if width > WIDE_VALUE_BITS {
                return Err(StoreError::InvalidWidth {
                    field,
                    width: u64::from(width),
                    max: u64::from(WIDE_VALUE_BITS),
                });
            }
        }
        Ok(Self::new(symbol)
            .count_width(MAX_COUNT_WIDTH)
            .timestamp_width(MAX_FIELD_WIDTH)
            .price_widths(WIDE_VALUE_BITS - price_fraction_width, price_fraction_width)
            .volume_widths(
                WIDE_VALUE_BITS - volume_fraction_width,
                volume_fraction_width,
            ))
    }

    /// Set the interval in seconds.
    #[must_use]
    pub const fn interval(mut self, secs: u32) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set the free-form tag.
    #[must_use]
    pub const fn freeform(mut self, tag: u16) -> Self {
        self.freeform = tag;
        self
    }

    /// Set the record-count width.
    #[must_use]
    pub const fn count_width(mut self, width: u8) -> Self {
        self.count_width = width;
        self
    }

    /// Use an explicit gap width.
    #[must_use]
    pub const fn gap_width(mut self, width: u8) -> Self {
        self.gap_width = Some(width);
        self
    }

    /// Pick the gap width that byte-aligns the header.
    #[must_use]
    pub const fn aligned_gap(mut self) -> Self {
        self.gap_width = None;
        self
    }

    /// Set the timestamp width.
    #[must_use]
    pub const fn timestamp_width(mut self, width: u8) -> Self {
        self.timestamp_width = width;
        self
    }

    /// Set price whole and fraction widths.
    #[must_use]
    pub const fn price_widths(mut self, whole: u8, fraction: u8) -> Self {
        self.price_whole_width = whole;
        self.price_fraction_width = fraction;
        self
    }

    /// Set volume whole and fraction widths.
    #[must_use]
    pub const fn volume_widths(mut self, whole: u8, fraction: u8) -> Self {
        self.volume_whole_width = whole;
        self.volume_fraction_width = fraction;
        self
    }

    /// Set the initial record count.
    #[must_use]
    pub const fn record_count(mut self, count: u64) -> Self {
        self.record_count = count;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first field that does not
    /// fit its descriptor.
    pub fn build(self) -> Result<Header> {
        if !self.symbol.is_ascii() {
            return Err(StoreError::NonAsciiSymbol(self.symbol));
        }
        if self.symbol.len() > MAX_SYMBOL_CHARS {
            return Err(StoreError::SymbolTooLong {
                symbol: self.symbol,
                max_chars: MAX_SYMBOL_CHARS,
            });
        }
        check_width("freeform", u64::from(self.freeform), u64::from(MAX_FREEFORM))?;
        check_width(
            "interval_secs",
            u64::from(self.interval_secs),
            u64::from(MAX_INTERVAL_SECS),
        )?;
        check_width(
            "count_width",
            u64::from(self.count_width),
            u64::from(MAX_COUNT_WIDTH),
        )?;
        for (field, width) in [
            ("timestamp_width", self.timestamp_width),
            ("price_whole_width", self.price_whole_width),
            ("price_fraction_width", self.price_fraction_width),
            ("volume_whole_width", self.volume_whole_width),
            ("volume_fraction_width", self.volume_fraction_width),
        ] {
            check_width(field, u64::from(width), u64::from(MAX_FIELD_WIDTH))?;
        }

        let gap_width = match self.gap_width {
            Some(gap) if gap > MAX_GAP_WIDTH => return Err(StoreError::InvalidGapWidth(gap)),
            Some(gap) => gap,
            None => aligned_gap_width(self.symbol.len(), self.count_width),
        };

        let header = Header {
            freeform: self.freeform,
            interval_secs: self.interval_secs,
            count_width: self.count_width,
            gap_width,
            timestamp_width: self.timestamp_width,
            price_whole_width: self.price_whole_width,
            price_fraction_width: self.price_fraction_width,
            volume_whole_width: self.volume_whole_width,
            volume_fraction_width: self.volume_fraction_width,
            symbol: self.symbol,
            record_count: 0,
        };
        check_width(
            "record_bits",
            header.record_bits() as u64,
            MAX_RECORD_BITS as u64,
        )?;
        header.with_record_count(self.record_count)
    }
}

const fn check_width(field: &'static str, width: u64, max: u64) -> Result<()> {
    if width > max {
        return Err(StoreError::InvalidWidth { field, width, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_case::test_case;

    fn mini_test() -> Header {
        Header::mini("TEST", 60, 0).unwrap()
    }

    #[test]
    fn test_mini_header_layout() {
        let header = mini_test();
        assert_eq!(header.record_bits(), 44);
        assert_eq!(header.symbol_bits(), 32);
        assert_eq!(header.tier2_bits(), 35);
        assert_eq!(header.header_bits(), 124);
        assert!(!header.is_byte_aligned());
        assert_eq!(header.price_digits(), 1);
        assert_eq!(header.volume_digits(), 1);
    }

    #[test]
    fn test_flat_bits_match_scenario_prefix() {
        let header = mini_test().with_record_count(1).unwrap();
        let bytes = header.to_flat_bits().into_padded_bytes();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x00, 0x00, 0x07, 0x83, 0x16, 0x01, 0x04, 0x10, 0x41, 0x10, 0x2A, 0x22,
                0xA9, 0xAA, 0x10
            ]
        );
    }

    #[test]
    fn test_flat_bits_idempotent() {
        let header = Header::standard_aligned("AAPL", 60).unwrap();
        assert_eq!(header.to_flat_bits(), header.to_flat_bits());
    }

    #[test]
    fn test_bits_round_trip() {
        let header = Header::builder("MSFT")
            .interval(300)
            .freeform(513)
            .record_count(42)
            .build()
            .unwrap();
        let decoded = Header::from_bits(&header.to_flat_bits()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_reader_two_pass_returns_leftover_bits() {
        let header = mini_test().with_record_count(1).unwrap();
        let mut bits = header.to_flat_bits();
        bits.push_unsigned(0b1100, 4);
        let mut cursor = Cursor::new(bits.into_padded_bytes());
        let (decoded, leftover) = Header::from_reader(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(leftover.to_string(), "1100");
        assert_eq!(cursor.position(), 16);
    }

    #[test]
    fn test_reader_truncated() {
        let bytes = mini_test().to_flat_bits().into_padded_bytes();
        let mut cursor = Cursor::new(bytes[..13].to_vec());
        let err = Header::from_reader(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            StoreError::TruncatedHeader {
                needed_bits: 124,
                available_bits: 104
            }
        ));

        let mut short = Cursor::new(vec![0u8; 5]);
        assert!(matches!(
            Header::from_reader(&mut short),
            Err(StoreError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn test_malformed_record_length() {
        let mut bits = mini_test().to_flat_bits();
        // record bits field starts at bit 40
        bits.insert_at(40, &BitBuf::from_unsigned(51, 9));
        assert!(matches!(
            Header::from_bits(&bits),
            Err(StoreError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = mini_test();
        let updated = original.with_record_count(5).unwrap();
        assert_eq!(original.record_count(), 0);
        assert_eq!(updated.record_count(), 5);
    }

    #[test]
    fn test_record_count_overflow() {
        assert!(matches!(
            mini_test().with_record_count(8),
            Err(StoreError::RecordCountOverflow { count: 8, width: 3 })
        ));
        assert!(mini_test().with_record_count(7).is_ok());
    }

    #[test]
    fn test_gap_width_validation() {
        let header = mini_test();
        assert_eq!(header.with_gap_width(4).unwrap().header_bits(), 128);
        assert!(matches!(
            header.with_gap_width(8),
            Err(StoreError::InvalidGapWidth(8))
        ));
    }

    #[test]
    fn test_from_widths_positional_order() {
        let header = Header::from_widths("TEST", 60, 0, 3, 0, 4, 4, 4, 4, 4).unwrap();
        assert_eq!(header, mini_test());
        assert_eq!(header.record_count(), 0);
        assert_eq!(header.to_flat_bits(), mini_test().to_flat_bits());

        let wide_fields = Header::from_widths("X", 300, 7, 12, 5, 40, 20, 10, 30, 6).unwrap();
        assert_eq!(wide_fields.freeform(), 7);
        assert_eq!(wide_fields.count_width(), 12);
        assert_eq!(wide_fields.gap_width(), 5);
        assert_eq!(wide_fields.timestamp_width(), 40);
        assert_eq!(wide_fields.price_whole_width(), 20);
        assert_eq!(wide_fields.price_fraction_width(), 10);
        assert_eq!(wide_fields.volume_whole_width(), 30);
        assert_eq!(wide_fields.volume_fraction_width(), 6);

        assert!(matches!(
            Header::from_widths("TEST", 60, 0, 3, 8, 4, 4, 4, 4, 4),
            Err(StoreError::InvalidGapWidth(8))
        ));
    }

    #[test]
    fn test_symbol_validation() {
        assert!(matches!(
            Header::standard_aligned("ABCDEFGHIJKLMNOP", 60),
            Err(StoreError::SymbolTooLong { max_chars: 15, .. })
        ));
        assert!(Header::standard_aligned("ABCDEFGHIJKLMNO", 60).is_ok());
        assert!(matches!(
            Header::standard_aligned("ÄPFEL", 60),
            Err(StoreError::NonAsciiSymbol(_))
        ));
    }

    #[test]
    fn test_width_validation() {
        assert!(matches!(
            Header::builder("X").timestamp_width(64).build(),
            Err(StoreError::InvalidWidth {
                field: "timestamp_width",
                ..
            })
        ));
        assert!(matches!(
            Header::builder("X").count_width(32).build(),
            Err(StoreError::InvalidWidth {
                field: "count_width",
                ..
            })
        ));
        assert!(matches!(
            Header::builder("X").freeform(1024).build(),
            Err(StoreError::InvalidWidth {
                field: "freeform",
                ..
            })
        ));
        assert!(matches!(
            Header::builder("X")
                .price_widths(63, 63)
                .build(),
            Err(StoreError::InvalidWidth {
                field: "record_bits",
                ..
            })
        ));
    }

    #[test_case("", 16, 7)]
    #[test_case("TEST", 16, 7)]
    #[test_case("TEST", 3, 4)]
    #[test_case("SPY", 31, 0)]
    #[test_case("A", 0, 7)]
    fn test_aligned_gap(symbol: &str, count_width: u8, gap: u8) {
        assert_eq!(aligned_gap_width(symbol.len(), count_width), gap);
        let header = Header::builder(symbol)
            .count_width(count_width)
            .build()
            .unwrap();
        assert!(header.is_byte_aligned());
    }

    #[test_case(Header::standard_aligned("AAPL", 60).unwrap(), 44 + 4 * 46 + 46; "standard")]
    #[test_case(Header::wide_aligned("AAPL", 60, 16, 16).unwrap(), 63 + 4 * 52 + 52; "wide")]
    #[test_case(Header::mini("AAPL", 60, 0).unwrap(), 44; "mini")]
    fn test_preset_record_bits(header: Header, bits: usize) {
        assert_eq!(header.record_bits(), bits);
    }

    #[test]
    fn test_wide_rejects_large_fraction() {
        assert!(Header::wide_aligned("AAPL", 60, 53, 16).is_err());
    }

    #[test]
    fn test_stream_len() {
        let header = mini_test();
        assert_eq!(header.stream_len(0), 16);
        assert_eq!(header.stream_len(1), 21);
        assert_eq!(header.stream_len(2), 27);
    }
}
