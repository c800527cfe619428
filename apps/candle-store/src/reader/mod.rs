//! Candle stream reader.
//!
//! Sequential reads decode the header in two passes and then stream records.
//! Range reads compute the bit offset of the first wanted record with an
//! [`OffsetTracker`], seek to its byte and drop the leading bits of that byte
//! before decoding forward.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, info};

use crate::bits::{BitBuf, OffsetTracker};
use crate::codec::{Candle, Header, OverflowPolicy, RecordCodec};
use crate::config::{ReaderSettings, StoreSettings};
use crate::error::{Result, StoreError};

/// Reads candle streams from files or in-memory buffers.
#[derive(Debug, Clone, Default)]
pub struct CandleReader {
    settings: ReaderSettings,
}

impl CandleReader {
    /// Reader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader using the reader settings from `settings`.
    #[must_use]
    pub fn with_settings(settings: &StoreSettings) -> Self {
        Self {
            settings: settings.reader.clone(),
        }
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Decode only the header of a file.
    pub fn read_header(&self, path: impl AsRef<Path>) -> Result<Header> {
        let mut source = open(path.as_ref())?;
        let (header, _) = Header::from_reader(&mut source)?;
        Ok(header)
    }

    /// Decode every record of a file.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<Candle>> {
        let path = path.as_ref();
        let mut source = open(path)?;
        let (header, candles) = self.read_all(&mut source)?;
        info!(
            symbol = header.symbol(),
            path = %path.display(),
            records = candles.len(),
            "Read candles"
        );
        Ok(candles)
    }

    /// Decode `quantity` records starting at index `from`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] if the range runs past the
    /// stored record count.
    pub fn read_range(
        &self,
        path: impl AsRef<Path>,
        from: u64,
        quantity: u64,
    ) -> Result<Vec<Candle>> {
        let mut source = open(path.as_ref())?;
        let (header, _) = Header::from_reader(&mut source)?;
        self.read_range_with_header(&mut source, &header, from, quantity)
    }

    /// Decode records in the half-open index range `from..to`.
    pub fn read_range_between(
        &self,
        path: impl AsRef<Path>,
        from: u64,
        to: u64,
    ) -> Result<Vec<Candle>> {
        let mut source = open(path.as_ref())?;
        let (header, _) = Header::from_reader(&mut source)?;
        let quantity = to.checked_sub(from).ok_or(StoreError::InvalidRange {
            from,
            to,
            available: header.record_count(),
        })?;
        self.read_range_with_header(&mut source, &header, from, quantity)
    }

    // =========================================================================
    // Any seekable source
    // =========================================================================

    /// Decode header and records from the start of `source`.
    pub fn read_all<R: Read>(&self, source: &mut R) -> Result<(Header, Vec<Candle>)> {
        let (header, leftover) = Header::from_reader(source)?;
        let candles = self.decode_records(source, &header, leftover, header.record_count())?;
        Ok((header, candles))
    }

    /// Decode every record using an already decoded header.
    pub fn read_with_header<R: Read + Seek>(
        &self,
        source: &mut R,
        header: &Header,
    ) -> Result<Vec<Candle>> {
        self.read_range_with_header(source, header, 0, header.record_count())
    }

    /// Decode a range using an already decoded header, skipping header decode.
    pub fn read_range_with_header<R: Read + Seek>(
        &self,
        source: &mut R,
        header: &Header,
        from: u64,
        quantity: u64,
    ) -> Result<Vec<Candle>> {
        if quantity == 0 {
            return Ok(Vec::new());
        }
        let available = header.record_count();
        let to = from.checked_add(quantity).ok_or(StoreError::InvalidRange {
            from,
            to: u64::MAX,
            available,
        })?;
        if to > available {
            return Err(StoreError::InvalidRange {
                from,
                to,
                available,
            });
        }

        let carry = seek_to_record(source, header, from, quantity)?;
        let candles = self.decode_records(source, header, carry, quantity)?;
        debug!(
            symbol = header.symbol(),
            from,
            records = candles.len(),
            "Read candle range"
        );
        Ok(candles)
    }

    // =========================================================================
    // In-memory buffers
    // =========================================================================

    /// Decode header and records from a byte buffer.
    pub fn read_bytes(&self, bytes: &[u8]) -> Result<(Header, Vec<Candle>)> {
        self.read_all(&mut Cursor::new(bytes))
    }

    /// Decode a range from a byte buffer.
    pub fn read_range_bytes(&self, bytes: &[u8], from: u64, quantity: u64) -> Result<Vec<Candle>> {
        let mut source = Cursor::new(bytes);
        let (header, _) = Header::from_reader(&mut source)?;
        self.read_range_with_header(&mut source, &header, from, quantity)
    }

    /// Stream `expected` records, starting with the `carry` bits already read.
    fn decode_records<R: Read>(
        &self,
        source: &mut R,
        header: &Header,
        carry: BitBuf,
        expected: u64,
    ) -> Result<Vec<Candle>> {
        // Decoding never overflows, so the policy is irrelevant here.
        let codec = RecordCodec::new(header, OverflowPolicy::Error);
        let record_bits = codec.record_bits();
        let mut candles = Vec::with_capacity(usize::try_from(expected).unwrap_or(0).min(1 << 16));
        let mut bits = carry;
        let mut cursor = 0usize;
        let mut chunk = vec![0u8; self.settings.read_chunk_bytes.max(1)];

        while (candles.len() as u64) < expected {
            if let Some(candle) = codec.decode_at(&bits, cursor) {
                candles.push(candle);
                cursor += record_bits;
                continue;
            }

            let n = read_some(source, &mut chunk)?;
            if n == 0 {
                return Err(StoreError::TruncatedRecords {
                    expected,
                    decoded: candles.len() as u64,
                });
            }
            if cursor > 0 {
                bits = bits.subset(cursor, bits.len() - cursor).unwrap_or_default();
                cursor = 0;
            }
            bits.extend(&BitBuf::from_bytes(&chunk[..n]));
        }
        Ok(candles)
    }
}

/// Seek to record `index` and return the bits of its first byte that belong
/// to the record. `quantity` is only reported if that byte is missing.
fn seek_to_record<R: Read + Seek>(
    source: &mut R,
    header: &Header,
    index: u64,
    quantity: u64,
) -> Result<BitBuf> {
    let record_bits = header.record_bits() as i64;
    let mut offset = OffsetTracker::from_bits(header.header_bits() as i64);
    let n = i64::try_from(index).map_err(|_| StoreError::InvalidRange {
        from: index,
        to: index,
        available: header.record_count(),
    })?;
    offset.add_multiple(n, record_bits / 8, record_bits % 8);

    let byte = u64::try_from(offset.byte_index()).map_err(|_| StoreError::InvalidRange {
        from: index,
        to: index,
        available: header.record_count(),
    })?;
    source.seek(SeekFrom::Start(byte))?;

    let skip = usize::from(offset.bit_index());
    if skip == 0 {
        return Ok(BitBuf::new());
    }
    let mut first = [0u8; 1];
    if read_some(source, &mut first)? == 0 {
        return Err(StoreError::TruncatedRecords {
            expected: quantity,
            decoded: 0,
        });
    }
    Ok(BitBuf::from_bytes(&first)
        .subset(skip, 8 - skip)
        .unwrap_or_default())
}

fn read_some<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CandleWriter;

    fn sample_bytes(count: u64) -> Vec<u8> {
        let header = Header::builder("SPY")
            .interval(60)
            .price_widths(20, 7)
            .volume_widths(24, 4)
            .timestamp_width(32)
            .count_width(10)
            .gap_width(0)
            .build()
            .unwrap();
        let writer = CandleWriter::new(header);
        for i in 0..count {
            let price = 400.0 + i as f64 * 0.25;
            writer
                .add_record(&Candle::new(
                    1_700_000_000 + i * 60,
                    price,
                    price + 1.5,
                    price - 1.25,
                    price + 0.5,
                    1_000.0 + i as f64,
                ))
                .unwrap();
        }
        writer.write_to_bytes().unwrap()
    }

    #[test]
    fn test_read_bytes_round_trip() {
        let bytes = sample_bytes(5);
        let (header, candles) = CandleReader::new().read_bytes(&bytes).unwrap();
        assert_eq!(header.symbol(), "SPY");
        assert_eq!(header.record_count(), 5);
        assert_eq!(candles.len(), 5);
        assert_eq!(candles[4].timestamp, 1_700_000_240);
        assert!((candles[4].open - 401.0).abs() < 1e-9);
        assert!((candles[4].low - 399.75).abs() < 1e-9);
    }

    #[test]
    fn test_range_matches_sequential() {
        let bytes = sample_bytes(9);
        let reader = CandleReader::new();
        let (_, all) = reader.read_bytes(&bytes).unwrap();
        for k in 0..9 {
            let one = reader.read_range_bytes(&bytes, k, 1).unwrap();
            assert_eq!(one, vec![all[k as usize]], "record {k}");
        }
        assert_eq!(reader.read_range_bytes(&bytes, 3, 4).unwrap(), all[3..7].to_vec());
    }

    #[test]
    fn test_zero_quantity_is_empty() {
        let bytes = sample_bytes(2);
        assert!(CandleReader::new().read_range_bytes(&bytes, 1, 0).unwrap().is_empty());
    }

    #[test]
    fn test_range_past_end_rejected() {
        let bytes = sample_bytes(3);
        assert!(matches!(
            CandleReader::new().read_range_bytes(&bytes, 2, 2),
            Err(StoreError::InvalidRange {
                from: 2,
                to: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = sample_bytes(4);
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(
            CandleReader::new().read_bytes(cut),
            Err(StoreError::TruncatedRecords {
                expected: 4,
                decoded: 3
            })
        ));
    }

    #[test]
    fn test_missing_first_record_byte_reports_quantity() {
        // 123 header bits + 168: record 1 starts at bit 3 of byte 36
        let bytes = sample_bytes(3);
        let cut = &bytes[..36];
        assert!(matches!(
            CandleReader::new().read_range_bytes(cut, 1, 2),
            Err(StoreError::TruncatedRecords {
                expected: 2,
                decoded: 0
            })
        ));
    }

    #[test]
    fn test_inverted_range_reports_stored_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spy.cdl");
        std::fs::write(&path, sample_bytes(4)).unwrap();

        let reader = CandleReader::new();
        assert!(matches!(
            reader.read_range_between(&path, 3, 1),
            Err(StoreError::InvalidRange {
                from: 3,
                to: 1,
                available: 4
            })
        ));
        let (_, all) = reader.read_bytes(&sample_bytes(4)).unwrap();
        assert_eq!(reader.read_range_between(&path, 1, 3).unwrap(), all[1..3].to_vec());
    }

    #[test]
    fn test_cached_header_reads() {
        let bytes = sample_bytes(6);
        let reader = CandleReader::new();
        let (header, all) = reader.read_bytes(&bytes).unwrap();

        let mut source = Cursor::new(bytes.as_slice());
        assert_eq!(reader.read_with_header(&mut source, &header).unwrap(), all);
        assert_eq!(
            reader
                .read_range_with_header(&mut source, &header, 5, 1)
                .unwrap(),
            vec![all[5]]
        );
    }

    #[test]
    fn test_small_read_chunks() {
        let bytes = sample_bytes(7);
        let settings = StoreSettings {
            reader: ReaderSettings {
                read_chunk_bytes: 1,
            },
            ..StoreSettings::default()
        };
        let (_, chunked) = CandleReader::with_settings(&settings)
            .read_bytes(&bytes)
            .unwrap();
        let (_, default) = CandleReader::new().read_bytes(&bytes).unwrap();
        assert_eq!(chunked, default);
    }
}
