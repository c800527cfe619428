//! Candle record codec.
//!
//! One record is `timestamp, open, high, low, close, volume`, each value
//! split into whole and fraction fields (see [`quantize`](super::quantize)).
//! The bit length is always [`Header::record_bits`].

use serde::{Deserialize, Serialize};

use crate::bits::BitBuf;
use crate::codec::header::Header;
use crate::codec::quantize::{OverflowPolicy, Quantized, dequantize, quantize};
use crate::error::{Result, StoreError};

/// OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Candle {
    /// Candle timestamp (UTC seconds or caller-defined unit).
    pub timestamp: u64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: f64,
}

impl Candle {
    /// Create a new candle.
    #[must_use]
    pub const fn new(
        timestamp: u64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Prices in field order.
    #[must_use]
    pub const fn prices(&self) -> [f64; 4] {
        [self.open, self.high, self.low, self.close]
    }
}

/// `(value, whole field, fraction field)` names used in errors.
type FieldNames = (&'static str, &'static str, &'static str);

const PRICE_FIELDS: [FieldNames; 4] = [
    ("open", "open_whole", "open_fraction"),
    ("high", "high_whole", "high_fraction"),
    ("low", "low_whole", "low_fraction"),
    ("close", "close_whole", "close_fraction"),
];

const VOLUME_FIELDS: FieldNames = ("volume", "volume_whole", "volume_fraction");

/// Field widths and digit counts lifted from a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    timestamp: u8,
    price_whole: u8,
    price_fraction: u8,
    volume_whole: u8,
    volume_fraction: u8,
    price_digits: u8,
    volume_digits: u8,
    record_bits: usize,
}

/// Encodes and decodes candles under one header's widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCodec {
    layout: Layout,
    policy: OverflowPolicy,
}

impl RecordCodec {
    /// Codec for `header` with the given overflow policy.
    #[must_use]
    pub const fn new(header: &Header, policy: OverflowPolicy) -> Self {
        Self {
            layout: Layout {
                timestamp: header.timestamp_width(),
                price_whole: header.price_whole_width(),
                price_fraction: header.price_fraction_width(),
                volume_whole: header.volume_whole_width(),
                volume_fraction: header.volume_fraction_width(),
                price_digits: header.price_digits(),
                volume_digits: header.volume_digits(),
                record_bits: header.record_bits(),
            },
            policy,
        }
    }

    /// Bits per record.
    #[must_use]
    pub const fn record_bits(&self) -> usize {
        self.layout.record_bits
    }

    /// Overflow policy in effect.
    #[must_use]
    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Encode one candle to exactly [`record_bits`](Self::record_bits) bits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedValue`] for negative or non-finite
    /// values and [`StoreError::EncodeOverflow`] when a part does not fit
    /// and the policy is [`OverflowPolicy::Error`].
    pub fn encode(&self, candle: &Candle) -> Result<BitBuf> {
        let mut bits = BitBuf::with_capacity(self.layout.record_bits);
        self.encode_into(candle, &mut bits)?;
        Ok(bits)
    }

    /// Encode candles back to back, in input order.
    pub fn encode_batch(&self, candles: &[Candle]) -> Result<BitBuf> {
        let mut bits = BitBuf::with_capacity(self.layout.record_bits * candles.len());
        for candle in candles {
            self.encode_into(candle, &mut bits)?;
        }
        Ok(bits)
    }

    fn encode_into(&self, candle: &Candle, bits: &mut BitBuf) -> Result<()> {
        let layout = &self.layout;
        let timestamp = self
            .policy
            .fit("timestamp", candle.timestamp, layout.timestamp)?;
        bits.push_unsigned(timestamp, usize::from(layout.timestamp));

        for (value, names) in candle.prices().into_iter().zip(PRICE_FIELDS) {
            self.push_value(
                bits,
                value,
                names,
                (layout.price_whole, layout.price_fraction),
                layout.price_digits,
            )?;
        }
        self.push_value(
            bits,
            candle.volume,
            VOLUME_FIELDS,
            (layout.volume_whole, layout.volume_fraction),
            layout.volume_digits,
        )
    }

    fn push_value(
        &self,
        bits: &mut BitBuf,
        value: f64,
        (name, whole_field, fraction_field): FieldNames,
        (whole_width, fraction_width): (u8, u8),
        digits: u8,
    ) -> Result<()> {
        let parts = quantize(name, value, digits)?;
        let whole = self.policy.fit(whole_field, parts.whole, whole_width)?;
        let fraction = self
            .policy
            .fit(fraction_field, parts.fraction, fraction_width)?;
        bits.push_unsigned(whole, usize::from(whole_width));
        bits.push_unsigned(fraction, usize::from(fraction_width));
        Ok(())
    }

    /// Decode the record starting at bit `start` of `bits`.
    ///
    /// Returns `None` if fewer than [`record_bits`](Self::record_bits) bits remain.
    #[must_use]
    pub fn decode_at(&self, bits: &BitBuf, start: usize) -> Option<Candle> {
        let layout = &self.layout;
        if start.checked_add(layout.record_bits)? > bits.len() {
            return None;
        }
        let mut cursor = start;
        let mut next = |width: u8| {
            let value = bits.read_unsigned(cursor, usize::from(width));
            cursor += usize::from(width);
            value
        };
        let timestamp = next(layout.timestamp)?;
        let mut prices = [0.0f64; 4];
        for price in &mut prices {
            let whole = next(layout.price_whole)?;
            let fraction = next(layout.price_fraction)?;
            *price = dequantize(Quantized { whole, fraction }, layout.price_digits);
        }
        let whole = next(layout.volume_whole)?;
        let fraction = next(layout.volume_fraction)?;
        let volume = dequantize(Quantized { whole, fraction }, layout.volume_digits);

        let [open, high, low, close] = prices;
        Some(Candle::new(timestamp, open, high, low, close, volume))
    }

    /// Decode a single record of exactly [`record_bits`](Self::record_bits) bits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TruncatedRecords`] if `bits` is too short.
    pub fn decode(&self, bits: &BitBuf) -> Result<Candle> {
        self.decode_at(bits, 0)
            .ok_or(StoreError::TruncatedRecords {
                expected: 1,
                decoded: 0,
            })
    }

    /// Decode `count` consecutive records from the start of `bits`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TruncatedRecords`] if `bits` runs out first.
    pub fn decode_batch(&self, bits: &BitBuf, count: usize) -> Result<Vec<Candle>> {
        let mut candles = Vec::with_capacity(count);
        for index in 0..count {
            let candle = self
                .decode_at(bits, index * self.layout.record_bits)
                .ok_or(StoreError::TruncatedRecords {
                    expected: count as u64,
                    decoded: index as u64,
                })?;
            candles.push(candle);
        }
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mini_codec(policy: OverflowPolicy) -> RecordCodec {
        let header = Header::mini("TEST", 60, 0).unwrap();
        RecordCodec::new(&header, policy)
    }

    fn assert_close(actual: &Candle, expected: &Candle, tolerance: f64) {
        assert_eq!(actual.timestamp, expected.timestamp);
        for (a, e) in actual.prices().iter().zip(expected.prices()) {
            assert!((a - e).abs() <= tolerance, "{a} != {e}");
        }
        assert!((actual.volume - expected.volume).abs() <= tolerance);
    }

    #[test]
    fn test_encode_scenario_record() {
        let codec = mini_codec(OverflowPolicy::Error);
        let bits = codec
            .encode(&Candle::new(12, 4.0, 9.0, 2.0, 5.0, 10.5))
            .unwrap();
        assert_eq!(bits.len(), 44);
        assert_eq!(
            bits.to_string(),
            "1100\
             0100 0000 1001 0000 0010 0000 0101 0000\
             1010 0101"
                .replace(' ', "")
        );
    }

    #[test]
    fn test_round_trip_within_precision() {
        let header = Header::standard_aligned("AAPL", 60).unwrap();
        let codec = RecordCodec::new(&header, OverflowPolicy::Error);
        let candle = Candle::new(1_700_000_000, 189.1234, 190.5, 188.0001, 189.9, 12_345.6789);
        let decoded = codec.decode(&codec.encode(&candle).unwrap()).unwrap();
        assert_close(&decoded, &candle, 1e-4);
    }

    #[test]
    fn test_batch_preserves_order() {
        let codec = mini_codec(OverflowPolicy::Error);
        let candles = [
            Candle::new(12, 4.0, 9.0, 2.0, 5.0, 10.5),
            Candle::new(13, 4.1, 9.7, 2.2, 5.0, 15.6),
        ];
        let bits = codec.encode_batch(&candles).unwrap();
        assert_eq!(bits.len(), 88);
        let decoded = codec.decode_batch(&bits, 2).unwrap();
        for (actual, expected) in decoded.iter().zip(&candles) {
            assert_close(actual, expected, 1e-9);
        }
    }

    #[test]
    fn test_decode_batch_truncated() {
        let codec = mini_codec(OverflowPolicy::Error);
        let bits = codec
            .encode(&Candle::new(1, 1.0, 1.0, 1.0, 1.0, 1.0))
            .unwrap();
        assert!(matches!(
            codec.decode_batch(&bits, 2),
            Err(StoreError::TruncatedRecords {
                expected: 2,
                decoded: 1
            })
        ));
    }

    #[test]
    fn test_overflow_fails_fast() {
        let codec = mini_codec(OverflowPolicy::Error);
        let err = codec
            .encode(&Candle::new(1, 16.0, 1.0, 1.0, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::EncodeOverflow {
                field: "open_whole",
                value: 16,
                width: 4
            }
        ));
        assert!(matches!(
            codec.encode(&Candle::new(16, 1.0, 1.0, 1.0, 1.0, 1.0)),
            Err(StoreError::EncodeOverflow {
                field: "timestamp",
                ..
            })
        ));
    }

    #[test]
    fn test_overflow_wraps_when_configured() {
        let codec = mini_codec(OverflowPolicy::Wrap);
        let bits = codec
            .encode(&Candle::new(17, 18.0, 1.0, 1.0, 1.0, 1.0))
            .unwrap();
        let decoded = codec.decode(&bits).unwrap();
        assert_eq!(decoded.timestamp, 1);
        assert_eq!(decoded.open, 2.0);
    }

    #[test]
    fn test_negative_value_rejected() {
        let codec = mini_codec(OverflowPolicy::Wrap);
        assert!(matches!(
            codec.encode(&Candle::new(1, 1.0, 1.0, -1.0, 1.0, 1.0)),
            Err(StoreError::UnsupportedValue { field: "low", .. })
        ));
    }

    #[test]
    fn test_candle_serde() {
        let candle = Candle::new(12, 4.0, 9.0, 2.0, 5.0, 10.5);
        let json = serde_json::to_string(&candle).unwrap();
        assert!(json.contains("\"timestamp\":12"));
        let back: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, candle);
    }
}
