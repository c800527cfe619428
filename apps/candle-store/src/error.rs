//! Candle store error types.
//!
//! One enum covers every failure the codec, pipeline and reader can report.
//! Nothing is logged and swallowed: a stage or reader that hits one of these
//! aborts and hands it back to the caller.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Candle store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    // ---- Configuration ----------------------------------------------------
    /// A header width does not fit its tier-1 descriptor field.
    #[error("invalid width for {field}: {width} bits (max {max})")]
    InvalidWidth {
        /// Header field name.
        field: &'static str,
        /// Requested width or value.
        width: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// Symbol is longer than the symbol-width field can describe.
    #[error("symbol {symbol:?} is too long (max {max_chars} characters)")]
    SymbolTooLong {
        /// Offending symbol.
        symbol: String,
        /// Maximum number of characters.
        max_chars: usize,
    },

    /// Symbol contains non-ASCII characters.
    #[error("symbol {0:?} is not ASCII")]
    NonAsciiSymbol(String),

    /// Gap width outside `0..=7`.
    #[error("invalid gap width: {0} (expected 0..=7)")]
    InvalidGapWidth(u8),

    /// Record count does not fit the header's count field.
    #[error("record count {count} does not fit in {width} bits")]
    RecordCountOverflow {
        /// Requested count.
        count: u64,
        /// Count field width.
        width: u8,
    },

    /// Requested record range is outside the stored records.
    #[error("invalid range: records {from}..{to} requested, {available} stored")]
    InvalidRange {
        /// First requested index.
        from: u64,
        /// One past the last requested index.
        to: u64,
        /// Records stored in the stream.
        available: u64,
    },

    /// Settings value rejected.
    #[error("configuration error: {0}")]
    Config(String),

    // ---- I/O --------------------------------------------------------------
    /// IO error reading or writing a sink.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ---- Decode -----------------------------------------------------------
    /// Stream ended inside the header.
    #[error("truncated header: needed {needed_bits} bits, {available_bits} available")]
    TruncatedHeader {
        /// Bits required to finish the header.
        needed_bits: u64,
        /// Bits actually present.
        available_bits: u64,
    },

    /// Stream ended before the promised number of records.
    #[error("truncated records: expected {expected}, decoded {decoded}")]
    TruncatedRecords {
        /// Records the header or range promised.
        expected: u64,
        /// Records decoded before the stream ran out.
        decoded: u64,
    },

    /// Header decoded but its fields contradict each other.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    // ---- Encode -----------------------------------------------------------
    /// Value part does not fit its field width.
    #[error("encode overflow in {field}: {value} does not fit in {width} bits")]
    EncodeOverflow {
        /// Record field name.
        field: &'static str,
        /// Quantized part that overflowed.
        value: u64,
        /// Field width.
        width: u8,
    },

    /// Negative, NaN or infinite input.
    #[error("unsupported value for {field}: {value}")]
    UnsupportedValue {
        /// Record field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    // ---- Pipeline ---------------------------------------------------------
    /// A pipeline stage panicked or lost its peer.
    #[error("pipeline stage {stage} failed: {message}")]
    Pipeline {
        /// Stage name.
        stage: &'static str,
        /// Failure description.
        message: String,
    },
}

impl StoreError {
    /// Whether this is a decode failure (truncated or malformed input).
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::TruncatedHeader { .. } | Self::TruncatedRecords { .. } | Self::MalformedHeader(_)
        )
    }

    /// Whether this is a configuration failure.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidWidth { .. }
                | Self::SymbolTooLong { .. }
                | Self::NonAsciiSymbol(_)
                | Self::InvalidGapWidth(_)
                | Self::RecordCountOverflow { .. }
                | Self::InvalidRange { .. }
                | Self::Config(_)
        )
    }
}
