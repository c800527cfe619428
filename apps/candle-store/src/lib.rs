#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_collect,
        clippy::items_after_statements
    )
)]

//! Candle Store - Bit-Packed OHLCV Storage
//!
//! Stores candlestick (OHLCV) records in a compact binary stream whose field
//! widths are declared by a self-describing header, and reads them back
//! either sequentially or by record index without decoding the records in
//! front.
//!
//! # Modules
//!
//! - `bits`: MSB-first bit buffer and byte/bit offset arithmetic
//! - `codec`: Header layout, decimal quantization and record encoding
//! - `pipeline`: Pending queue and the four-stage threaded writer
//! - `reader`: Sequential and random-access decoding
//! - `config`: Pipeline and reader tunables from the environment
//! - `telemetry`: Tracing subscriber setup
//!
//! # Stream Layout
//!
//! ```text
//! ┌──────────── tier 1 (89 bits) ────────────┐┌──── tier 2 ─────┐┌─ records ─┐
//! │ freeform│interval│widths│record bits│... ││symbol│count│gap ││ r0 r1 ... │ pad
//! └──────────────────────────────────────────┘└─────────────────┘└───────────┘
//! ```
//!
//! # Data Flow
//!
//! ```text
//! Candle ──► RecordCodec::encode ──► CandleWriter queue ──► pipeline ──► ByteSink
//!
//! file/bytes ──► Header::from_reader ──► CandleReader ──► Vec<Candle>
//!                         │
//!                         └─► OffsetTracker ──► seek to record k
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Bit buffer and offset arithmetic.
pub mod bits;

/// Header, quantization and record codec.
pub mod codec;

/// Pipeline and reader settings.
pub mod config;

/// Error types.
pub mod error;

/// Write path.
pub mod pipeline;

/// Read path.
pub mod reader;

/// Tracing setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Bits
pub use bits::{BitBuf, OffsetTracker};

// Codec
pub use codec::{Candle, Header, HeaderBuilder, OverflowPolicy, RecordCodec};

// Config
pub use config::{PipelineSettings, ReaderSettings, StoreSettings};

// Errors
pub use error::{Result, StoreError};

// Write and read paths
pub use pipeline::{ByteSink, CandleWriter, FileSink, MemorySink, WriteReport};
pub use reader::CandleReader;

// Telemetry
pub use telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
