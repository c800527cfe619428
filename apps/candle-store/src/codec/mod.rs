//! Binary candle codec.
//!
//! - `header`: two-tier header, presets and builder
//! - `quantize`: decimal whole/fraction quantization and overflow policy
//! - `record`: candle value type and per-record bit codec

pub mod header;
pub mod quantize;
pub mod record;

pub use header::{Header, HeaderBuilder, TIER1_BITS, TIER1_BYTES, aligned_gap_width};
pub use quantize::{OverflowPolicy, Quantized, dequantize, fraction_digits, quantize};
pub use record::{Candle, RecordCodec};
