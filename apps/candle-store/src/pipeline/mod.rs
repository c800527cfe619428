//! Write path: pending queue, four-stage pipeline and byte sinks.

pub mod sink;
mod stages;
mod writer;

pub use sink::{ByteSink, FileSink, MemorySink};
pub use stages::WriteReport;
pub use writer::CandleWriter;
