//! Candle writer: pending queue plus pipeline front end.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::bits::BitBuf;
use crate::codec::{Candle, Header, RecordCodec};
use crate::config::{PipelineSettings, StoreSettings};
use crate::error::{Result, StoreError};
use crate::pipeline::sink::{ByteSink, FileSink, MemorySink};
use crate::pipeline::stages::{self, WriteReport};

/// Buffers encoded candles and writes them through the pipeline.
///
/// Candles are encoded when added, so encode errors surface at
/// [`add_record`](Self::add_record). Each write claims every record pending
/// at that moment, stamps a fresh header snapshot with that count, and
/// leaves later additions for the next write. Writes on one instance are
/// serialized; independent writers share nothing.
#[derive(Debug)]
pub struct CandleWriter {
    header: Header,
    codec: RecordCodec,
    settings: PipelineSettings,
    pending: Mutex<VecDeque<BitBuf>>,
    target: Mutex<Option<PathBuf>>,
    write_gate: Mutex<()>,
}

impl CandleWriter {
    /// Writer with default settings.
    #[must_use]
    pub fn new(header: Header) -> Self {
        Self::with_settings(header, &StoreSettings::default())
    }

    /// Writer using the pipeline settings and overflow policy from `settings`.
    #[must_use]
    pub fn with_settings(header: Header, settings: &StoreSettings) -> Self {
        let codec = RecordCodec::new(&header, settings.overflow_policy);
        Self {
            header,
            codec,
            settings: settings.pipeline.clone(),
            pending: Mutex::new(VecDeque::new()),
            target: Mutex::new(None),
            write_gate: Mutex::new(()),
        }
    }

    /// Header template; its record count is replaced on every write.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// Codec used to encode added candles.
    #[must_use]
    pub const fn codec(&self) -> &RecordCodec {
        &self.codec
    }

    /// Records waiting for the next write.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Encode and queue one candle.
    ///
    /// # Errors
    ///
    /// Returns the encode error; nothing is queued in that case.
    pub fn add_record(&self, candle: &Candle) -> Result<()> {
        let bits = self.codec.encode(candle)?;
        self.pending.lock().push_back(bits);
        Ok(())
    }

    /// Encode and queue candles in order.
    ///
    /// All candles are encoded before any is queued, so a failure leaves the
    /// queue untouched.
    pub fn add_records(&self, candles: &[Candle]) -> Result<usize> {
        let encoded = candles
            .iter()
            .map(|candle| self.codec.encode(candle))
            .collect::<Result<Vec<_>>>()?;
        self.pending.lock().extend(encoded);
        Ok(candles.len())
    }

    /// Remember a default output path for [`write`](Self::write).
    pub fn set_target(&self, path: impl Into<PathBuf>) {
        *self.target.lock() = Some(path.into());
    }

    /// Write pending records to the path set with [`set_target`](Self::set_target).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if no target is set, otherwise any
    /// pipeline error.
    pub fn write(&self) -> Result<WriteReport> {
        let target = self
            .target
            .lock()
            .clone()
            .ok_or_else(|| StoreError::Config("no write target set".to_string()))?;
        self.write_to_file(target)
    }

    /// Write pending records to `path`, replacing its content.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<WriteReport> {
        let path = path.as_ref();
        let mut sink = FileSink::create(path)?;
        let report = self.write_to_sink(&mut sink)?;
        info!(
            symbol = self.header.symbol(),
            path = %path.display(),
            records = report.records,
            bytes = report.bytes_written,
            "Wrote candles"
        );
        Ok(report)
    }

    /// Write pending records into memory.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>> {
        let mut sink = MemorySink::new();
        let report = self.write_to_sink(&mut sink)?;
        debug!(
            symbol = self.header.symbol(),
            records = report.records,
            bytes = report.bytes_written,
            "Wrote candles to memory"
        );
        Ok(sink.into_bytes())
    }

    /// Write pending records into a string of raw byte values.
    ///
    /// Each byte maps to the `char` with the same code point (0..=255); the
    /// result is not text.
    pub fn write_to_string(&self) -> Result<String> {
        Ok(self
            .write_to_bytes()?
            .into_iter()
            .map(char::from)
            .collect())
    }

    /// Write pending records to any sink.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordCountOverflow`] if more records are
    /// pending than the header's count field holds (nothing is drained), or
    /// the first I/O or pipeline failure.
    pub fn write_to_sink(&self, sink: &mut dyn ByteSink) -> Result<WriteReport> {
        let _gate = self.write_gate.lock();
        let count = self.pending.lock().len();
        let snapshot = self.header.with_record_count(count as u64)?;
        debug!(
            symbol = snapshot.symbol(),
            records = count,
            header_bits = snapshot.header_bits(),
            record_bits = snapshot.record_bits(),
            "Starting write pipeline"
        );
        stages::run(
            &self.settings,
            &snapshot.to_flat_bits(),
            &self.pending,
            count,
            sink,
        )
    }
}
