//! Byte sinks fed by the flush stage.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Destination for packed bytes.
///
/// The flush stage calls [`write_chunk`](Self::write_chunk) in order and
/// [`close`](Self::close) exactly once after the last chunk.
pub trait ByteSink: Send {
    /// Append a chunk.
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<()>;

    /// Flush and release the sink.
    fn close(&mut self) -> Result<()>;
}

/// Sink writing to a file, truncating any previous content.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    /// Create or truncate `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`](crate::StoreError::Io) if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self { path, file })
    }

    /// Target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSink for FileSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory sink.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemorySink {
    bytes: Vec<u8>,
    chunks: usize,
    closed: bool,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            chunks: 0,
            closed: false,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of `write_chunk` calls received.
    #[must_use]
    pub const fn chunks(&self) -> usize {
        self.chunks
    }

    /// Whether `close` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl ByteSink for MemorySink {
    fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes.extend_from_slice(bytes);
        self.chunks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_chunks() {
        let mut sink = MemorySink::new();
        sink.write_chunk(&[1, 2]).unwrap();
        sink.write_chunk(&[3]).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.chunks(), 2);
        assert!(sink.is_closed());
        assert_eq!(sink.into_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn test_file_sink_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.bin");
        std::fs::write(&path, [9u8; 32]).unwrap();

        let mut sink = FileSink::create(&path).unwrap();
        sink.write_chunk(&[0xAB, 0xCD]).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.path(), path.as_path());
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xAB, 0xCD]);
    }
}
