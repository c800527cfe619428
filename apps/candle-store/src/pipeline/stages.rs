//! Four-stage write pipeline.
//!
//! ```text
//!  pending ──► [drain] ──records──► [flatten] ──bits──► [pack] ──bytes──► [flush] ──► sink
//!                                                 ▲                 ▲
//!                                   header tail bits        header whole bytes
//! ```
//!
//! Stages run on scoped threads joined by bounded channels. A stage is
//! finished when its input channel is disconnected and drained, so no stage
//! exits with data in flight. Dropping a sender is the finish signal.
//!
//! A failing stage returns its error and drops its channel ends; neighbours
//! stop when their next send or receive fails. After joining, the first real
//! failure is returned in preference to the "peer gone" errors it caused.

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bits::BitBuf;
use crate::config::PipelineSettings;
use crate::error::{Result, StoreError};
use crate::pipeline::sink::ByteSink;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Records written.
    pub records: u64,
    /// Bytes handed to the sink, header included.
    pub bytes_written: u64,
    /// Number of sink writes.
    pub chunks_written: u64,
    /// Partial chunks flushed because the flush timeout elapsed.
    pub partial_flushes: u64,
}

#[derive(Debug)]
enum StageFailure {
    /// The stage itself failed.
    Failed(StoreError),
    /// A neighbour hung up; its own result carries the cause.
    PeerGone(&'static str),
}

impl From<StoreError> for StageFailure {
    fn from(err: StoreError) -> Self {
        Self::Failed(err)
    }
}

type StageResult<T> = std::result::Result<T, StageFailure>;

/// Write `header_bits` and the first `count` records of `pending` to `sink`.
///
/// Blocks until all four stages have terminated. The sink is closed on
/// success.
pub(crate) fn run(
    settings: &PipelineSettings,
    header_bits: &BitBuf,
    pending: &Mutex<VecDeque<BitBuf>>,
    count: usize,
    sink: &mut dyn ByteSink,
) -> Result<WriteReport> {
    let capacity = settings.channel_capacity.max(1);
    let (record_tx, record_rx) = sync_channel::<BitBuf>(capacity);
    let (bit_tx, bit_rx) = sync_channel::<BitBuf>(capacity);
    let (byte_tx, byte_rx) = sync_channel::<Vec<u8>>(capacity);

    // Whole header bytes go ahead of everything; the tail seeds the packer.
    let mut header_tail = header_bits.clone();
    let header_bytes = header_tail.take_whole_bytes();
    if !header_bytes.is_empty() {
        byte_tx
            .send(header_bytes)
            .map_err(|_| pipeline_error("pack", "byte channel closed before start"))?;
    }

    let chunk_bits = settings.write_chunk_bytes.max(1) * 8;

    let (drained, flattened, packed, flushed) = std::thread::scope(|scope| {
        let drain = scope.spawn(move || drain_stage(pending, count, &record_tx));
        let flatten = scope.spawn(move || flatten_stage(&record_rx, &bit_tx, chunk_bits));
        let pack = scope.spawn(move || pack_stage(&bit_rx, &byte_tx, header_tail));
        let flush = scope.spawn(move || flush_stage(&byte_rx, sink, settings));
        (
            join_stage("drain", drain.join()),
            join_stage("flatten", flatten.join()),
            join_stage("pack", pack.join()),
            join_stage("flush", flush.join()),
        )
    });

    let mut failures = Failures::default();
    let records = failures.take(drained);
    failures.take(flattened);
    failures.take(packed);
    let report = failures.take(flushed);
    failures.into_result()?;

    match (records, report) {
        (Some(records), Some(report)) => Ok(WriteReport {
            records: records as u64,
            ..report
        }),
        _ => Err(pipeline_error("pipeline", "stage ended without a result")),
    }
}

/// Collects stage outcomes, keeping the first real failure.
#[derive(Debug, Default)]
struct Failures {
    first: Option<StoreError>,
    peer_gone: Option<&'static str>,
}

impl Failures {
    fn take<T>(&mut self, result: StageResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(StageFailure::Failed(err)) => {
                if self.first.is_none() {
                    self.first = Some(err);
                }
                None
            }
            Err(StageFailure::PeerGone(stage)) => {
                if self.peer_gone.is_none() {
                    self.peer_gone = Some(stage);
                }
                None
            }
        }
    }

    fn into_result(self) -> Result<()> {
        match (self.first, self.peer_gone) {
            (Some(err), _) => Err(err),
            (None, Some(stage)) => Err(pipeline_error(stage, "neighbouring stage hung up")),
            (None, None) => Ok(()),
        }
    }
}

/// Stage 1: claim `count` pending records and forward them in order.
fn drain_stage(
    pending: &Mutex<VecDeque<BitBuf>>,
    count: usize,
    tx: &SyncSender<BitBuf>,
) -> StageResult<usize> {
    debug!(stage = "drain", records = count, "Stage started");
    let claimed: Vec<BitBuf> = {
        let mut queue = pending.lock();
        let take = count.min(queue.len());
        queue.drain(..take).collect()
    };
    if claimed.len() != count {
        return Err(StageFailure::Failed(pipeline_error(
            "drain",
            format!("expected {count} pending records, found {}", claimed.len()),
        )));
    }
    for record in claimed {
        tx.send(record).map_err(|_| StageFailure::PeerGone("drain"))?;
    }
    debug!(stage = "drain", "Stage finished");
    Ok(count)
}

/// Stage 2: coalesce record bits into chunks of about `chunk_bits`.
fn flatten_stage(
    rx: &Receiver<BitBuf>,
    tx: &SyncSender<BitBuf>,
    chunk_bits: usize,
) -> StageResult<()> {
    debug!(stage = "flatten", chunk_bits, "Stage started");
    let mut chunk = BitBuf::with_capacity(chunk_bits);
    // recv() errors only once the drain stage is done and the channel is empty
    while let Ok(record) = rx.recv() {
        chunk.extend(&record);
        if chunk.len() >= chunk_bits {
            let full = std::mem::replace(&mut chunk, BitBuf::with_capacity(chunk_bits));
            tx.send(full).map_err(|_| StageFailure::PeerGone("flatten"))?;
        }
    }
    if !chunk.is_empty() {
        tx.send(chunk).map_err(|_| StageFailure::PeerGone("flatten"))?;
    }
    debug!(stage = "flatten", "Stage finished");
    Ok(())
}

/// Stage 3: repack bits into bytes, padding the final partial byte.
fn pack_stage(
    rx: &Receiver<BitBuf>,
    tx: &SyncSender<Vec<u8>>,
    mut carry: BitBuf,
) -> StageResult<()> {
    debug!(stage = "pack", carry_bits = carry.len(), "Stage started");
    while let Ok(bits) = rx.recv() {
        carry.extend(&bits);
        let bytes = carry.take_whole_bytes();
        if !bytes.is_empty() {
            tx.send(bytes).map_err(|_| StageFailure::PeerGone("pack"))?;
        }
    }
    if !carry.is_empty() {
        tx.send(carry.into_padded_bytes())
            .map_err(|_| StageFailure::PeerGone("pack"))?;
    }
    debug!(stage = "pack", "Stage finished");
    Ok(())
}

/// Stage 4: write fixed-size chunks, flushing partial ones after a timeout.
fn flush_stage(
    rx: &Receiver<Vec<u8>>,
    sink: &mut dyn ByteSink,
    settings: &PipelineSettings,
) -> StageResult<WriteReport> {
    debug!(stage = "flush", "Stage started");
    let chunk_size = settings.write_chunk_bytes.max(1);
    let mut report = WriteReport::default();
    let mut buffer: Vec<u8> = Vec::with_capacity(chunk_size * 2);
    let mut waiting_since = Instant::now();

    loop {
        let received = if buffer.is_empty() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            let remaining = settings
                .flush_timeout
                .saturating_sub(waiting_since.elapsed());
            rx.recv_timeout(remaining)
        };

        match received {
            Ok(bytes) => {
                if buffer.is_empty() {
                    waiting_since = Instant::now();
                }
                buffer.extend_from_slice(&bytes);
                while buffer.len() >= chunk_size {
                    write_chunk(sink, &buffer[..chunk_size], &mut report)?;
                    buffer.drain(..chunk_size);
                    waiting_since = Instant::now();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    stage = "flush",
                    bytes = buffer.len(),
                    "Flushing partial chunk after timeout"
                );
                write_chunk(sink, &buffer, &mut report)?;
                report.partial_flushes += 1;
                buffer.clear();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !buffer.is_empty() {
        write_chunk(sink, &buffer, &mut report)?;
    }
    sink.close()?;
    debug!(
        stage = "flush",
        bytes = report.bytes_written,
        chunks = report.chunks_written,
        "Stage finished"
    );
    Ok(report)
}

fn write_chunk(sink: &mut dyn ByteSink, bytes: &[u8], report: &mut WriteReport) -> Result<()> {
    sink.write_chunk(bytes)?;
    report.bytes_written += bytes.len() as u64;
    report.chunks_written += 1;
    Ok(())
}

fn join_stage<T>(
    stage: &'static str,
    joined: std::thread::Result<StageResult<T>>,
) -> StageResult<T> {
    joined.unwrap_or_else(|payload| {
        Err(StageFailure::Failed(pipeline_error(
            stage,
            panic_message(&*payload),
        )))
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("thread panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("thread panicked: {s}")
    } else {
        "thread panicked".into()
    }
}

fn pipeline_error(stage: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Pipeline {
        stage,
        message: message.into(),
    }
}
