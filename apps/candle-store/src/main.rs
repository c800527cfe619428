//! Candle Store Binary
//!
//! Encodes JSON candles into the bit-packed format and decodes them back.
//!
//! # Usage
//!
//! ```bash
//! candle-store encode --input bars.json --output spy.cdl --symbol SPY --interval 60
//! candle-store decode --input spy.cdl
//! candle-store range --input spy.cdl --from 100 --quantity 10
//! candle-store header --input spy.cdl
//! ```
//!
//! # Environment Variables
//!
//! - `CANDLE_STORE_WRITE_CHUNK_BYTES`: Flush stage chunk size (default: 64)
//! - `CANDLE_STORE_FLUSH_TIMEOUT_MS`: Partial chunk flush latency (default: 500)
//! - `CANDLE_STORE_CHANNEL_CAPACITY`: Inter-stage channel bound (default: 64)
//! - `CANDLE_STORE_READ_CHUNK_BYTES`: Reader chunk size (default: 64)
//! - `CANDLE_STORE_OVERFLOW_POLICY`: error | wrap (default: error)
//! - `RUST_LOG`: Log level (default: info)

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_store::{
    Candle, CandleReader, CandleWriter, Header, StoreSettings, init_telemetry,
};
use clap::{Parser, Subcommand, ValueEnum};

/// Bit-packed OHLCV candle storage.
#[derive(Debug, Parser)]
#[command(name = "candle-store", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode a JSON array of candles into a binary file.
    Encode {
        /// JSON file holding an array of candles.
        #[arg(long)]
        input: PathBuf,
        /// Binary file to create or replace.
        #[arg(long)]
        output: PathBuf,
        /// Ticker symbol stored in the header.
        #[arg(long)]
        symbol: String,
        /// Candle interval in seconds.
        #[arg(long)]
        interval: u32,
        /// Field width preset.
        #[arg(long, value_enum, default_value_t = Preset::Standard)]
        preset: Preset,
        /// Price fraction bits for the wide preset.
        #[arg(long, default_value_t = 15)]
        price_fraction_bits: u8,
        /// Volume fraction bits for the wide preset.
        #[arg(long, default_value_t = 15)]
        volume_fraction_bits: u8,
    },
    /// Print every candle of a binary file as JSON lines.
    Decode {
        /// Binary candle file.
        #[arg(long)]
        input: PathBuf,
    },
    /// Print a slice of records as JSON lines.
    Range {
        /// Binary candle file.
        #[arg(long)]
        input: PathBuf,
        /// Index of the first record.
        #[arg(long)]
        from: u64,
        /// Number of records.
        #[arg(long)]
        quantity: u64,
    },
    /// Print the decoded header.
    Header {
        /// Binary candle file.
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    Standard,
    Wide,
    Mini,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_dotenv();

    let _telemetry_guard = init_telemetry();

    let settings = StoreSettings::from_env().context("invalid store settings")?;
    log_config(&settings);

    match cli.command {
        Command::Encode {
            input,
            output,
            symbol,
            interval,
            preset,
            price_fraction_bits,
            volume_fraction_bits,
        } => {
            let header = match preset {
                Preset::Standard => Header::standard_aligned(&symbol, interval),
                Preset::Wide => Header::wide_aligned(
                    &symbol,
                    interval,
                    price_fraction_bits,
                    volume_fraction_bits,
                ),
                Preset::Mini => Header::mini(&symbol, interval, 0),
            }
            .context("invalid header")?;
            encode(&input, &output, header, &settings)
        }
        Command::Decode { input } => {
            let candles = CandleReader::with_settings(&settings)
                .read(&input)
                .with_context(|| format!("failed to decode {}", input.display()))?;
            print_candles(&candles)
        }
        Command::Range {
            input,
            from,
            quantity,
        } => {
            let candles = CandleReader::with_settings(&settings)
                .read_range(&input, from, quantity)
                .with_context(|| format!("failed to read range from {}", input.display()))?;
            print_candles(&candles)
        }
        Command::Header { input } => {
            let header = CandleReader::with_settings(&settings)
                .read_header(&input)
                .with_context(|| format!("failed to read header of {}", input.display()))?;
            print_header(&header)
        }
    }
}

/// Read JSON candles from `input` and write them to `output`.
fn encode(
    input: &Path,
    output: &Path,
    header: Header,
    settings: &StoreSettings,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let candles: Vec<Candle> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of candles", input.display()))?;

    let writer = CandleWriter::with_settings(header, settings);
    writer.add_records(&candles)?;
    let report = writer.write_to_file(output)?;

    tracing::info!(
        records = report.records,
        bytes = report.bytes_written,
        chunks = report.chunks_written,
        partial_flushes = report.partial_flushes,
        "Encode complete"
    );
    Ok(())
}

fn print_candles(candles: &[Candle]) -> anyhow::Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    for candle in candles {
        serde_json::to_writer(&mut out, candle)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn print_header(header: &Header) -> anyhow::Result<()> {
    let value = serde_json::json!({
        "symbol": header.symbol(),
        "interval_secs": header.interval_secs(),
        "freeform": header.freeform(),
        "record_count": header.record_count(),
        "count_width": header.count_width(),
        "gap_width": header.gap_width(),
        "timestamp_width": header.timestamp_width(),
        "price_whole_width": header.price_whole_width(),
        "price_fraction_width": header.price_fraction_width(),
        "volume_whole_width": header.volume_whole_width(),
        "volume_fraction_width": header.volume_fraction_width(),
        "price_digits": header.price_digits(),
        "volume_digits": header.volume_digits(),
        "record_bits": header.record_bits(),
        "header_bits": header.header_bits(),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(settings: &StoreSettings) {
    tracing::debug!(
        write_chunk_bytes = settings.pipeline.write_chunk_bytes,
        flush_timeout_ms = settings.pipeline.flush_timeout.as_millis() as u64,
        channel_capacity = settings.pipeline.channel_capacity,
        read_chunk_bytes = settings.reader.read_chunk_bytes,
        overflow_policy = settings.overflow_policy.as_str(),
        "Configuration loaded"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
