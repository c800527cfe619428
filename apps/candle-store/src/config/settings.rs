//! Store Configuration Settings
//!
//! Tunables for the write pipeline and reader, loaded from environment
//! variables.

use std::time::Duration;

use crate::codec::OverflowPolicy;
use crate::error::{Result, StoreError};

/// Write pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Bytes buffered by the flush stage before each sink write.
    pub write_chunk_bytes: usize,
    /// How long a partial chunk may wait before it is flushed anyway.
    pub flush_timeout: Duration,
    /// Bound of each inter-stage channel.
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            write_chunk_bytes: 64,
            flush_timeout: Duration::from_millis(500),
            channel_capacity: 64,
        }
    }
}

/// Reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Bytes pulled from the source per read call.
    pub read_chunk_bytes: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            read_chunk_bytes: 64,
        }
    }
}

/// Complete store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    /// Write pipeline settings.
    pub pipeline: PipelineSettings,
    /// Reader settings.
    pub reader: ReaderSettings,
    /// Encode overflow handling.
    pub overflow_policy: OverflowPolicy,
}

impl StoreSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unknown overflow policy or a
    /// zero chunk size or channel capacity.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unset or unparsable numbers fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            write_chunk_bytes: parse_usize(
                &lookup,
                "CANDLE_STORE_WRITE_CHUNK_BYTES",
                pipeline_defaults.write_chunk_bytes,
            ),
            flush_timeout: parse_duration_millis(
                &lookup,
                "CANDLE_STORE_FLUSH_TIMEOUT_MS",
                pipeline_defaults.flush_timeout,
            ),
            channel_capacity: parse_usize(
                &lookup,
                "CANDLE_STORE_CHANNEL_CAPACITY",
                pipeline_defaults.channel_capacity,
            ),
        };

        let reader = ReaderSettings {
            read_chunk_bytes: parse_usize(
                &lookup,
                "CANDLE_STORE_READ_CHUNK_BYTES",
                ReaderSettings::default().read_chunk_bytes,
            ),
        };

        let overflow_policy = match lookup("CANDLE_STORE_OVERFLOW_POLICY") {
            None => OverflowPolicy::default(),
            Some(raw) => OverflowPolicy::parse(&raw).ok_or_else(|| {
                StoreError::Config(format!(
                    "CANDLE_STORE_OVERFLOW_POLICY must be 'error' or 'wrap', got {raw:?}"
                ))
            })?,
        };

        let settings = Self {
            pipeline,
            reader,
            overflow_policy,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject zero-sized buffers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("write_chunk_bytes", self.pipeline.write_chunk_bytes),
            ("channel_capacity", self.pipeline.channel_capacity),
            ("read_chunk_bytes", self.reader.read_chunk_bytes),
        ] {
            if value == 0 {
                return Err(StoreError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

fn parse_usize<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn store_settings_defaults() {
        let settings = StoreSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.pipeline.write_chunk_bytes, 64);
        assert_eq!(settings.pipeline.flush_timeout, Duration::from_millis(500));
        assert_eq!(settings.pipeline.channel_capacity, 64);
        assert_eq!(settings.reader.read_chunk_bytes, 64);
        assert_eq!(settings.overflow_policy, OverflowPolicy::Error);
        assert_eq!(settings, StoreSettings::default());
    }

    #[test]
    fn store_settings_overrides() {
        let settings = StoreSettings::from_lookup(lookup_from(&[
            ("CANDLE_STORE_WRITE_CHUNK_BYTES", "128"),
            ("CANDLE_STORE_FLUSH_TIMEOUT_MS", "25"),
            ("CANDLE_STORE_CHANNEL_CAPACITY", " 8 "),
            ("CANDLE_STORE_READ_CHUNK_BYTES", "4096"),
            ("CANDLE_STORE_OVERFLOW_POLICY", "Wrap"),
        ]))
        .unwrap();
        assert_eq!(settings.pipeline.write_chunk_bytes, 128);
        assert_eq!(settings.pipeline.flush_timeout, Duration::from_millis(25));
        assert_eq!(settings.pipeline.channel_capacity, 8);
        assert_eq!(settings.reader.read_chunk_bytes, 4096);
        assert_eq!(settings.overflow_policy, OverflowPolicy::Wrap);
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let settings = StoreSettings::from_lookup(lookup_from(&[(
            "CANDLE_STORE_WRITE_CHUNK_BYTES",
            "lots",
        )]))
        .unwrap();
        assert_eq!(settings.pipeline.write_chunk_bytes, 64);
    }

    #[test]
    fn zero_sizes_rejected() {
        let err = StoreSettings::from_lookup(lookup_from(&[("CANDLE_STORE_CHANNEL_CAPACITY", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn unknown_policy_rejected() {
        let result =
            StoreSettings::from_lookup(lookup_from(&[("CANDLE_STORE_OVERFLOW_POLICY", "clamp")]));
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
