//! Tracing Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives (default adds `candle_store=info`)
//! - `CANDLE_STORE_LOG_THREADS`: Set to "true" to print thread ids, which
//!   tells the pipeline stages apart (default: false)
//! - `CANDLE_STORE_LOG_ANSI`: Set to "false" to disable colors (default: true)
//!
//! # Usage
//!
//! ```ignore
//! use candle_store::telemetry;
//!
//! // Keep the guard alive for the duration of the program
//! let _guard = telemetry::init();
//! tracing::info!("Encoding candles");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive applied on top of `RUST_LOG`.
const DEFAULT_DIRECTIVE: &str = "candle_store=info";

/// Returned by [`init`]; reports whether this call installed the subscriber.
#[derive(Debug)]
pub struct TelemetryGuard {
    installed: bool,
}

impl TelemetryGuard {
    /// False if another global subscriber was already set.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.installed {
            tracing::debug!("Telemetry shut down");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Print thread ids on every line.
    pub thread_ids: bool,
    /// Colored output.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            thread_ids: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            thread_ids: lookup("CANDLE_STORE_LOG_THREADS")
                .map_or(defaults.thread_ids, |v| v.eq_ignore_ascii_case("true")),
            ansi: lookup("CANDLE_STORE_LOG_ANSI")
                .map_or(defaults.ansi, |v| !v.eq_ignore_ascii_case("false")),
        }
    }
}

/// Initialize tracing with configuration from the environment.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize tracing with custom configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_DIRECTIVE
            .parse()
            .expect("static directive 'candle_store=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(config.thread_ids)
        .with_ansi(config.ansi)
        .with_file(false)
        .with_line_number(false);

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    TelemetryGuard { installed }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert!(!config.thread_ids);
        assert!(config.ansi);
    }

    #[test]
    fn config_from_lookup() {
        let config = TelemetryConfig::from_lookup(|key| match key {
            "CANDLE_STORE_LOG_THREADS" => Some("TRUE".to_string()),
            "CANDLE_STORE_LOG_ANSI" => Some("false".to_string()),
            _ => None,
        });
        assert!(config.thread_ids);
        assert!(!config.ansi);
    }

    #[test]
    fn second_init_is_harmless() {
        let config = TelemetryConfig {
            ansi: false,
            ..TelemetryConfig::default()
        };
        let first = init_with_config(&config);
        let second = init_with_config(&config);
        assert!(!(first.is_installed() && second.is_installed()));
    }
}
