//! Logging setup for hosts and tests
//!
//! The library only emits `tracing` events. Hosts that do not already run a
//! subscriber can install one here:
//! - pretty console output for development
//! - JSON lines for production log collection
//! - captured output for tests
//!
//! `RUST_LOG` takes precedence over the configured default filter.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::{GridError, Result};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    /// Compact lines routed through the test harness capture
    Test,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Whether to include file/line information in logs
    pub include_location: bool,
    /// Whether to log span open/close (useful to time store calls)
    pub enable_spans: bool,
    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl LoggingConfig {
    /// Verbose pretty console output
    pub fn development() -> Self {
        Self {
            format: LogFormat::Pretty,
            include_location: cfg!(debug_assertions),
            enable_spans: cfg!(debug_assertions),
            default_filter: "info,gridkit_core=debug,gridkit_list=debug".to_string(),
        }
    }

    /// JSON output, warnings and above except for gridkit itself
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,gridkit_core=info,gridkit_list=info".to_string(),
        }
    }

    pub fn testing() -> Self {
        Self {
            format: LogFormat::Test,
            include_location: true,
            enable_spans: false,
            default_filter: "debug".to_string(),
        }
    }
}

/// Install a global subscriber.
///
/// Fails if a subscriber is already installed; tests call this from every
/// test and ignore the error.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW/CLOSE only: ENTER would fire on every re-poll of an awaited future
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .pretty()
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Test => fmt::layer()
            .with_test_writer()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .compact()
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| GridError::Configuration(format!("logging already initialized: {}", e)))?;

    tracing::debug!(format = ?config.format, "Logging initialized");
    Ok(())
}
