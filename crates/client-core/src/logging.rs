//! Logging setup for applications embedding the client
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the application. This helper covers the common case.
//!
//! ```rust,no_run
//! use agentdesk_client_core::logging::{setup_logging, LoggingConfig};
//! use tracing::Level;
//!
//! setup_logging(LoggingConfig::new(Level::DEBUG, "agent-desktop").with_json()).ok();
//! ```

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ClientError, ClientResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// Emit one JSON object per line
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
    pub log_spans: bool,
    /// Application name logged at startup
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "agentdesk".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install a global subscriber. `RUST_LOG` directives are honoured on top of
/// the configured level.
///
/// Fails if a global subscriber is already set.
pub fn setup_logging(config: LoggingConfig) -> ClientResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|e| ClientError::internal_error(format!("failed to install logger: {}", e)))?;

    tracing::info!("Starting {} v{}", config.app_name, crate::VERSION);
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> ClientResult<Level> {
    Level::from_str(level)
        .map_err(|_| ClientError::invalid_configuration("log_level", format!("invalid log level: {}", level)))
}
