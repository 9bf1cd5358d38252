//! Logging configuration and initialization.
//!
//! Provides flexible logging setup with support for:
//! - Environment variable (RUST_LOG) configuration
//! - config.toml `[logging]` section
//! - Multiple output formats (pretty, compact, json)

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Logging configuration from config.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl LogConfig {
    /// Creates a new LogConfig with default values.
    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the logging system.
///
/// Priority:
/// 1. RUST_LOG environment variable (if set)
/// 2. config parameter (if provided)
/// 3. Default: info level, pretty format
///
/// Logs go to stderr so captured frames on stdout stay machine-readable.
/// Calling this more than once keeps the first subscriber.
pub fn init_logging(config: Option<&LogConfig>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = config.map(|c| parse_level(&c.level)).unwrap_or(Level::INFO);
        EnvFilter::new(level.as_str())
    };

    let format = config.map(|c| c.format.as_str()).unwrap_or("pretty");
    let layer = match format {
        "json" => fmt::layer().with_writer(std::io::stderr).json().boxed(),
        "compact" => fmt::layer().with_writer(std::io::stderr).compact().boxed(),
        _ => fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Parses a log level string into a Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
