//! Structured Logging for the Bridge Core
//!
//! Thin wrapper over `tracing-subscriber`: plain formatted output for
//! interactive use, JSON output for log aggregation. Modules log under
//! `bridge::` targets (`bridge::insight`, `bridge::pipeline`, ...).

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("subscriber already initialized")]
    AlreadyInitialized,
}

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the supplied level when set. Returns
/// `AlreadyInitialized` if a subscriber was installed earlier (tests call
/// this more than once).
pub fn init_logging(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("platform_bridge={}", level_str(level))));

    let result = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };

    result.map_err(|_| LoggingError::AlreadyInitialized)
}

/// Initialize from a `BRIDGE_LOG_LEVEL`-style string
pub fn init_from_env() -> Result<(), LoggingError> {
    let level = std::env::var("BRIDGE_LOG_LEVEL")
        .map(|s| LogLevel::from(s.as_str()))
        .unwrap_or(LogLevel::Info);
    init_logging(level, false)
}

fn level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::from("bogus"), LogLevel::Info);
    }

    #[test]
    fn test_double_init() {
        // First call may or may not win depending on test order; the second
        // must report AlreadyInitialized rather than panic.
        let _ = init_logging(LogLevel::Debug, false);
        assert!(matches!(
            init_logging(LogLevel::Debug, false),
            Err(LoggingError::AlreadyInitialized)
        ));
    }
}
