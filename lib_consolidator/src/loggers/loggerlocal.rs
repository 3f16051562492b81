//! # Local Logger
//!
//! Installs a `fern` dispatcher behind the `log` facade: every record goes to
//! stderr and, optionally, to an append-only log file, formatted as
//! `[%Y-%m-%d %H:%M:%S][target][LEVEL] message`.

use std::path::Path;

use log::LevelFilter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),

    #[error("Failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    /// A global logger was already installed in this process.
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// Parses `error`, `warn`, `info`, `debug`, `trace` or `off`, case-insensitively.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| LoggerError::UnknownLevel(level.to_string()))
}

/// Installs the process-wide logger.
///
/// # Arguments
/// * `level` - The minimum level to emit, e.g. `"info"`.
/// * `log_file` - When set, records are also appended to this file.
pub fn setup_logging(level: &str, log_file: Option<&Path>) -> Result<(), LoggerError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(level)?)
        .chain(std::io::stderr());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level(" DEBUG ").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::Off);
        assert!(matches!(parse_level("loud"), Err(LoggerError::UnknownLevel(_))));
    }

    #[test]
    fn test_unknown_level_is_rejected_before_install() {
        assert!(setup_logging("verbose", None).is_err());
    }
}
