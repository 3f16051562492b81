//! # Consolidator Configuration
//!
//! Loads engine and transport settings from a JSON5 file. Keys are camelCase;
//! every key except `baseUrl` has a default, and `baseUrl` is only required by
//! callers that build an HTTP transport.
//!
//! ```json5
//! {
//!   baseUrl: "http://127.0.0.1:8080/api",
//!   defaultPollRateMs: 1000,   // null = single-shot registrations
//!   requestTimeoutSecs: 10,
//!   maxRetries: 3,
//!   logLevel: "info",
//! }
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::consolidator::{EngineOptions, DEFAULT_POLL_RATE};

/// Environment variable naming the config file used by [`ConsolidatorConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "CONSOLIDATOR_CONFIG";

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON5 or does not match the expected shape.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A transport was requested but no `baseUrl` is configured.
    #[error("No baseUrl configured")]
    MissingBaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsolidatorConfig {
    /// Base URL every polled path is resolved against.
    pub base_url: Option<String>,
    /// Rate for registrations that do not name one. `None` disables repolling for them.
    pub default_poll_rate_ms: Option<u64>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
    /// Optional Bearer token for the HTTP transport.
    pub auth_token: Option<String>,
    /// Minimum log level for binaries (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
    /// Optional log file, in addition to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_poll_rate_ms: Some(DEFAULT_POLL_RATE.as_millis() as u64),
            request_timeout_secs: 10,
            max_retries: 3,
            user_agent: "poll-consolidator/0.1".to_string(),
            auth_token: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl ConsolidatorConfig {
    /// Parses a JSON5 document. Missing keys take their defaults.
    pub fn from_json5_str(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json5_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads the file named by `CONSOLIDATOR_CONFIG`, or the defaults when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// The configured base URL, required by HTTP transports.
    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        self.base_url.as_deref().ok_or(ConfigError::MissingBaseUrl)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            default_rate: self.default_poll_rate_ms.map(Duration::from_millis),
        }
    }

    /// Transport settings derived from this config.
    #[cfg(feature = "retrieve")]
    pub fn http_options(&self) -> crate::retrieve::HttpFetchOptions {
        crate::retrieve::HttpFetchOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            user_agent: self.user_agent.clone(),
            auth_token: self.auth_token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = ConsolidatorConfig::default();
        assert_eq!(config.engine_options(), EngineOptions::default());
        assert_eq!(config.request_timeout_secs, 10);
        assert!(matches!(config.require_base_url(), Err(ConfigError::MissingBaseUrl)));
    }

    #[test]
    fn test_json5_with_comments_and_partial_keys() {
        let config = ConsolidatorConfig::from_json5_str(
            r#"{
                // where to poll
                baseUrl: "http://127.0.0.1:9000/",
                defaultPollRateMs: 250,
                maxRetries: 0,
            }"#,
        )
        .unwrap();

        assert_eq!(config.require_base_url().unwrap(), "http://127.0.0.1:9000/");
        assert_eq!(config.engine_options().default_rate, Some(Duration::from_millis(250)));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_null_poll_rate_means_single_shot() {
        let config = ConsolidatorConfig::from_json5_str("{ defaultPollRateMs: null }").unwrap();
        assert_eq!(config.engine_options().default_rate, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ baseUrl: 'http://localhost/', logLevel: 'debug' }}").unwrap();

        let config = ConsolidatorConfig::load(file.path()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost/"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            ConsolidatorConfig::load("/definitely/not/here.json5"),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            ConsolidatorConfig::from_json5_str("{ maxRetries: 'many' }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
