//! # Configuration Modules
//!
//! File-based configuration for the consolidation engine and its HTTP
//! transport.

/// JSON5 configuration file for engines and transports.
pub mod config_consolidator;

pub use config_consolidator::{ConfigError, ConsolidatorConfig, CONFIG_ENV_VAR};
