//! Configuration management for callbridge
//!
//! Supports loading configuration from:
//! - TOML files (`config/default.toml`, optional environment overlay)
//! - Environment variables (CALLBRIDGE_ prefix, `__` section separator)
//!
//! Sections deserialize into the config structs owned by the crates they
//! tune, so a provider or pipeline default changes in exactly one place.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, BillingSettings, ObservabilityConfig, PersistenceConfig, ProvidersConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
