//! Configuration management for the voice call bot
//!
//! Supports loading configuration from:
//! - TOML files
//! - Environment variables (`VOICEBOT` prefix)
//! - Built-in defaults matching the documented contract (5 s capture
//!   ceiling, 20% Hinglish token threshold)

pub mod settings;

pub use settings::{
    load_settings, ClassifierSettings, ProviderPriority, SessionSettings, Settings,
    SynthesisSettings, TurnSettings, DEFAULT_CAPTURE_CEILING_MS, DEFAULT_PROVIDER_TIMEOUT_MS,
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
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
