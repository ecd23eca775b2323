//! Configuration loading and validation for the voice relay.
//!
//! Layering follows `config`'s usual precedence: `config/default.yaml` <
//! `config/{env}.yaml` < environment variables. On top of that generic
//! layering, the specific environment variables the relay's CLI surface
//! documents (`DISCORD_BOT_TOKEN`, `TARGET_VOICE_CHANNEL_ID`, ...) are bound
//! directly, matching how `config_manager.py` read `os.environ` in the
//! original bot.

pub mod settings;

pub use settings::{
    EngineConfig, LoggingConfig, PipelineConfig, RateLimitConfig, Settings, VoiceConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voice_relay_core::Error {
    fn from(err: ConfigError) -> Self {
        voice_relay_core::Error::ConfigInvalid(err.to_string())
    }
}
