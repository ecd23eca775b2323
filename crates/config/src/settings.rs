use std::collections::HashMap;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Top-level settings for the orchestrator and every component it wires up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Credential for the chat platform. Required; no default.
    pub discord_bot_token: String,

    /// Voice channel the relay joins and watches for messages.
    pub target_voice_channel_id: String,

    /// Text channel messages are read from. Defaults to the voice channel's
    /// paired text channel id when unset by the caller.
    #[serde(default)]
    pub target_text_channel_id: Option<String>,

    /// Engine tag used when a message's author has no stored preference.
    #[serde(default = "default_tts_engine")]
    pub tts_engine: String,

    /// Default speaker name within `tts_engine`.
    #[serde(default = "default_tts_speaker")]
    pub tts_speaker: String,

    /// Base URL per engine tag, e.g. `{"voicevox": "http://localhost:50021"}`.
    #[serde(default)]
    pub engine_urls: HashMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub enable_self_message_processing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), file: None, json: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_reconnect_delay_s")]
    pub reconnection_cooldown_s: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,
    #[serde(default = "default_startup_attempt_spacing_s")]
    pub startup_attempt_spacing_s: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            reconnection_cooldown_s: default_reconnect_delay_s(),
            settle_delay_ms: default_settle_ms(),
            startup_attempts: default_startup_attempts(),
            startup_attempt_spacing_s: default_startup_attempt_spacing_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-author admission rate: `messages` per `period_s` seconds.
    #[serde(default = "default_rate_limit_messages")]
    pub messages: u32,
    #[serde(default = "default_rate_limit_period_s")]
    pub period_s: u64,
    /// Outbound calls/second enforced by the rate governor.
    #[serde(default = "default_governor_rate_per_second")]
    pub governor_rate_per_second: u32,
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_recovery_s")]
    pub breaker_recovery_s: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages: default_rate_limit_messages(),
            period_s: default_rate_limit_period_s(),
            governor_rate_per_second: default_governor_rate_per_second(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_recovery_s: default_breaker_recovery_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_size")]
    pub synthesis_queue_capacity: usize,
    #[serde(default = "default_queue_size")]
    pub audio_queue_capacity: usize,
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
    #[serde(default = "default_admission_max_chars")]
    pub admission_max_chars: usize,
    #[serde(default = "default_audio_buffer_cap")]
    pub audio_buffer_cap_bytes: usize,
    #[serde(default = "default_per_artifact_cap")]
    pub per_artifact_cap_bytes: usize,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_command_prefixes")]
    pub command_prefixes: Vec<String>,
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            synthesis_queue_capacity: default_queue_size(),
            audio_queue_capacity: default_queue_size(),
            chunk_limit: default_chunk_limit(),
            admission_max_chars: default_admission_max_chars(),
            audio_buffer_cap_bytes: default_audio_buffer_cap(),
            per_artifact_cap_bytes: default_per_artifact_cap(),
            max_consecutive_errors: default_max_consecutive_errors(),
            command_prefixes: default_command_prefixes(),
            dedup_window: default_dedup_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { sample_rate_hz: default_sample_rate() }
    }
}

fn default_tts_engine() -> String {
    "voicevox".to_string()
}
fn default_tts_speaker() -> String {
    "default".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_reconnect_delay_s() -> u64 {
    5
}
fn default_settle_ms() -> u64 {
    500
}
fn default_startup_attempts() -> u32 {
    3
}
fn default_startup_attempt_spacing_s() -> u64 {
    10
}
fn default_rate_limit_messages() -> u32 {
    5
}
fn default_rate_limit_period_s() -> u64 {
    60
}
fn default_governor_rate_per_second() -> u32 {
    50
}
fn default_breaker_failure_threshold() -> u32 {
    5
}
fn default_breaker_recovery_s() -> u64 {
    60
}
fn default_queue_size() -> usize {
    100
}
fn default_chunk_limit() -> usize {
    500
}
fn default_admission_max_chars() -> usize {
    10_000
}
fn default_audio_buffer_cap() -> usize {
    50 * 1024 * 1024
}
fn default_per_artifact_cap() -> usize {
    10 * 1024 * 1024
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn default_command_prefixes() -> Vec<String> {
    vec!["!".into(), "/".into(), ".".into(), ">".into(), "<".into()]
}
fn default_dedup_window() -> usize {
    100
}
fn default_sample_rate() -> u32 {
    48_000
}

impl Settings {
    /// Loads `config/default.{yaml,json,...}`, optionally layers
    /// `config/{env}.*`, then environment variables under the `RELAY`
    /// prefix, then binds the relay's own documented environment variables
    /// directly on top (these take precedence over the layered config).
    pub fn load(env: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false));

        if let Some(env_name) = env {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", env_name)).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("RELAY").separator("__").try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize().unwrap_or_else(|_| {
            // No config file and no RELAY__* env vars set: fall back to an
            // all-defaults settings object, then overlay direct env vars below.
            Settings {
                discord_bot_token: String::new(),
                target_voice_channel_id: String::new(),
                target_text_channel_id: None,
                tts_engine: default_tts_engine(),
                tts_speaker: default_tts_speaker(),
                engine_urls: HashMap::new(),
                logging: LoggingConfig::default(),
                voice: VoiceConfig::default(),
                rate_limit: RateLimitConfig::default(),
                pipeline: PipelineConfig::default(),
                engine: EngineConfig::default(),
                debug: false,
                enable_self_message_processing: false,
            }
        });

        settings.apply_documented_env_vars();
        settings.validate()?;
        Ok(settings)
    }

    /// Binds the literal environment variable names the relay's CLI surface
    /// documents, overriding whatever the layered `config` sources produced.
    fn apply_documented_env_vars(&mut self) {
        if let Ok(v) = std::env::var("DISCORD_BOT_TOKEN") {
            self.discord_bot_token = v;
        }
        if let Ok(v) = std::env::var("TARGET_VOICE_CHANNEL_ID") {
            self.target_voice_channel_id = v;
        }
        if let Ok(v) = std::env::var("TTS_ENGINE") {
            self.tts_engine = v;
        }
        if let Ok(v) = std::env::var("TTS_SPEAKER") {
            self.tts_speaker = v;
        }
        for engine in ["VOICEVOX", "AIVIS"] {
            if let Ok(v) = std::env::var(format!("{engine}_URL")) {
                self.engine_urls.insert(engine.to_lowercase(), v);
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("LOG_FILE") {
            self.logging.file = Some(v);
        }
        if let Ok(v) = std::env::var("COMMAND_PREFIX") {
            self.pipeline.command_prefixes = v.chars().map(|c| c.to_string()).collect();
        }
        if let Some(v) = std::env::var("MAX_MESSAGE_LENGTH").ok().and_then(|s| s.parse().ok()) {
            self.pipeline.admission_max_chars = v;
        }
        if let Some(v) = std::env::var("MESSAGE_QUEUE_SIZE").ok().and_then(|s| s.parse().ok()) {
            self.pipeline.synthesis_queue_capacity = v;
            self.pipeline.audio_queue_capacity = v;
        }
        if let Some(v) = std::env::var("RECONNECT_DELAY").ok().and_then(|s| s.parse().ok()) {
            self.voice.reconnection_cooldown_s = v;
        }
        if let Some(v) = std::env::var("RATE_LIMIT_MESSAGES").ok().and_then(|s| s.parse().ok()) {
            self.rate_limit.messages = v;
        }
        if let Some(v) = std::env::var("RATE_LIMIT_PERIOD").ok().and_then(|s| s.parse().ok()) {
            self.rate_limit.period_s = v;
        }
        if let Ok(v) = std::env::var("DEBUG") {
            self.debug = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("ENABLE_SELF_MESSAGE_PROCESSING") {
            self.enable_self_message_processing =
                matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_bot_token.trim().is_empty() {
            return Err(ConfigError::MissingField("discord_bot_token".to_string()));
        }
        if self.target_voice_channel_id.trim().is_empty() {
            return Err(ConfigError::MissingField("target_voice_channel_id".to_string()));
        }
        if self.rate_limit.governor_rate_per_second == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.governor_rate_per_second".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.pipeline.chunk_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.chunk_limit".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.pipeline.per_artifact_cap_bytes > self.pipeline.audio_buffer_cap_bytes {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.per_artifact_cap_bytes".to_string(),
                message: "must not exceed audio_buffer_cap_bytes".to_string(),
            });
        }
        Ok(())
    }
}
