//! Capability seams between the orchestrator and its collaborators.
//!
//! Each trait here stands in for a thing the original Python implementation
//! reached for directly (a gateway client, an HTTP session, a JSON file on
//! disk, `time.monotonic()`). Keeping them as traits lets every crate's test
//! suite substitute an in-memory fake instead of touching a live service.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::model::{TextEvent, UserVoicePreference};

/// Inbound event stream from the chat platform. The orchestrator polls this
/// rather than holding a concrete gateway client.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn recv(&self) -> Option<PlatformEvent>;
}

#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Ready,
    Message(TextEvent),
    VoiceStateUpdate { member_id: String, before_channel: Option<String>, after_channel: Option<String>, suppressed: bool },
    VoiceServerUpdate { token: String, guild_id: String, endpoint: String },
    Disconnect,
    Resume,
    Error(String),
}

/// Health snapshot for a voice connection, returned by [`Transport::health`].
#[derive(Debug, Clone, Default)]
pub struct TransportHealth {
    pub voice_client_exists: bool,
    pub voice_client_connected: bool,
    pub channel_accessible: bool,
    pub audio_playback_ready: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Voice-channel connection lifecycle, implemented by the real gateway
/// adapter in production and by an in-memory fake in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, channel_id: &str) -> Result<()>;
    async fn move_to(&self, channel_id: &str) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn unsuppress(&self) -> Result<()>;
    async fn play(&self, pcm_or_wav: Vec<u8>) -> Result<()>;
    async fn is_playing(&self) -> bool;
    async fn stop(&self) -> Result<()>;
    async fn health(&self) -> TransportHealth;
}

/// Outcome of a `/version` liveness probe against a TTS engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    Ok,
    ConnectionRefused,
    Timeout,
    Http(u16),
    Unexpected(String),
}

/// TTS HTTP engine client, wrapped by the rate governor at call sites.
#[async_trait]
pub trait Tts: Send + Sync {
    async fn ping(&self, engine_base_url: &str) -> PingOutcome;
    async fn synthesize_text(
        &self,
        text: &str,
        speaker_id: i64,
        engine_base_url: &str,
    ) -> Option<Vec<u8>>;
}

/// Durable per-author speaker preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, author_id: &str) -> Option<UserVoicePreference>;
    async fn set(&self, author_id: &str, pref: UserVoicePreference) -> Result<()>;
}

/// Monotonic time source, abstracted so tests can advance time without
/// sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Stands in for the chat platform's permission model, which is otherwise
/// duck-typed guild/role/channel state with no natural Rust shape. Returns
/// the names of any missing critical permissions for the target channel.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check_target_channel(&self) -> std::result::Result<(), Vec<String>>;
}
