//! Data model shared by every stage of the relay.

use serde::{Deserialize, Serialize};

/// A raw inbound message from the chat platform, before admission rules run.
///
/// Transient: consumed at admission and never stored beyond that one stage.
#[derive(Debug, Clone)]
pub struct TextEvent {
    pub author_id: String,
    pub author_is_automated: bool,
    pub channel_id: String,
    pub content: String,
    pub message_kind: MessageKind,
    pub created_at_unix_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Default,
    System,
    Other,
}

/// Produced by message admission, one per accepted [`TextEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedMessage {
    pub group_id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub sanitized_text: String,
    pub chunks: Vec<String>,
    pub content_hash: u64,
}

/// One chunk of an [`AdmittedMessage`], queued for synthesis.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub text: String,
    pub author_id: String,
    pub author_display_name: String,
    pub group_id: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub content_hash: u64,
}

/// Synthesized audio, owned by exactly one queue at a time.
///
/// The playback worker is responsible for final disposal on every code path.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub group_id: String,
    pub chunk_index: usize,
    pub priority: i32,
    pub size_bytes: usize,
    pub enqueue_sequence: u64,
}

impl AudioArtifact {
    pub fn ordering_key(&self) -> (i32, u64) {
        (self.priority, self.enqueue_sequence)
    }
}

/// A user's preferred speaker, durable across restarts via a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserVoicePreference {
    pub speaker_id: i64,
    pub speaker_display_name: String,
    pub engine_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct VoiceSession {
    pub state: VoiceSessionState,
    pub target_channel_id: String,
    pub current_channel_id: Option<String>,
    pub last_attempt_monotonic: Option<std::time::Duration>,
    pub consecutive_startup_failures: u32,
}

impl VoiceSession {
    pub fn new(target_channel_id: impl Into<String>) -> Self {
        Self {
            state: VoiceSessionState::Disconnected,
            target_channel_id: target_channel_id.into(),
            current_channel_id: None,
            last_attempt_monotonic: None,
            consecutive_startup_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RateGovernorState {
    pub last_emit_monotonic: Option<std::time::Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_monotonic: Option<std::time::Duration>,
    pub failure_threshold: u32,
    pub recovery_seconds: u64,
}

impl CircuitBreakerState {
    pub fn new(failure_threshold: u32, recovery_seconds: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_monotonic: None,
            failure_threshold,
            recovery_seconds,
        }
    }
}

/// A sliding-window or consecutive-run failure counter, keyed by kind in
/// [`crate::traits::FailureKind`] usage sites.
#[derive(Debug, Clone, Copy)]
pub struct FailureCounter {
    pub current_count: u32,
    pub window_seconds: Option<u64>,
    pub window_start_monotonic: std::time::Duration,
    pub max_allowed: u32,
}

impl FailureCounter {
    pub fn new(max_allowed: u32, window_seconds: Option<u64>, now: std::time::Duration) -> Self {
        Self { current_count: 0, window_seconds, window_start_monotonic: now, max_allowed }
    }

    pub fn exceeded(&self) -> bool {
        self.current_count >= self.max_allowed
    }
}
