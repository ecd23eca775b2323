//! Error kinds shared across the relay.
//!
//! Mirrors the design-level kinds in the specification: most are recovered
//! from locally by the component that raises them (synthesis drops a job,
//! the governor retries or opens its breaker); [`Error::Fatal`] is the only
//! kind the orchestrator treats as a process-exit signal.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// HTTP timeout, connection refused, or a rate-limit response. The
    /// caller (governor) either slept-and-retried already or is about to.
    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    /// Non-200 from the TTS engine's `/audio_query` or `/synthesis`.
    #[error("TTS engine degraded: {0}")]
    DegradedEngine(String),

    /// Synthesized bytes failed WAV validation.
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// A bounded queue was full; the caller dropped the item.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// The audio buffer byte cap was reached.
    #[error("audio buffer cap reached")]
    BufferCap,

    /// Voice transport connected but flapped within the settle window.
    #[error("voice session unstable: {0}")]
    VoiceUnstable(String),

    /// Missing connect/speak/view permission on the target channel.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Detected at startup; the orchestrator exits with code 1.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The governor's circuit breaker is open; the call was skipped.
    #[error("circuit open")]
    CircuitOpen,

    /// Unrecoverable: the orchestrator runs shutdown and exits non-zero.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether this error, for the purposes of a single pipeline job,
    /// should be treated the same as a degraded-engine result (per spec
    /// §7: `CircuitOpen` surfaces to the caller like `DegradedEngine`).
    pub fn is_job_failure(&self) -> bool {
        matches!(self, Error::DegradedEngine(_) | Error::CircuitOpen | Error::MalformedAudio(_))
    }
}
