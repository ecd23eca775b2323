//! Shared types, traits and error kinds for the voice relay.
//!
//! This crate has no I/O of its own; it exists so every other crate can
//! agree on the same [`model`] types and the same [`traits`] capability
//! seams without depending on each other directly.

pub mod clock;
pub mod error;
pub mod model;
pub mod traits;

pub use clock::{FakeClock, SystemClock};
pub use error::{Error, Result};
pub use model::{
    AdmittedMessage, AudioArtifact, CircuitBreakerState, CircuitState, FailureCounter,
    MessageKind, RateGovernorState, SynthesisJob, TextEvent, UserVoicePreference, VoiceSession,
    VoiceSessionState,
};
pub use traits::{
    Clock, EventSource, PermissionChecker, PingOutcome, PlatformEvent, PreferenceStore, Transport,
    Tts, TransportHealth,
};
