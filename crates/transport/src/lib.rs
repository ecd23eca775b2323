//! Voice session lifecycle on top of the [`voice_relay_core::Transport`]
//! capability seam: connect/move/reconnect, cooldowns and settle checks.

pub mod session;

pub use session::{SessionConfig, VoiceSessionController};
