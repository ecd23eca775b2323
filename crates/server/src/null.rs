//! In-process fakes for the collaborator traits the chat-platform SDK would
//! otherwise satisfy. Per the Open Question resolution: no vendored/stub
//! Discord client is fabricated here, only the seam a real gateway adapter
//! would implement.

use async_trait::async_trait;

use voice_relay_core::traits::{PermissionChecker, PlatformEvent, TransportHealth};
use voice_relay_core::{EventSource, Result, Transport};

/// An event source that never produces events, for standalone runs with no
/// live gateway connection wired in.
pub struct NullEventSource;

#[async_trait]
impl EventSource for NullEventSource {
    async fn recv(&self) -> Option<PlatformEvent> {
        std::future::pending::<()>().await;
        None
    }
}

/// A transport that reports itself connected and never actually plays
/// anything, for standalone runs or smoke tests of the orchestrator wiring.
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn connect(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
    async fn move_to(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
    async fn unsuppress(&self) -> Result<()> {
        Ok(())
    }
    async fn play(&self, _pcm_or_wav: Vec<u8>) -> Result<()> {
        Ok(())
    }
    async fn is_playing(&self) -> bool {
        false
    }
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
    async fn health(&self) -> TransportHealth {
        TransportHealth { voice_client_exists: true, voice_client_connected: true, channel_accessible: true, audio_playback_ready: true, issues: vec![], recommendations: vec![] }
    }
}

/// Always reports the target channel's permissions as granted.
pub struct AlwaysPermitted;

#[async_trait]
impl PermissionChecker for AlwaysPermitted {
    async fn check_target_channel(&self) -> std::result::Result<(), Vec<String>> {
        Ok(())
    }
}
