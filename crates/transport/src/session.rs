//! Voice session lifecycle: connect / move / reconnect / disconnect.
//!
//! Grounded on `voice/connection_manager.py`'s `VoiceConnectionManager`
//! (cooldown, move-then-fresh-connect fallback, settle-delay stability
//! check, stage-channel unsuppress) and `voice/gateway.py`'s
//! `VoiceGatewayManager` (voice-server/state-update bookkeeping), reshaped
//! from a duck-typed `discord.VoiceClient` wrapper onto the [`Transport`]
//! capability seam so the state machine is testable without a live gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use voice_relay_core::model::{VoiceSession, VoiceSessionState};
use voice_relay_core::{Clock, Error, Result, Transport};

pub struct SessionConfig {
    pub reconnection_cooldown_s: u64,
    pub settle_delay_ms: u64,
}

pub struct VoiceSessionController {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    session: Mutex<VoiceSession>,
    reconnecting: AtomicBool,
}

impl VoiceSessionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
        target_channel_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            clock,
            config,
            session: Mutex::new(VoiceSession::new(target_channel_id)),
            reconnecting: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> VoiceSessionState {
        self.session.lock().state
    }

    pub fn current_channel_id(&self) -> Option<String> {
        self.session.lock().current_channel_id.clone()
    }

    async fn respect_cooldown(&self) {
        let wait = {
            let session = self.session.lock();
            let now = self.clock.now();
            let cooldown = Duration::from_secs(self.config.reconnection_cooldown_s);
            match session.last_attempt_monotonic {
                Some(last) if now.saturating_sub(last) < cooldown => Some(cooldown - now.saturating_sub(last)),
                _ => None,
            }
        };
        if let Some(wait) = wait {
            debug!(?wait, "respecting reconnection cooldown");
            tokio::time::sleep(wait).await;
        }
        self.session.lock().last_attempt_monotonic = Some(self.clock.now());
    }

    /// Connects (or moves) to `channel_id`, becoming `CONNECTED` on success.
    pub async fn connect(&self, channel_id: &str) -> Result<()> {
        self.respect_cooldown().await;

        let (state, current) = {
            let s = self.session.lock();
            (s.state, s.current_channel_id.clone())
        };

        if state == VoiceSessionState::Connected && current.as_deref() == Some(channel_id) {
            return Ok(());
        }

        if state == VoiceSessionState::Connected {
            info!(from = ?current, to = channel_id, "moving voice channels");
            match self.transport.move_to(channel_id).await {
                Ok(()) => {
                    self.set_connected(channel_id);
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "move failed, falling back to fresh connect");
                    let _ = self.transport.disconnect().await;
                    self.set_state(VoiceSessionState::Disconnected);
                }
            }
        }

        self.set_state(VoiceSessionState::Connecting);
        self.transport.connect(channel_id).await?;

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let health = self.transport.health().await;
        if !health.voice_client_connected {
            warn!("connection unstable, Discord-equivalent disconnected immediately");
            self.set_state(VoiceSessionState::Disconnected);
            return Err(Error::VoiceUnstable("transport disconnected within settle window".into()));
        }

        // Best-effort: unsuppress unconditionally. Stage-channel detection
        // (whether the bot is actually suppressed) lives in the chat
        // platform SDK, out of scope here; issuing it is a no-op when the
        // channel isn't a stage channel.
        let _ = self.transport.unsuppress().await;

        self.set_connected(channel_id);
        Ok(())
    }

    /// Connects with up to `attempts` tries spaced by `spacing`, incrementing
    /// `consecutive_startup_failures` on each failed attempt.
    pub async fn connect_with_retry(&self, channel_id: &str, attempts: u32, spacing: Duration) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..attempts.max(1) {
            match self.connect(channel_id).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "voice connect attempt failed");
                    self.session.lock().consecutive_startup_failures += 1;
                    last_err = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(spacing).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Fatal("voice startup failed with no attempts".into())))
    }

    /// Best-effort graceful disconnect. Safe to call repeatedly (P7).
    pub async fn disconnect(&self) -> Result<()> {
        if self.session.lock().state == VoiceSessionState::Disconnected {
            return Ok(());
        }
        let _ = self.transport.disconnect().await;
        let mut s = self.session.lock();
        s.state = VoiceSessionState::Disconnected;
        s.current_channel_id = None;
        Ok(())
    }

    /// Strips a leading `scheme://` from a voice-server endpoint, matching
    /// the original gateway manager's diagnostic normalization.
    pub fn normalize_endpoint(endpoint: &str) -> String {
        match endpoint.split_once("://") {
            Some((_, rest)) => rest.to_string(),
            None => endpoint.to_string(),
        }
    }

    /// Called on a voice-state-update where `before_channel` was the target
    /// channel and `after_channel` is `None`: an external disconnection.
    /// Single-flight guarded so overlapping events only trigger one
    /// reconnection attempt.
    pub async fn handle_external_disconnect(&self, target_channel_id: &str) {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            debug!("external disconnect observed, reconnection already in flight");
            return;
        }
        self.set_state(VoiceSessionState::Reconnecting);
        let result = self.connect(target_channel_id).await;
        if let Err(e) = result {
            warn!(error = %e, "reconnection after external disconnect failed");
        }
        self.reconnecting.store(false, Ordering::Release);
    }

    pub async fn health(&self) -> voice_relay_core::traits::TransportHealth {
        self.transport.health().await
    }

    fn set_state(&self, state: VoiceSessionState) {
        self.session.lock().state = state;
    }

    fn set_connected(&self, channel_id: &str) {
        let mut s = self.session.lock();
        s.state = VoiceSessionState::Connected;
        s.current_channel_id = Some(channel_id.to_string());
        s.consecutive_startup_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_relay_core::traits::TransportHealth;
    use voice_relay_core::FakeClock;

    struct FakeTransport {
        connect_calls: Mutex<u32>,
        move_calls: Mutex<u32>,
        disconnect_calls: Mutex<u32>,
        connect_fails: bool,
        health_connected: bool,
    }

    impl Default for FakeTransport {
        fn default() -> Self {
            Self {
                connect_calls: Mutex::new(0),
                move_calls: Mutex::new(0),
                disconnect_calls: Mutex::new(0),
                connect_fails: false,
                health_connected: true,
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self, _channel_id: &str) -> Result<()> {
            *self.connect_calls.lock() += 1;
            if self.connect_fails {
                return Err(Error::TransientTransport("refused".into()));
            }
            Ok(())
        }
        async fn move_to(&self, _channel_id: &str) -> Result<()> {
            *self.move_calls.lock() += 1;
            Ok(())
        }
        async fn disconnect(&self) -> Result<()> {
            *self.disconnect_calls.lock() += 1;
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
            TransportHealth { voice_client_connected: self.health_connected, ..Default::default() }
        }
    }

    fn controller(transport: Arc<FakeTransport>) -> VoiceSessionController {
        VoiceSessionController::new(
            transport,
            Arc::new(FakeClock::new()),
            SessionConfig { reconnection_cooldown_s: 0, settle_delay_ms: 0 },
            "target",
        )
    }

    #[tokio::test]
    async fn connect_transitions_to_connected() {
        let controller = controller(Arc::new(FakeTransport::default()));
        controller.connect("target").await.unwrap();
        assert_eq!(controller.state(), VoiceSessionState::Connected);
        assert_eq!(controller.current_channel_id(), Some("target".to_string()));
    }

    #[tokio::test]
    async fn connect_to_same_channel_while_connected_is_a_noop() {
        let transport = Arc::new(FakeTransport::default());
        let controller = controller(transport.clone());
        controller.connect("target").await.unwrap();
        controller.connect("target").await.unwrap();
        assert_eq!(*transport.connect_calls.lock(), 1);
    }

    #[tokio::test]
    async fn connect_to_different_channel_while_connected_moves() {
        let transport = Arc::new(FakeTransport::default());
        let controller = controller(transport.clone());
        controller.connect("target").await.unwrap();
        controller.connect("other").await.unwrap();
        assert_eq!(*transport.move_calls.lock(), 1);
        assert_eq!(controller.current_channel_id(), Some("other".to_string()));
    }

    #[tokio::test]
    async fn unstable_connection_after_settle_is_reported() {
        let transport = FakeTransport { health_connected: false, ..Default::default() };
        let controller = controller(Arc::new(transport));
        let result = controller.connect("target").await;
        assert!(matches!(result, Err(Error::VoiceUnstable(_))));
        assert_eq!(controller.state(), VoiceSessionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let transport = Arc::new(FakeTransport::default());
        let controller = controller(transport.clone());
        controller.connect("target").await.unwrap();
        controller.disconnect().await.unwrap();
        controller.disconnect().await.unwrap();
        assert_eq!(controller.state(), VoiceSessionState::Disconnected);
        assert_eq!(*transport.disconnect_calls.lock(), 1);
    }

    #[tokio::test]
    async fn connect_with_retry_gives_up_after_n_attempts() {
        let transport = FakeTransport { connect_fails: true, ..Default::default() };
        let transport = Arc::new(transport);
        let controller = controller(transport.clone());
        let result = controller.connect_with_retry("target", 3, Duration::from_millis(1)).await;
        assert!(result.is_err());
        assert_eq!(*transport.connect_calls.lock(), 3);
        assert_eq!(controller.session.lock().consecutive_startup_failures, 3);
    }

    #[tokio::test]
    async fn handle_external_disconnect_reconnects_to_target() {
        let transport = Arc::new(FakeTransport::default());
        let controller = controller(transport.clone());
        controller.connect("target").await.unwrap();
        controller.handle_external_disconnect("target").await;
        assert_eq!(controller.state(), VoiceSessionState::Connected);
        assert_eq!(*transport.connect_calls.lock(), 2);
    }

    #[test]
    fn normalize_endpoint_strips_scheme() {
        assert_eq!(VoiceSessionController::normalize_endpoint("wss://voice.example.com"), "voice.example.com");
        assert_eq!(VoiceSessionController::normalize_endpoint("voice.example.com"), "voice.example.com");
    }
}
