//! Health loop (60s) and permission loop (300s), grounded on
//! `health_monitor.py`'s `HealthMonitor`: `_health_monitoring_loop` /
//! `_permission_check_loop` running against `_perform_health_checks` /
//! `_check_bot_permissions`, with `_check_termination_conditions` deciding
//! whether to call `_trigger_termination`.
//!
//! The module-level `health_monitor: HealthMonitor | None` singleton from
//! the original is reshaped into an explicitly constructed component the
//! orchestrator owns and spawns, per the design notes on component
//! lifetime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info, warn};

use voice_relay_core::{Clock, PermissionChecker, PingOutcome, TransportHealth, Tts};
use voice_relay_transport::VoiceSessionController;

use crate::ledger::{FailureLedger, FailureLedgerConfig};
use crate::status::HealthStatus;

/// Abstracts "ask the voice transport how it's doing" so the monitor can be
/// tested without a live [`VoiceSessionController`].
#[async_trait]
pub trait VoiceHealthProbe: Send + Sync {
    async fn voice_health(&self) -> TransportHealth;
}

#[async_trait]
impl VoiceHealthProbe for VoiceSessionController {
    async fn voice_health(&self) -> TransportHealth {
        self.health().await
    }
}

pub struct HealthMonitorConfig {
    pub health_interval_s: u64,
    pub permission_interval_s: u64,
    pub ledger: FailureLedgerConfig,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self { health_interval_s: 60, permission_interval_s: 300, ledger: FailureLedgerConfig::default() }
    }
}

pub struct HealthMonitor {
    clock: Arc<dyn Clock>,
    tts: Arc<dyn Tts>,
    engine_base_url: String,
    voice_probe: Arc<dyn VoiceHealthProbe>,
    permission_checker: Arc<dyn PermissionChecker>,
    config: HealthMonitorConfig,
    ledger: FailureLedger,
    status: Mutex<HealthStatus>,
    termination: watch::Sender<Option<String>>,
    graceful_shutdown: Mutex<bool>,
}

impl HealthMonitor {
    pub fn new(
        clock: Arc<dyn Clock>,
        tts: Arc<dyn Tts>,
        engine_base_url: String,
        voice_probe: Arc<dyn VoiceHealthProbe>,
        permission_checker: Arc<dyn PermissionChecker>,
        config: HealthMonitorConfig,
    ) -> Self {
        let ledger = FailureLedger::new(clock.clone(), FailureLedgerConfig {
            disconnect_10m_max: config.ledger.disconnect_10m_max,
            disconnect_30m_max: config.ledger.disconnect_30m_max,
            disconnect_1h_max: config.ledger.disconnect_1h_max,
            api_unavailable_threshold_s: config.ledger.api_unavailable_threshold_s,
        });
        let (termination, _) = watch::channel(None);
        Self {
            clock,
            tts,
            engine_base_url,
            voice_probe,
            permission_checker,
            config,
            ledger,
            status: Mutex::new(HealthStatus::default()),
            termination,
            graceful_shutdown: Mutex::new(false),
        }
    }

    pub fn snapshot(&self) -> HealthStatus {
        self.status.lock().clone()
    }

    pub fn termination_receiver(&self) -> watch::Receiver<Option<String>> {
        self.termination.subscribe()
    }

    /// Called by the voice transport layer whenever it observes an external
    /// disconnection from the target channel.
    pub fn record_disconnection(&self) {
        self.ledger.record_voice_disconnect();
        self.maybe_terminate();
    }

    async fn perform_health_checks(&self) {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        match self.tts.ping(&self.engine_base_url).await {
            PingOutcome::Ok => self.ledger.record_api_success(),
            other => {
                self.ledger.record_api_failure();
                issues.push(format!("TTS engine unreachable: {other:?}"));
                recommendations.push("verify the TTS engine process is running".to_string());
            }
        }

        let voice = self.voice_probe.voice_health().await;
        issues.extend(voice.issues);
        recommendations.extend(voice.recommendations);
        if !voice.voice_client_connected {
            issues.push("voice transport is not connected".to_string());
        }

        if let Err(missing) = self.permission_checker.check_target_channel().await {
            for perm in missing {
                issues.push(format!("missing permission: {perm}"));
            }
            recommendations.push("grant connect/speak/view on the target channel".to_string());
        }

        let (d10, d30, d1h) = self.ledger.disconnect_counts();
        let healthy = issues.is_empty();
        *self.status.lock() = HealthStatus {
            healthy,
            issues,
            recommendations,
            last_check_monotonic_secs: self.clock.now().as_secs(),
            voice_disconnects_10m: d10,
            voice_disconnects_30m: d30,
            voice_disconnects_1h: d1h,
            api_unavailable_seconds: self.ledger.api_unavailable_seconds(),
        };
    }

    async fn check_critical_permissions(&self) {
        if let Err(missing) = self.permission_checker.check_target_channel().await {
            error!(?missing, "critical permission missing in target guild");
            self.trigger_termination(format!("missing critical permissions: {}", missing.join(", ")));
        }
    }

    fn maybe_terminate(&self) {
        if let Some(reason) = self.ledger.should_terminate() {
            self.trigger_termination(reason);
        }
    }

    /// Idempotent: only the first call publishes a termination reason.
    fn trigger_termination(&self, reason: String) {
        let mut shutdown = self.graceful_shutdown.lock();
        if *shutdown {
            return;
        }
        *shutdown = true;
        warn!(reason = %reason, "health monitor triggering termination");
        self.termination.send_replace(Some(reason));
    }

    /// Runs the 60s health-check loop until shutdown is signaled.
    pub async fn run_health_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.health_interval_s));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.perform_health_checks().await;
                    self.maybe_terminate();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("health loop shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Runs the 300s guild-wide permission re-check loop until shutdown.
    pub async fn run_permission_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.permission_interval_s));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_critical_permissions().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("permission loop shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_core::FakeClock;

    struct FixedTts(PingOutcome);

    #[async_trait]
    impl Tts for FixedTts {
        async fn ping(&self, _engine_base_url: &str) -> PingOutcome {
            self.0.clone()
        }
        async fn synthesize_text(&self, _text: &str, _speaker_id: i64, _engine_base_url: &str) -> Option<Vec<u8>> {
            None
        }
    }

    struct FixedVoiceProbe(TransportHealth);

    #[async_trait]
    impl VoiceHealthProbe for FixedVoiceProbe {
        async fn voice_health(&self) -> TransportHealth {
            self.0.clone()
        }
    }

    struct FixedPermissions(Vec<String>);

    #[async_trait]
    impl PermissionChecker for FixedPermissions {
        async fn check_target_channel(&self) -> std::result::Result<(), Vec<String>> {
            if self.0.is_empty() { Ok(()) } else { Err(self.0.clone()) }
        }
    }

    fn monitor(tts: PingOutcome, voice_connected: bool, missing_perms: Vec<String>) -> HealthMonitor {
        HealthMonitor::new(
            Arc::new(FakeClock::new()),
            Arc::new(FixedTts(tts)),
            "http://localhost:50021".into(),
            Arc::new(FixedVoiceProbe(TransportHealth { voice_client_connected: voice_connected, ..Default::default() })),
            Arc::new(FixedPermissions(missing_perms)),
            HealthMonitorConfig::default(),
        )
    }

    #[tokio::test]
    async fn healthy_checks_produce_healthy_status() {
        let monitor = monitor(PingOutcome::Ok, true, vec![]);
        monitor.perform_health_checks().await;
        assert!(monitor.snapshot().healthy);
    }

    #[tokio::test]
    async fn tts_failure_is_recorded_and_reported() {
        let monitor = monitor(PingOutcome::Timeout, true, vec![]);
        monitor.perform_health_checks().await;
        let status = monitor.snapshot();
        assert!(!status.healthy);
        assert!(status.issues.iter().any(|i| i.contains("TTS engine unreachable")));
    }

    #[tokio::test]
    async fn disconnected_voice_is_reported_unhealthy() {
        let monitor = monitor(PingOutcome::Ok, false, vec![]);
        monitor.perform_health_checks().await;
        assert!(!monitor.snapshot().healthy);
    }

    #[tokio::test]
    async fn missing_critical_permission_triggers_termination() {
        let monitor = monitor(PingOutcome::Ok, true, vec!["speak".to_string()]);
        monitor.check_critical_permissions().await;
        assert_eq!(
            monitor.termination_receiver().borrow().clone(),
            Some("missing critical permissions: speak".to_string())
        );
    }

    #[tokio::test]
    async fn termination_is_idempotent() {
        let monitor = monitor(PingOutcome::Ok, true, vec!["speak".to_string()]);
        monitor.check_critical_permissions().await;
        monitor.check_critical_permissions().await;
        let rx = monitor.termination_receiver();
        assert!(rx.has_changed().unwrap() || rx.borrow().is_some());
    }

    #[tokio::test]
    async fn disconnection_storm_triggers_termination() {
        let monitor = monitor(PingOutcome::Ok, true, vec![]);
        for _ in 0..5 {
            monitor.record_disconnection();
        }
        assert!(monitor.termination_receiver().borrow().is_some());
    }
}
