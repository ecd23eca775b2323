//! Orchestrator (C8): wires C1–C7, dispatches platform events, owns the
//! status snapshot. Grounded on `voice-agent-server`'s `main.rs` startup
//! sequencing (load config, init tracing/metrics, build state, serve,
//! graceful shutdown) and on `spec.md` §4.8's explicit step order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use voice_relay_admission::{Admission, AdmissionConfig};
use voice_relay_config::Settings;
use voice_relay_core::traits::PlatformEvent;
use voice_relay_core::{Clock, EventSource, PermissionChecker, PreferenceStore, Result, Transport, Tts};
use voice_relay_health::{HealthMonitor, HealthMonitorConfig, HealthStatus};
use voice_relay_pipeline::{Pipeline, PipelineConfig};
use voice_relay_speaker::SpeakerRouter;
use voice_relay_transport::{SessionConfig, VoiceSessionController};

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub voice_state: String,
    pub current_channel_id: Option<String>,
    pub synthesis_queue_len: usize,
    pub audio_queue_len: usize,
    pub buffered_bytes: usize,
    pub messages_played: u64,
    pub messages_skipped: u64,
    pub errors: u64,
    pub uptime_secs: u64,
    pub health: HealthStatus,
}

pub struct Orchestrator {
    config: Settings,
    clock: Arc<dyn Clock>,
    started_at: Duration,
    event_source: Arc<dyn EventSource>,
    admission: Admission,
    pipeline: Arc<Pipeline>,
    voice: Arc<VoiceSessionController>,
    health: Arc<HealthMonitor>,
    tts: Arc<dyn Tts>,
    speaker_router: Arc<SpeakerRouter>,
    transport: Arc<dyn Transport>,
    worker_shutdowns: parking_lot::Mutex<Vec<watch::Sender<bool>>>,
    worker_handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Settings,
        clock: Arc<dyn Clock>,
        event_source: Arc<dyn EventSource>,
        transport: Arc<dyn Transport>,
        tts: Arc<dyn Tts>,
        preferences: Arc<dyn PreferenceStore>,
        permission_checker: Arc<dyn PermissionChecker>,
    ) -> Self {
        let speaker_router = Arc::new(SpeakerRouter::new(preferences));

        let admission = Admission::new(AdmissionConfig {
            target_channel_id: config.target_text_channel_id.clone().unwrap_or_else(|| config.target_voice_channel_id.clone()),
            own_author_id: String::new(),
            enable_self_message_processing: config.enable_self_message_processing,
            command_prefixes: config.pipeline.command_prefixes.clone(),
            rate_limit_messages: config.rate_limit.messages as usize,
            rate_limit_period: Duration::from_secs(config.rate_limit.period_s),
            max_chars: config.pipeline.admission_max_chars,
            chunk_limit: config.pipeline.chunk_limit,
            dedup_window: config.pipeline.dedup_window,
        });

        let engine_base_url = config
            .engine_urls
            .get(&config.tts_engine)
            .cloned()
            .unwrap_or_else(|| "http://localhost:50021".to_string());

        let pipeline = Arc::new(Pipeline::new(PipelineConfig {
            synthesis_queue_capacity: config.pipeline.synthesis_queue_capacity,
            audio_queue_capacity: config.pipeline.audio_queue_capacity,
            max_buffer_bytes: config.pipeline.audio_buffer_cap_bytes,
            max_artifact_bytes: config.pipeline.per_artifact_cap_bytes,
            engine_base_url: engine_base_url.clone(),
            default_speaker_id: voice_relay_speaker::mapping::default_speaker(&config.tts_engine),
            default_engine_tag: config.tts_engine.clone(),
        }));

        let voice = Arc::new(VoiceSessionController::new(
            transport.clone(),
            clock.clone(),
            SessionConfig {
                reconnection_cooldown_s: config.voice.reconnection_cooldown_s,
                settle_delay_ms: config.voice.settle_delay_ms,
            },
            config.target_voice_channel_id.clone(),
        ));

        let health = Arc::new(HealthMonitor::new(
            clock.clone(),
            tts.clone(),
            engine_base_url,
            voice.clone(),
            permission_checker,
            HealthMonitorConfig::default(),
        ));

        let started_at = clock.now();
        Self {
            config,
            clock,
            started_at,
            event_source,
            admission,
            pipeline,
            voice,
            health,
            tts,
            speaker_router,
            transport,
            worker_shutdowns: parking_lot::Mutex::new(Vec::new()),
            worker_handles: parking_lot::Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            voice_state: format!("{:?}", self.voice.state()),
            current_channel_id: self.voice.current_channel_id(),
            synthesis_queue_len: self.pipeline.synthesis_queue_len(),
            audio_queue_len: self.pipeline.audio_queue_len(),
            buffered_bytes: self.pipeline.buffered_bytes(),
            messages_played: self.pipeline.stats().snapshot().messages_played,
            messages_skipped: self.pipeline.stats().snapshot().messages_skipped,
            errors: self.pipeline.stats().snapshot().errors,
            uptime_secs: self.clock.now().saturating_sub(self.started_at).as_secs(),
            health: self.health.snapshot(),
        }
    }

    /// Runs startup (connect, spawn workers) then the event dispatch loop
    /// until shutdown is triggered by a fatal error, a health-monitor
    /// termination, or the event source closing.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.startup().await?;

        let mut termination_reason = None;
        let mut termination_rx = self.health.termination_receiver();
        loop {
            tokio::select! {
                event = self.event_source.recv() => {
                    match event {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            info!("event source closed, shutting down");
                            break;
                        }
                    }
                }
                _ = termination_rx.changed() => {
                    if let Some(reason) = termination_rx.borrow().clone() {
                        warn!(reason = %reason, "health monitor requested termination");
                        termination_reason = Some(reason);
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        match termination_reason {
            Some(reason) => Err(voice_relay_core::Error::Fatal(reason)),
            None => Ok(()),
        }
    }

    async fn startup(self: &Arc<Self>) -> Result<()> {
        self.voice
            .connect_with_retry(
                &self.config.target_voice_channel_id,
                self.config.voice.startup_attempts,
                Duration::from_secs(self.config.voice.startup_attempt_spacing_s),
            )
            .await?;

        let (handle, tx) = self.pipeline.spawn_synthesizer(self.tts.clone(), self.speaker_router.clone());
        self.worker_handles.lock().push(handle);
        self.worker_shutdowns.lock().push(tx);

        let (handle, tx) = self.pipeline.spawn_playback(self.transport.clone());
        self.worker_handles.lock().push(handle);
        self.worker_shutdowns.lock().push(tx);

        let health = self.health.clone();
        let (health_tx, health_rx) = watch::channel(false);
        self.worker_shutdowns.lock().push(health_tx);
        self.worker_handles.lock().push(tokio::spawn(async move { health.run_health_loop(health_rx).await }));

        let health = self.health.clone();
        let (perm_tx, perm_rx) = watch::channel(false);
        self.worker_shutdowns.lock().push(perm_tx);
        self.worker_handles.lock().push(tokio::spawn(async move { health.run_permission_loop(perm_rx).await }));

        info!(channel = %self.config.target_voice_channel_id, "orchestrator startup complete");
        Ok(())
    }

    async fn dispatch(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Ready => {
                info!("ready event received");
            }
            PlatformEvent::Message(text_event) => {
                let now = self.clock.now();
                match self.admission.admit(&text_event, now) {
                    Ok(message) => {
                        if !self.pipeline.enqueue_message(&message) {
                            warn!(group_id = %message.group_id, "synthesis queue rejected batch, dropping message");
                        }
                    }
                    Err(reason) => {
                        tracing::debug!(?reason, "message not admitted");
                    }
                }
            }
            PlatformEvent::VoiceStateUpdate { member_id: _, before_channel, after_channel, suppressed: _ } => {
                let target = &self.config.target_voice_channel_id;
                if before_channel.as_deref() == Some(target.as_str()) && after_channel.is_none() {
                    self.health.record_disconnection();
                    self.voice.handle_external_disconnect(target).await;
                }
            }
            PlatformEvent::VoiceServerUpdate { endpoint, .. } => {
                let normalized = VoiceSessionController::normalize_endpoint(&endpoint);
                tracing::debug!(endpoint = %normalized, "voice server update");
            }
            PlatformEvent::Disconnect => {
                warn!("gateway disconnect observed");
            }
            PlatformEvent::Resume => {
                info!("gateway resumed");
            }
            PlatformEvent::Error(message) => {
                error!(%message, "gateway error");
            }
        }
    }

    async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down orchestrator");
        for tx in self.worker_shutdowns.lock().drain(..) {
            let _ = tx.send(true);
        }
        let handles: Vec<_> = self.worker_handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked during shutdown");
            }
        }
        if let Err(e) = self.voice.disconnect().await {
            warn!(error = %e, "voice disconnect during shutdown failed");
        }
        info!("shutdown complete");
    }
}
