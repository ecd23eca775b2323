//! Two-stage synthesis/playback pipeline.
//!
//! [`Pipeline`] owns the two bounded queues and the shared buffered-bytes
//! counter; [`synthesizer::SynthesizerWorker`] and
//! [`player::PlaybackWorker`] are the two cooperating loops that drain them.
//! Buffered-byte accounting belongs here rather than to either worker: the
//! synthesizer increments it on admission to the audio queue, the playback
//! worker decrements it on every exit path (played, skipped, or dropped),
//! and [`Pipeline::skip_group`]/[`Pipeline::clear_all`] must also account
//! for bytes they evict directly from the audio queue.

pub mod player;
pub mod queue;
pub mod stats;
pub mod synthesizer;
pub mod wav;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use voice_relay_core::model::AdmittedMessage;
use voice_relay_core::{Transport, Tts};
use voice_relay_speaker::SpeakerRouter;

use queue::{AudioQueue, SynthesisQueue};
use stats::PipelineStats;
use synthesizer::{SynthesizerConfig, SynthesizerWorker};

pub struct PipelineConfig {
    pub synthesis_queue_capacity: usize,
    pub audio_queue_capacity: usize,
    pub max_buffer_bytes: usize,
    pub max_artifact_bytes: usize,
    pub engine_base_url: String,
    pub default_speaker_id: i64,
    pub default_engine_tag: String,
}

pub struct Pipeline {
    synthesis_queue: Arc<SynthesisQueue>,
    audio_queue: Arc<AudioQueue>,
    buffered_bytes: Arc<AtomicUsize>,
    stats: Arc<PipelineStats>,
    /// Group id the playback worker is currently playing, if any. Shared
    /// with [`player::PlaybackWorker`] so `skip_group`/`clear_all` can tell
    /// whether they need to interrupt in-flight playback.
    current_group_id: Arc<Mutex<Option<String>>>,
    /// Set by [`Pipeline::spawn_playback`]; used to stop the transport when
    /// skip/clear targets the group currently playing.
    transport: Mutex<Option<Arc<dyn Transport>>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            synthesis_queue: Arc::new(SynthesisQueue::new(config.synthesis_queue_capacity)),
            audio_queue: Arc::new(AudioQueue::new(config.audio_queue_capacity)),
            buffered_bytes: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(PipelineStats::default()),
            current_group_id: Arc::new(Mutex::new(None)),
            transport: Mutex::new(None),
            config,
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Acquire)
    }

    /// Splits an admitted message into one job per chunk and enqueues all of
    /// them, or none, per the synthesis queue's all-or-nothing batch policy.
    /// Returns `false` if the batch didn't fit.
    pub fn enqueue_message(&self, message: &AdmittedMessage) -> bool {
        let chunk_count = message.chunks.len();
        let jobs = message
            .chunks
            .iter()
            .enumerate()
            .map(|(chunk_index, text)| voice_relay_core::model::SynthesisJob {
                text: text.clone(),
                author_id: message.author_id.clone(),
                author_display_name: message.author_display_name.clone(),
                group_id: message.group_id.clone(),
                chunk_index,
                chunk_count,
                content_hash: message.content_hash,
            })
            .collect();

        self.synthesis_queue.try_put_batch(jobs).is_ok()
    }

    /// Removes every pending job and artifact for `group_id` from both
    /// queues, freeing the buffered-byte accounting for any evicted
    /// artifacts, and stops the transport if it is currently playing that
    /// group. `group_id` defaults to the currently-playing group when
    /// `None`. Used by the skip command.
    pub async fn skip_group(&self, group_id: Option<&str>) -> usize {
        let Some(target) = group_id.map(str::to_string).or_else(|| self.current_group_id.lock().clone()) else {
            return 0;
        };

        let jobs_removed = self.synthesis_queue.remove_group(&target);
        let artifacts_removed = self.audio_queue.remove_group(&target);
        let freed: usize = artifacts_removed.iter().map(|a| a.size_bytes).sum();
        self.buffered_bytes.fetch_sub(freed, Ordering::AcqRel);

        if self.current_group_id.lock().as_deref() == Some(target.as_str()) {
            self.stop_transport().await;
        }

        info!(group_id = %target, jobs_removed, artifacts_removed = artifacts_removed.len(), "skipped group");
        jobs_removed + artifacts_removed.len()
    }

    /// Drains both queues entirely, freeing all buffered-byte accounting,
    /// and stops any active playback.
    pub async fn clear_all(&self) -> usize {
        let jobs_removed = self.synthesis_queue.clear();
        let artifacts_removed = self.audio_queue.clear();
        let freed: usize = artifacts_removed.iter().map(|a| a.size_bytes).sum();
        self.buffered_bytes.fetch_sub(freed, Ordering::AcqRel);

        if self.current_group_id.lock().is_some() {
            self.stop_transport().await;
        }

        info!(jobs_removed, artifacts_removed = artifacts_removed.len(), "cleared all queues");
        jobs_removed + artifacts_removed.len()
    }

    async fn stop_transport(&self) {
        let transport = self.transport.lock().clone();
        if let Some(transport) = transport {
            if let Err(e) = transport.stop().await {
                tracing::warn!(error = %e, "failed to stop transport for skip/clear");
            }
        }
    }

    pub fn synthesis_queue_len(&self) -> usize {
        self.synthesis_queue.len()
    }

    pub fn audio_queue_len(&self) -> usize {
        self.audio_queue.len()
    }

    /// Spawns the synthesis worker loop, returning its handle and a shutdown
    /// sender the caller should signal (`true`) on teardown.
    pub fn spawn_synthesizer(
        &self,
        tts: Arc<dyn Tts>,
        speaker_router: Arc<SpeakerRouter>,
    ) -> (JoinHandle<()>, watch::Sender<bool>) {
        let worker = SynthesizerWorker::new(
            self.synthesis_queue.clone(),
            self.audio_queue.clone(),
            tts,
            speaker_router,
            self.stats.clone(),
            self.buffered_bytes.clone(),
            SynthesizerConfig {
                engine_base_url: self.config.engine_base_url.clone(),
                default_speaker_id: self.config.default_speaker_id,
                default_engine_tag: self.config.default_engine_tag.clone(),
                max_buffer_bytes: self.config.max_buffer_bytes,
                max_artifact_bytes: self.config.max_artifact_bytes,
            },
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        (handle, tx)
    }

    /// Spawns the playback worker loop, returning its handle and a shutdown
    /// sender the caller should signal (`true`) on teardown.
    pub fn spawn_playback(&self, transport: Arc<dyn Transport>) -> (JoinHandle<()>, watch::Sender<bool>) {
        *self.transport.lock() = Some(transport.clone());
        let worker = player::PlaybackWorker::new(
            self.audio_queue.clone(),
            transport,
            self.stats.clone(),
            self.buffered_bytes.clone(),
            self.current_group_id.clone(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        (handle, tx)
    }
}
