//! Synthesis worker: pulls [`SynthesisJob`]s, calls the TTS engine, validates
//! and enqueues the resulting [`AudioArtifact`].
//!
//! Grounded on `voice/workers/synthesizer.py`'s `SynthesizerWorker.run`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use voice_relay_core::model::AudioArtifact;
use voice_relay_core::Tts;
use voice_relay_speaker::SpeakerRouter;

use crate::queue::{AudioQueue, SynthesisQueue};
use crate::stats::PipelineStats;
use crate::wav;

pub struct SynthesizerConfig {
    pub engine_base_url: String,
    pub default_speaker_id: i64,
    pub default_engine_tag: String,
    pub max_buffer_bytes: usize,
    pub max_artifact_bytes: usize,
}

pub struct SynthesizerWorker {
    synthesis_queue: Arc<SynthesisQueue>,
    audio_queue: Arc<AudioQueue>,
    tts: Arc<dyn Tts>,
    speaker_router: Arc<SpeakerRouter>,
    stats: Arc<PipelineStats>,
    buffered_bytes: Arc<AtomicUsize>,
    config: SynthesizerConfig,
}

impl SynthesizerWorker {
    pub fn new(
        synthesis_queue: Arc<SynthesisQueue>,
        audio_queue: Arc<AudioQueue>,
        tts: Arc<dyn Tts>,
        speaker_router: Arc<SpeakerRouter>,
        stats: Arc<PipelineStats>,
        buffered_bytes: Arc<AtomicUsize>,
        config: SynthesizerConfig,
    ) -> Self {
        Self { synthesis_queue, audio_queue, tts, speaker_router, stats, buffered_bytes, config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let job = tokio::select! {
                job = self.synthesis_queue.get() => job,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("synthesizer worker shutting down");
                        break;
                    }
                    continue;
                }
            };

            if self.buffered_bytes.load(Ordering::Acquire) >= self.config.max_buffer_bytes {
                warn!("audio buffer size limit reached, dropping synthesis request");
                self.stats.increment_messages_skipped();
                continue;
            }

            let speaker_id = self
                .speaker_router
                .resolve_speaker(&job.author_id, &self.config.default_engine_tag)
                .await
                .unwrap_or(self.config.default_speaker_id);

            let Some(audio) =
                self.tts.synthesize_text(&job.text, speaker_id, &self.config.engine_base_url).await
            else {
                error!(text = %job.text.chars().take(50).collect::<String>(), "failed to synthesize");
                self.stats.increment_errors();
                continue;
            };

            if !wav::validate_wav_format(&audio) {
                error!(text = %job.text.chars().take(50).collect::<String>(), "invalid audio format returned by engine");
                self.stats.increment_errors();
                continue;
            }

            let size_bytes = audio.len();
            if size_bytes > self.config.max_artifact_bytes {
                warn!(size_bytes, "audio file too large, skipping");
                self.stats.increment_messages_skipped();
                continue;
            }

            self.buffered_bytes.fetch_add(size_bytes, Ordering::AcqRel);

            let priority = wav::calculate_priority(&job.text);
            let artifact = AudioArtifact {
                bytes: audio,
                group_id: job.group_id.clone(),
                chunk_index: job.chunk_index,
                priority,
                size_bytes,
                enqueue_sequence: self.audio_queue.next_sequence(),
            };

            if let Err(artifact) = self.audio_queue.try_put(artifact) {
                self.buffered_bytes.fetch_sub(artifact.size_bytes, Ordering::AcqRel);
                warn!(group_id = %job.group_id, "audio queue full, dropping synthesized chunk");
                self.stats.increment_messages_skipped();
                continue;
            }

            debug!(
                chunk_index = job.chunk_index + 1,
                chunk_count = job.chunk_count,
                size_bytes,
                "synthesized chunk"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use voice_relay_core::model::SynthesisJob;
    use voice_relay_core::traits::PingOutcome;
    use voice_relay_speaker::store::JsonPreferenceStore;

    struct FixedTts(Option<Vec<u8>>);

    #[async_trait]
    impl Tts for FixedTts {
        async fn ping(&self, _engine_base_url: &str) -> PingOutcome {
            PingOutcome::Ok
        }
        async fn synthesize_text(&self, _text: &str, _speaker_id: i64, _engine_base_url: &str) -> Option<Vec<u8>> {
            self.0.clone()
        }
    }

    fn config() -> SynthesizerConfig {
        SynthesizerConfig {
            engine_base_url: "http://localhost:50021".into(),
            default_speaker_id: 3,
            default_engine_tag: "voicevox".into(),
            max_buffer_bytes: 50 * 1024 * 1024,
            max_artifact_bytes: 10 * 1024 * 1024,
        }
    }

    fn valid_wav() -> Vec<u8> {
        let mut buf = vec![0u8; 44];
        buf[0..4].copy_from_slice(b"RIFF");
        buf[8..12].copy_from_slice(b"WAVE");
        buf[22..24].copy_from_slice(&1u16.to_le_bytes());
        buf[24..28].copy_from_slice(&48000u32.to_le_bytes());
        buf[34..36].copy_from_slice(&16u16.to_le_bytes());
        buf
    }

    fn job() -> SynthesisJob {
        SynthesisJob {
            text: "hello".into(),
            author_id: "1".into(),
            author_display_name: "user".into(),
            group_id: "g1".into(),
            chunk_index: 0,
            chunk_count: 1,
            content_hash: 0,
        }
    }

    async fn router(dir: &std::path::Path) -> Arc<SpeakerRouter> {
        let store = JsonPreferenceStore::new(Some(dir.join("prefs.json"))).unwrap();
        Arc::new(SpeakerRouter::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn valid_audio_is_enqueued_and_buffer_accounted() {
        let dir = tempfile::tempdir().unwrap();
        let synthesis_queue = Arc::new(SynthesisQueue::new(10));
        let audio_queue = Arc::new(AudioQueue::new(10));
        let buffered = Arc::new(AtomicUsize::new(0));
        let worker = SynthesizerWorker::new(
            synthesis_queue.clone(),
            audio_queue.clone(),
            Arc::new(FixedTts(Some(valid_wav()))),
            router(dir.path()).await,
            Arc::new(PipelineStats::default()),
            buffered.clone(),
            config(),
        );

        synthesis_queue.try_put(job()).unwrap();
        let (_tx, rx) = watch::channel(false);
        let run = worker.run(rx);
        let _ = tokio::time::timeout(std::time::Duration::from_millis(200), run).await;

        assert_eq!(audio_queue.len(), 1);
        assert!(buffered.load(Ordering::Acquire) > 0);
    }

    #[tokio::test]
    async fn malformed_audio_is_dropped_and_counted_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let synthesis_queue = Arc::new(SynthesisQueue::new(10));
        let audio_queue = Arc::new(AudioQueue::new(10));
        let stats = Arc::new(PipelineStats::default());
        let worker = SynthesizerWorker::new(
            synthesis_queue.clone(),
            audio_queue.clone(),
            Arc::new(FixedTts(Some(vec![0; 10]))),
            router(dir.path()).await,
            stats.clone(),
            Arc::new(AtomicUsize::new(0)),
            config(),
        );

        synthesis_queue.try_put(job()).unwrap();
        let (_tx, rx) = watch::channel(false);
        let run = worker.run(rx);
        let _ = tokio::time::timeout(std::time::Duration::from_millis(200), run).await;

        assert_eq!(audio_queue.len(), 0);
        assert_eq!(stats.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn buffer_cap_skips_without_calling_engine() {
        let dir = tempfile::tempdir().unwrap();
        let synthesis_queue = Arc::new(SynthesisQueue::new(10));
        let audio_queue = Arc::new(AudioQueue::new(10));
        let stats = Arc::new(PipelineStats::default());
        let mut cfg = config();
        cfg.max_buffer_bytes = 1;
        let worker = SynthesizerWorker::new(
            synthesis_queue.clone(),
            audio_queue.clone(),
            Arc::new(FixedTts(Some(valid_wav()))),
            router(dir.path()).await,
            stats.clone(),
            Arc::new(AtomicUsize::new(2)),
            cfg,
        );

        synthesis_queue.try_put(job()).unwrap();
        let (_tx, rx) = watch::channel(false);
        let run = worker.run(rx);
        let _ = tokio::time::timeout(std::time::Duration::from_millis(200), run).await;

        assert_eq!(audio_queue.len(), 0);
        assert_eq!(stats.snapshot().messages_skipped, 1);
    }
}
