//! Playback worker: pops [`AudioArtifact`]s in priority order and drives
//! them through a [`Transport`].
//!
//! Grounded on `voice/workers/player.py`'s `PlayerWorker.run` — the
//! not-connected skip, the wait-for-not-playing budget, the five-minute
//! playback ceiling and the consecutive-error halt are all carried over.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use voice_relay_core::Transport;

use crate::queue::AudioQueue;
use crate::stats::PipelineStats;

const POP_TIMEOUT: Duration = Duration::from_secs(1);
const WAIT_FOR_IDLE_BUDGET: Duration = Duration::from_secs(3);
const WAIT_FOR_IDLE_POLL: Duration = Duration::from_millis(100);
const PLAYBACK_CEILING: Duration = Duration::from_secs(300);
const PLAYBACK_POLL: Duration = Duration::from_millis(100);
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

pub struct PlaybackWorker {
    audio_queue: Arc<AudioQueue>,
    transport: Arc<dyn Transport>,
    stats: Arc<PipelineStats>,
    buffered_bytes: Arc<AtomicUsize>,
    current_group_id: Arc<Mutex<Option<String>>>,
}

impl PlaybackWorker {
    pub fn new(
        audio_queue: Arc<AudioQueue>,
        transport: Arc<dyn Transport>,
        stats: Arc<PipelineStats>,
        buffered_bytes: Arc<AtomicUsize>,
        current_group_id: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self { audio_queue, transport, stats, buffered_bytes, current_group_id }
    }

    pub fn current_group_id(&self) -> Option<String> {
        self.current_group_id.lock().clone()
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                debug!("playback worker shutting down");
                break;
            }

            let artifact = tokio::select! {
                artifact = self.audio_queue.pop_timeout(POP_TIMEOUT) => artifact,
                _ = shutdown.changed() => continue,
            };

            let Some(artifact) = artifact else {
                continue;
            };

            let health = self.transport.health().await;
            if !health.voice_client_connected {
                debug!(group_id = %artifact.group_id, "skipping playback, transport not connected");
                self.buffered_bytes.fetch_sub(artifact.size_bytes, Ordering::AcqRel);
                continue;
            }

            let mut waited = Duration::ZERO;
            while self.transport.is_playing().await && waited < WAIT_FOR_IDLE_BUDGET {
                tokio::time::sleep(WAIT_FOR_IDLE_POLL).await;
                waited += WAIT_FOR_IDLE_POLL;
            }
            if waited >= WAIT_FOR_IDLE_BUDGET {
                warn!(group_id = %artifact.group_id, "wait timeout for playback, stopping current playback");
                let _ = self.transport.stop().await;
            }

            *self.current_group_id.lock() = Some(artifact.group_id.clone());
            let size_bytes = artifact.size_bytes;
            let group_id = artifact.group_id.clone();
            let priority = artifact.priority;

            let outcome = self.play_to_completion(artifact).await;
            *self.current_group_id.lock() = None;
            self.buffered_bytes.fetch_sub(size_bytes, Ordering::AcqRel);

            match outcome {
                Ok(()) => {
                    self.stats.increment_messages_played();
                    debug!(group_id = %group_id, priority, "played audio");
                    consecutive_errors = 0;
                }
                Err(_) => {
                    self.stats.increment_errors();
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!(consecutive_errors, "too many consecutive playback errors, stopping worker");
                        break;
                    }
                }
            }
        }
    }

    async fn play_to_completion(&self, artifact: voice_relay_core::model::AudioArtifact) -> Result<(), ()> {
        if let Err(err) = self.transport.play(artifact.bytes).await {
            error!(error = %err, "playback error");
            return Err(());
        }

        let mut elapsed = Duration::ZERO;
        while self.transport.is_playing().await {
            if elapsed >= PLAYBACK_CEILING {
                warn!("audio playback timeout, stopping transport");
                let _ = self.transport.stop().await;
                return Err(());
            }
            tokio::time::sleep(PLAYBACK_POLL).await;
            elapsed += PLAYBACK_POLL;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as PLMutex;
    use voice_relay_core::traits::TransportHealth;
    use voice_relay_core::Result as CoreResult;

    struct FakeTransport {
        connected: bool,
        playing: PLMutex<bool>,
        play_calls: PLMutex<u32>,
        fail_play: bool,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self, _channel_id: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn move_to(&self, _channel_id: &str) -> CoreResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn unsuppress(&self) -> CoreResult<()> {
            Ok(())
        }
        async fn play(&self, _pcm_or_wav: Vec<u8>) -> CoreResult<()> {
            *self.play_calls.lock() += 1;
            if self.fail_play {
                return Err(voice_relay_core::Error::TransientTransport("boom".into()));
            }
            *self.playing.lock() = true;
            Ok(())
        }
        async fn is_playing(&self) -> bool {
            let mut playing = self.playing.lock();
            if *playing {
                *playing = false;
                return true;
            }
            false
        }
        async fn stop(&self) -> CoreResult<()> {
            *self.playing.lock() = false;
            Ok(())
        }
        async fn health(&self) -> TransportHealth {
            TransportHealth { voice_client_connected: self.connected, ..Default::default() }
        }
    }

    fn artifact(group: &str, size: usize) -> voice_relay_core::model::AudioArtifact {
        voice_relay_core::model::AudioArtifact {
            bytes: vec![0; size],
            group_id: group.into(),
            chunk_index: 0,
            priority: 5,
            size_bytes: size,
            enqueue_sequence: 0,
        }
    }

    #[tokio::test]
    async fn disconnected_transport_drops_artifact_and_frees_buffer() {
        let queue = Arc::new(AudioQueue::new(10));
        queue.try_put(artifact("g", 100)).unwrap();
        let buffered = Arc::new(AtomicUsize::new(100));
        let transport =
            Arc::new(FakeTransport { connected: false, playing: PLMutex::new(false), play_calls: PLMutex::new(0), fail_play: false });
        let worker = PlaybackWorker::new(queue.clone(), transport.clone(), Arc::new(PipelineStats::default()), buffered.clone(), Arc::new(Mutex::new(None)));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert_eq!(*transport.play_calls.lock(), 0);
        assert_eq!(buffered.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn successful_playback_increments_stats_and_frees_buffer() {
        let queue = Arc::new(AudioQueue::new(10));
        queue.try_put(artifact("g", 100)).unwrap();
        let buffered = Arc::new(AtomicUsize::new(100));
        let stats = Arc::new(PipelineStats::default());
        let transport =
            Arc::new(FakeTransport { connected: true, playing: PLMutex::new(false), play_calls: PLMutex::new(0), fail_play: false });
        let worker = PlaybackWorker::new(queue.clone(), transport.clone(), stats.clone(), buffered.clone(), Arc::new(Mutex::new(None)));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert_eq!(*transport.play_calls.lock(), 1);
        assert_eq!(stats.snapshot().messages_played, 1);
        assert_eq!(buffered.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn play_failure_is_counted_as_error() {
        let queue = Arc::new(AudioQueue::new(10));
        queue.try_put(artifact("g", 100)).unwrap();
        let buffered = Arc::new(AtomicUsize::new(100));
        let stats = Arc::new(PipelineStats::default());
        let transport =
            Arc::new(FakeTransport { connected: true, playing: PLMutex::new(false), play_calls: PLMutex::new(0), fail_play: true });
        let worker = PlaybackWorker::new(queue.clone(), transport.clone(), stats.clone(), buffered.clone(), Arc::new(Mutex::new(None)));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert_eq!(stats.snapshot().errors, 1);
    }
}
