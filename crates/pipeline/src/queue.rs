//! Bounded FIFO synthesis queue and bounded priority playback queue.
//!
//! Grounded on `voice/queues.py`'s `SynthesisQueue` (an `asyncio.Queue`
//! wrapper) and `PriorityAudioQueue` (a `heapq`-backed min-heap keyed by
//! `(priority, counter)`), reshaped onto `tokio::sync::Notify` so `get()`
//! can be raced against a shutdown signal or a timeout.

use std::collections::{BinaryHeap, VecDeque};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use voice_relay_core::model::{AudioArtifact, SynthesisJob};

/// Bounded FIFO of [`SynthesisJob`]s. Producers never block: [`Self::try_put`]
/// and [`Self::try_put_batch`] return the rejected items on overflow instead.
pub struct SynthesisQueue {
    capacity: usize,
    inner: Mutex<VecDeque<SynthesisJob>>,
    notify: Notify,
}

impl SynthesisQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new() }
    }

    pub fn try_put(&self, job: SynthesisJob) -> Result<(), SynthesisJob> {
        let mut q = self.inner.lock();
        if q.len() >= self.capacity {
            return Err(job);
        }
        q.push_back(job);
        drop(q);
        self.notify.notify_one();
        Ok(())
    }

    /// Enqueues every job or none: an admitted message's chunks are
    /// contiguous in the queue, never interleaved with a concurrent
    /// admission, and a message that doesn't fully fit is dropped whole
    /// rather than partially enqueued.
    pub fn try_put_batch(&self, jobs: Vec<SynthesisJob>) -> Result<(), Vec<SynthesisJob>> {
        let mut q = self.inner.lock();
        if q.len() + jobs.len() > self.capacity {
            return Err(jobs);
        }
        q.extend(jobs);
        drop(q);
        self.notify.notify_waiters();
        Ok(())
    }

    pub async fn get(&self) -> SynthesisJob {
        loop {
            if let Some(job) = self.inner.lock().pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every job belonging to `group_id`, returning the count removed.
    pub fn remove_group(&self, group_id: &str) -> usize {
        let mut q = self.inner.lock();
        let before = q.len();
        q.retain(|job| job.group_id != group_id);
        before - q.len()
    }

    /// Drains the queue entirely, returning the count removed.
    pub fn clear(&self) -> usize {
        let mut q = self.inner.lock();
        let count = q.len();
        q.clear();
        count
    }
}

struct HeapEntry(AudioArtifact);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.ordering_key() == other.0.ordering_key()
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest (priority, sequence)
        // pair — the highest-priority, earliest-enqueued item — pops first.
        other.0.ordering_key().cmp(&self.0.ordering_key())
    }
}

/// Bounded priority queue of [`AudioArtifact`]s, ordered by
/// `(priority ascending, enqueue_sequence ascending)`.
pub struct AudioQueue {
    capacity: usize,
    inner: Mutex<BinaryHeap<HeapEntry>>,
    notify: Notify,
    sequence: AtomicU64,
}

impl AudioQueue {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(BinaryHeap::new()), notify: Notify::new(), sequence: AtomicU64::new(0) }
    }

    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, AtomicOrdering::SeqCst)
    }

    pub fn try_put(&self, artifact: AudioArtifact) -> Result<(), AudioArtifact> {
        let mut q = self.inner.lock();
        if q.len() >= self.capacity {
            return Err(artifact);
        }
        q.push(HeapEntry(artifact));
        drop(q);
        self.notify.notify_one();
        Ok(())
    }

    /// Pops the highest-priority artifact, waiting up to `timeout` so a
    /// shutdown signal can be checked promptly when the queue is empty.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<AudioArtifact> {
        if let Some(entry) = self.inner.lock().pop() {
            return Some(entry.0);
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        self.inner.lock().pop().map(|e| e.0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every artifact belonging to `group_id`, returning them so the
    /// caller can dispose of each and account for its bytes.
    pub fn remove_group(&self, group_id: &str) -> Vec<AudioArtifact> {
        let mut q = self.inner.lock();
        let (keep, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *q).into_vec().into_iter().partition(|e| e.0.group_id != group_id);
        *q = keep.into_iter().collect();
        removed.into_iter().map(|e| e.0).collect()
    }

    pub fn clear(&self) -> Vec<AudioArtifact> {
        let mut q = self.inner.lock();
        std::mem::take(&mut *q).into_vec().into_iter().map(|e| e.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(group: &str, idx: usize) -> SynthesisJob {
        SynthesisJob {
            text: "hi".into(),
            author_id: "1".into(),
            author_display_name: "user".into(),
            group_id: group.into(),
            chunk_index: idx,
            chunk_count: 1,
            content_hash: 0,
        }
    }

    fn artifact(group: &str, priority: i32, seq: u64) -> AudioArtifact {
        AudioArtifact { bytes: vec![0; 10], group_id: group.into(), chunk_index: 0, priority, size_bytes: 10, enqueue_sequence: seq }
    }

    #[test]
    fn synthesis_queue_rejects_over_capacity() {
        let q = SynthesisQueue::new(1);
        assert!(q.try_put(job("g", 0)).is_ok());
        assert!(q.try_put(job("g", 1)).is_err());
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let q = SynthesisQueue::new(2);
        let batch = vec![job("g", 0), job("g", 1), job("g", 2)];
        assert!(q.try_put_batch(batch).is_err());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn remove_group_only_removes_matching_jobs() {
        let q = SynthesisQueue::new(10);
        q.try_put(job("a", 0)).unwrap();
        q.try_put(job("b", 0)).unwrap();
        assert_eq!(q.remove_group("a"), 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn audio_queue_orders_by_priority_then_sequence() {
        let q = AudioQueue::new(10);
        q.try_put(artifact("b", 5, 1)).unwrap();
        q.try_put(artifact("a", 1, 0)).unwrap();
        q.try_put(artifact("c", 5, 0)).unwrap();

        let first = q.inner.lock().pop().unwrap().0;
        assert_eq!(first.group_id, "a");
    }

    #[test]
    fn audio_queue_remove_group_returns_matching_artifacts() {
        let q = AudioQueue::new(10);
        q.try_put(artifact("a", 5, 0)).unwrap();
        q.try_put(artifact("a", 5, 1)).unwrap();
        q.try_put(artifact("b", 5, 2)).unwrap();
        let removed = q.remove_group("a");
        assert_eq!(removed.len(), 2);
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn pop_timeout_returns_none_when_empty() {
        let q: AudioQueue = AudioQueue::new(10);
        let result = q.pop_timeout(Duration::from_millis(10)).await;
        assert!(result.is_none());
    }
}
