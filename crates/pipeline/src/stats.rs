//! Pipeline-wide counters, mirroring the original bot's `StatsTracker`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    messages_played: AtomicU64,
    messages_skipped: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_played: u64,
    pub messages_skipped: u64,
    pub errors: u64,
}

impl PipelineStats {
    pub fn increment_messages_played(&self) {
        self.messages_played.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_messages_played_total").increment(1);
    }

    pub fn increment_messages_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_messages_skipped_total").increment(1);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("relay_pipeline_errors_total").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_played: self.messages_played.load(Ordering::Relaxed),
            messages_skipped: self.messages_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
