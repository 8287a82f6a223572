use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters for the prefetch controller.
///
/// Updated only by the controller worker; readable from any handle.
#[derive(Debug, Default)]
pub struct PrefetchStats {
    /// URLs accepted into the pending queue
    pub admitted: AtomicU64,
    /// URLs refused because the class budget was exhausted or prefetching was suspended
    pub dropped: AtomicU64,
    /// URLs skipped because they were already pending or in flight
    pub duplicates: AtomicU64,
    /// URLs handed to the backend
    pub started: AtomicU64,
    /// Backend completions that freed a slot
    pub finished: AtomicU64,
    /// Completions for fetches the controller had already cancelled
    pub stale_completions: AtomicU64,
    /// In-flight fetches cancelled by the controller
    pub cancelled: AtomicU64,
    /// Pending URLs removed by a policy re-evaluation or cancel-all
    pub trimmed: AtomicU64,
}

impl PrefetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            stale_completions: self.stale_completions.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            trimmed: self.trimmed.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            admitted = s.admitted,
            dropped = s.dropped,
            duplicates = s.duplicates,
            started = s.started,
            finished = s.finished,
            stale_completions = s.stale_completions,
            cancelled = s.cancelled,
            trimmed = s.trimmed,
            "Prefetch statistics"
        );
    }
}

/// Point-in-time copy of [`PrefetchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub admitted: u64,
    pub dropped: u64,
    pub duplicates: u64,
    pub started: u64,
    pub finished: u64,
    pub stale_completions: u64,
    pub cancelled: u64,
    pub trimmed: u64,
}
