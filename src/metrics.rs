use crate::extraction::types::ExtractionError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing extraction activity.
#[derive(Default)]
pub struct ExtractionMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    submissions: AtomicU64,
    completed: AtomicU64,
    backend_failures: AtomicU64,
    timeouts: AtomicU64,
    other_errors: AtomicU64,
}

impl ExtractionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request answered from the cache.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that had to go to the backend.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task accepted by the backend.
    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task that reached `Completed`.
    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify and record a failed extraction.
    pub fn record_error(&self, error: &ExtractionError) {
        let counter = match error {
            ExtractionError::Failed(_) => &self.backend_failures,
            ExtractionError::Timeout { .. } | ExtractionError::DeadlineExceeded(_) => {
                &self.timeouts
            }
            _ => &self.other_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            other_errors: self.other_errors.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of extraction counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Requests served from the cache without any backend call.
    pub cache_hits: u64,
    /// Requests that required a backend submission.
    pub cache_misses: u64,
    /// Tasks accepted by the backend.
    pub submissions: u64,
    /// Tasks that completed with a result.
    pub completed: u64,
    /// Tasks the backend reported as failed.
    pub backend_failures: u64,
    /// Requests that ran out of attempts or hit the caller deadline.
    pub timeouts: u64,
    /// Encoding, transport, protocol, and cache errors.
    pub other_errors: u64,
}
