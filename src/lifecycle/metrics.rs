use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for refresh activity
#[derive(Default)]
pub struct RefreshMetrics {
    /// Provider calls started
    attempts: AtomicU64,

    /// Refreshes committed to the store
    successes: AtomicU64,

    /// Provider calls that errored, timed out or returned no access token.
    /// Never exceeds `attempts`.
    failures: AtomicU64,

    /// Callers served by another caller's refresh, including callers handed
    /// a failure they waited on (no provider call)
    coalesced: AtomicU64,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of refresh counters at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshMetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub coalesced: u64,
}
