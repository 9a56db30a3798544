//! Engine counters
//!
//! Counters only, monotonic, reset on engine open. Relaxed ordering: the
//! values are observational and never drive engine decisions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    cycles: AtomicU64,
    idle_cycles: AtomicU64,
    batches_committed: AtomicU64,
    batches_failed: AtomicU64,
    requests_committed: AtomicU64,
    requests_conflicted: AtomicU64,
    requests_failed: AtomicU64,
    bytes_written: AtomicU64,
    /// Outcomes nobody was waiting for anymore
    outcomes_discarded: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, idle: bool) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if idle {
            self.idle_cycles.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_commit(&self, requests: usize, bytes: usize) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.requests_committed
            .fetch_add(requests as u64, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, requests: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.requests_failed
            .fetch_add(requests as u64, Ordering::Relaxed);
    }

    /// Requests resolved `IoFailure` without a write attempt (fault drain).
    pub fn record_aborted(&self, requests: usize) {
        self.requests_failed
            .fetch_add(requests as u64, Ordering::Relaxed);
    }

    pub fn record_conflicts(&self, requests: usize) {
        self.requests_conflicted
            .fetch_add(requests as u64, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.outcomes_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            requests_committed: self.requests_committed.load(Ordering::Relaxed),
            requests_conflicted: self.requests_conflicted.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            outcomes_discarded: self.outcomes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub requests_committed: u64,
    pub requests_conflicted: u64,
    pub requests_failed: u64,
    pub bytes_written: u64,
    pub outcomes_discarded: u64,
}

impl MetricsSnapshot {
    /// Every request the engine has produced an outcome for through a cycle
    pub fn requests_resolved(&self) -> u64 {
        self.requests_committed + self.requests_conflicted + self.requests_failed
    }
}
