//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals across the engine's background work.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    blobs_ingested: AtomicU64,
    blobs_swept: AtomicU64,
    refs_expired: AtomicU64,
    sweeps_completed: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn add_ingested(&self, count: u64) {
        self.blobs_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_swept(&self, count: u64) {
        self.blobs_swept.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_expired(&self, count: u64) {
        self.refs_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_sweep_completed(&self) {
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blobs_ingested: self.blobs_ingested.load(Ordering::Relaxed),
            blobs_swept: self.blobs_swept.load(Ordering::Relaxed),
            refs_expired: self.refs_expired.load(Ordering::Relaxed),
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`EngineMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blobs_ingested: u64,
    pub blobs_swept: u64,
    pub refs_expired: u64,
    pub sweeps_completed: u64,
}
