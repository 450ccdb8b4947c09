//! Coordination store trait surface.

use async_trait::async_trait;
use blobio_common::{BlobId, NamespaceId, Result};
use std::time::Duration;

/// Queue score. Lower scores drain first; a re-push with a fresh (higher)
/// score moves an entry to the back of the queue.
pub type Score = f64;

/// Per-namespace score-ordered set of blob ids awaiting a reachability
/// recheck.
#[async_trait]
pub trait CheckQueue: Send + Sync {
    /// Add an id, or update its score if already present.
    async fn add(&self, namespace: &NamespaceId, id: BlobId, score: Score) -> Result<()>;

    /// Batch form of [`CheckQueue::add`].
    async fn add_many(&self, namespace: &NamespaceId, entries: &[(BlobId, Score)]) -> Result<()>;

    /// Up to `limit` entries from the front of the queue (lowest scores),
    /// with their scores.
    async fn front(&self, namespace: &NamespaceId, limit: usize)
        -> Result<Vec<(BlobId, Score)>>;

    /// Remove an entry iff its score still equals `score`. Returns true if
    /// the entry was removed; false means it was absent or was re-pushed
    /// with a newer score, which must survive.
    async fn remove_if_score(
        &self,
        namespace: &NamespaceId,
        id: BlobId,
        score: Score,
    ) -> Result<bool>;

    /// Current queue length.
    async fn len(&self, namespace: &NamespaceId) -> Result<u64>;
}

/// Advisory per-namespace mutual exclusion for GC sweeps.
///
/// The lock is time-bounded: a crashed holder's lock expires after the TTL,
/// so a wedged sweep self-heals.
#[async_trait]
pub trait SweepLock: Send + Sync {
    /// Try to acquire the lock for a namespace. Returns `None` if another
    /// holder currently owns it.
    async fn try_acquire(
        &self,
        namespace: &NamespaceId,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>>;
}

/// Held sweep lock; released on drop (or by TTL expiry if the holder dies).
pub trait LockGuard: Send {}
