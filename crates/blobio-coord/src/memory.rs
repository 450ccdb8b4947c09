//! In-process coordination provider.
//!
//! Suitable for a single-node deployment: the candidate queues and sweep
//! locks live in process memory, so "cluster-wide" mutual exclusion
//! degenerates to per-process. The trait-level contract (score ordering,
//! conditional removal, TTL expiry) is identical.

use crate::traits::{CheckQueue, LockGuard, Score, SweepLock};
use async_trait::async_trait;
use blobio_common::{BlobId, NamespaceId, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Scores are stored by their IEEE bit pattern; for the non-negative scores
/// used here, bit order equals numeric order and equality is exact.
#[derive(Default)]
struct ScoreSet {
    by_score: BTreeSet<(u64, BlobId)>,
    scores: HashMap<BlobId, u64>,
}

impl ScoreSet {
    fn insert(&mut self, id: BlobId, score: Score) {
        let bits = score.to_bits();
        if let Some(old) = self.scores.insert(id, bits) {
            self.by_score.remove(&(old, id));
        }
        self.by_score.insert((bits, id));
    }

    fn front(&self, limit: usize) -> Vec<(BlobId, Score)> {
        self.by_score
            .iter()
            .take(limit)
            .map(|(bits, id)| (*id, Score::from_bits(*bits)))
            .collect()
    }

    fn remove_if_score(&mut self, id: BlobId, score: Score) -> bool {
        match self.scores.get(&id) {
            Some(bits) if *bits == score.to_bits() => {
                let bits = *bits;
                self.scores.remove(&id);
                self.by_score.remove(&(bits, id));
                true
            }
            _ => false,
        }
    }

    fn len(&self) -> u64 {
        self.scores.len() as u64
    }
}

struct LockEntry {
    token: u64,
    expires: Instant,
}

/// Single-node implementation of [`CheckQueue`] and [`SweepLock`].
#[derive(Default)]
pub struct InProcessCoordinator {
    queues: DashMap<NamespaceId, Arc<Mutex<ScoreSet>>>,
    locks: Arc<Mutex<HashMap<NamespaceId, LockEntry>>>,
    next_token: AtomicU64,
}

impl InProcessCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, namespace: &NamespaceId) -> Arc<Mutex<ScoreSet>> {
        self.queues
            .entry(namespace.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl CheckQueue for InProcessCoordinator {
    async fn add(&self, namespace: &NamespaceId, id: BlobId, score: Score) -> Result<()> {
        self.queue(namespace).lock().insert(id, score);
        Ok(())
    }

    async fn add_many(&self, namespace: &NamespaceId, entries: &[(BlobId, Score)]) -> Result<()> {
        let queue = self.queue(namespace);
        let mut set = queue.lock();
        for (id, score) in entries {
            set.insert(*id, *score);
        }
        Ok(())
    }

    async fn front(
        &self,
        namespace: &NamespaceId,
        limit: usize,
    ) -> Result<Vec<(BlobId, Score)>> {
        Ok(self.queue(namespace).lock().front(limit))
    }

    async fn remove_if_score(
        &self,
        namespace: &NamespaceId,
        id: BlobId,
        score: Score,
    ) -> Result<bool> {
        Ok(self.queue(namespace).lock().remove_if_score(id, score))
    }

    async fn len(&self, namespace: &NamespaceId) -> Result<u64> {
        Ok(self.queue(namespace).lock().len())
    }
}

struct InProcessLockGuard {
    locks: Arc<Mutex<HashMap<NamespaceId, LockEntry>>>,
    namespace: NamespaceId,
    token: u64,
}

impl LockGuard for InProcessLockGuard {}

impl Drop for InProcessLockGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        if locks
            .get(&self.namespace)
            .is_some_and(|entry| entry.token == self.token)
        {
            locks.remove(&self.namespace);
        }
    }
}

#[async_trait]
impl SweepLock for InProcessCoordinator {
    async fn try_acquire(
        &self,
        namespace: &NamespaceId,
        ttl: Duration,
    ) -> Result<Option<Box<dyn LockGuard>>> {
        let now = Instant::now();
        let mut locks = self.locks.lock();
        if locks
            .get(namespace)
            .is_some_and(|entry| entry.expires > now)
        {
            return Ok(None);
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        locks.insert(
            namespace.clone(),
            LockEntry {
                token,
                expires: now + ttl,
            },
        );
        drop(locks);

        Ok(Some(Box::new(InProcessLockGuard {
            locks: Arc::clone(&self.locks),
            namespace: namespace.clone(),
            token,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ns(name: &str) -> NamespaceId {
        NamespaceId::new_unchecked(name)
    }

    fn id() -> BlobId {
        BlobId::from_uuid(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_queue_orders_by_score() {
        let coord = InProcessCoordinator::new();
        let namespace = ns("test");
        let (a, b, c) = (id(), id(), id());

        coord.add(&namespace, a, 30.0).await.unwrap();
        coord.add(&namespace, b, 10.0).await.unwrap();
        coord.add(&namespace, c, 20.0).await.unwrap();

        let front = coord.front(&namespace, 10).await.unwrap();
        assert_eq!(
            front.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![b, c, a]
        );
        assert_eq!(coord.len(&namespace).await.unwrap(), 3);

        // Re-pushing moves an entry to the back without growing the queue
        coord.add(&namespace, b, 40.0).await.unwrap();
        let front = coord.front(&namespace, 1).await.unwrap();
        assert_eq!(front[0].0, c);
        assert_eq!(coord.len(&namespace).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_conditional_remove_spares_repushed_entries() {
        let coord = InProcessCoordinator::new();
        let namespace = ns("test");
        let entry = id();

        coord.add(&namespace, entry, 10.0).await.unwrap();
        coord.add(&namespace, entry, 20.0).await.unwrap();

        // The score observed at read time no longer matches
        assert!(!coord.remove_if_score(&namespace, entry, 10.0).await.unwrap());
        assert_eq!(coord.len(&namespace).await.unwrap(), 1);

        assert!(coord.remove_if_score(&namespace, entry, 20.0).await.unwrap());
        assert_eq!(coord.len(&namespace).await.unwrap(), 0);
        assert!(!coord.remove_if_score(&namespace, entry, 20.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_lock_exclusion_and_ttl() {
        let coord = InProcessCoordinator::new();
        let namespace = ns("test");

        let guard = coord
            .try_acquire(&namespace, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert!(
            coord
                .try_acquire(&namespace, Duration::from_secs(60))
                .await
                .unwrap()
                .is_none()
        );

        // Releasing makes it available again
        drop(guard);
        let guard = coord
            .try_acquire(&namespace, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        // An expired holder no longer blocks acquisition
        std::thread::sleep(Duration::from_millis(20));
        let stolen = coord
            .try_acquire(&namespace, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(stolen.is_some());

        // The stale guard's drop must not release the new holder's lock
        drop(guard);
        assert!(
            coord
                .try_acquire(&namespace, Duration::from_secs(60))
                .await
                .unwrap()
                .is_none()
        );
    }
}
