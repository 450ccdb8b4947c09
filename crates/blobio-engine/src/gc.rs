//! Garbage collection: scheduling and the per-namespace sweep pipeline.
//!
//! Collection is online, score-ordered, reachability-verified deletion over
//! the persistent candidate queue — not a stop-the-world mark/sweep.
//!
//! Ids are assigned in creation order and never recycled, and every blob is
//! queued for a reachability check once its grace window elapses. A blob
//! with no incoming refs or imports can never become reachable again, so an
//! unreferenced candidate can be deleted without coordinating with writers.
//! Whenever a ref to a blob is removed, the blob is (re)queued with a score
//! derived from the current time; a processed entry is removed from the
//! queue only if its score is unchanged, so a concurrent re-queue survives.
//! Draining the queue in score order keeps heavily imported blobs at the
//! back, rechecked only as often as their dependents churn.

use crate::service::{NamespaceState, StorageEngine};
use blobio_common::config::StorageConfig;
use blobio_common::{BlobId, Error, NamespaceId, Result};
use blobio_coord::{Score, score_at};
use blobio_ledger::CURRENT_GC_VERSION;
use blobio_object_store::ObjectKey;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Shared state of one namespace sweep: the score source for re-queued
/// imports and the removal counter.
struct SweepState {
    score: AtomicU64,
    removed: AtomicU64,
}

impl SweepState {
    fn new(score: Score) -> Self {
        Self {
            score: AtomicU64::new(score.to_bits()),
            removed: AtomicU64::new(0),
        }
    }

    /// The next score, strictly greater than every score handed out so
    /// far: incrementing the IEEE bit pattern of a non-negative double
    /// yields the next representable value.
    fn next_score(&self) -> Score {
        Score::from_bits(self.score.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn on_removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }
}

impl StorageEngine {
    /// GC scheduler tick: find namespaces whose sweep is overdue (most
    /// overdue first), take each namespace's sweep lock, and run the sweep.
    /// A namespace whose lock is held elsewhere is skipped until the next
    /// schedule.
    pub async fn tick_gc(&self, shutdown: &CancellationToken) -> Result<()> {
        let mut ran: HashSet<NamespaceId> = HashSet::new();
        let now = self.inner.clock.now_utc();

        loop {
            if shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let config = self.config();
            if !config.enable_gc && !config.enable_gc_verification {
                break;
            }

            // Reconcile the tracked namespace list with the configuration
            let mut gc_state = self.inner.gc_state.get().await?;
            let configured: Vec<NamespaceId> =
                config.namespaces.iter().map(|ns| ns.id.clone()).collect();
            let tracked: Vec<NamespaceId> = gc_state
                .value
                .namespaces
                .iter()
                .map(|ns| ns.id.clone())
                .collect();
            if !namespace_sets_equal(&configured, &tracked) {
                gc_state = self
                    .inner
                    .gc_state
                    .update_with(|state| state.sync_namespaces(&configured, now))
                    .await?;
            }

            // Namespaces due for a sweep, most overdue first
            let mut pending: Vec<(DateTime<Utc>, NamespaceId)> = Vec::new();
            for namespace_state in &gc_state.value.namespaces {
                if ran.contains(&namespace_state.id) {
                    continue;
                }
                let Some(namespace_config) = config.namespace(&namespace_state.id) else {
                    continue;
                };
                let due = namespace_state.last_time
                    + chrono::Duration::from_std(namespace_config.gc_frequency())
                        .unwrap_or_else(|_| chrono::Duration::zero());
                if due < now {
                    pending.push((due, namespace_state.id.clone()));
                }
            }
            pending.sort_by(|a, b| a.0.cmp(&b.0));
            if pending.is_empty() {
                break;
            }

            // Sweep the first one whose lock we can take
            for (_, namespace) in pending {
                if !ran.insert(namespace.clone()) {
                    continue;
                }
                match self
                    .inner
                    .sweep_lock
                    .try_acquire(&namespace, config.gc.lock_ttl())
                    .await?
                {
                    Some(guard) => {
                        let result = self
                            .sweep_namespace(&namespace, gc_state.value.last_admitted, now, shutdown)
                            .await;
                        match result {
                            Ok(()) => {}
                            Err(e) if e.is_cancelled() => {
                                info!("Cancelled GC pass for {namespace}");
                            }
                            Err(e) => {
                                error!("Exception while running garbage collection: {e}");
                            }
                        }
                        drop(guard);
                        break;
                    }
                    None => {
                        debug!("Sweep lock for {namespace} unavailable; skipping this cycle");
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one full sweep of a namespace: a producer draining the candidate
    /// queue front and a pool of workers rechecking reachability, joined by
    /// a bounded channel. Ends when the producer observes an empty queue.
    async fn sweep_namespace(
        &self,
        namespace: &NamespaceId,
        admission_floor: BlobId,
        now: DateTime<Utc>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let state = self.state();
        let Some(namespace_state) = state.namespaces.get(namespace).cloned() else {
            return Ok(());
        };
        let config = Arc::clone(&state.config);
        if !config.enable_gc && !config.enable_gc_verification {
            return Ok(());
        }

        // Cancel the pipeline on shutdown or on a config change
        let token = shutdown.child_token();
        let mut config_rx = self.subscribe_config();
        let watcher = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    changed = config_rx.changed() => {
                        if changed.is_ok() {
                            token.cancel();
                        }
                    }
                }
            }
        });

        info!("Running garbage collection for namespace {namespace}...");
        let started = Instant::now();
        let sweep = Arc::new(SweepState::new(score_at(now)));
        let wake = Arc::new(Notify::new());
        let (tx, rx) = flume::bounded::<(BlobId, Score)>(config.gc.channel_capacity);

        let producer = tokio::spawn({
            let engine = self.clone();
            let namespace = namespace.clone();
            let wake = Arc::clone(&wake);
            let token = token.clone();
            let batch = config.gc.sweep_batch;
            async move {
                engine
                    .produce_candidates(&namespace, tx, &wake, &token, batch)
                    .await
            }
        });
        let mut workers = Vec::new();
        for _ in 0..config.gc.sweep_workers.max(1) {
            workers.push(tokio::spawn({
                let engine = self.clone();
                let namespace = namespace.clone();
                let namespace_state = Arc::clone(&namespace_state);
                let rx = rx.clone();
                let sweep = Arc::clone(&sweep);
                let config = Arc::clone(&config);
                let wake = Arc::clone(&wake);
                let token = token.clone();
                async move {
                    engine
                        .consume_candidates(
                            &namespace,
                            namespace_state.as_ref(),
                            rx,
                            &sweep,
                            admission_floor,
                            &config,
                            &wake,
                            &token,
                        )
                        .await
                }
            }));
        }
        drop(rx);

        let mut results: Vec<Result<()>> = Vec::new();
        for handle in std::iter::once(producer).chain(workers) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(Err(Error::Metadata(format!("sweep task panicked: {e}")))),
            }
        }
        token.cancel();
        let _ = watcher.await;

        let mut cancelled = false;
        let mut failure: Option<Error> = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => cancelled = true,
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if cancelled {
            return Err(Error::Cancelled);
        }

        // Sweep complete: stamp the namespace so scheduling restarts the
        // frequency window from this pass.
        self.inner
            .gc_state
            .update_with(|state| state.find_or_add(namespace, now).last_time = now)
            .await?;
        self.inner.metrics.add_sweep_completed();
        info!(
            "Finished garbage collection for namespace {namespace} in {:.1}s ({} removed)",
            started.elapsed().as_secs_f64(),
            sweep.removed()
        );
        Ok(())
    }

    /// Reads batches from the front of the candidate queue and forwards
    /// entries to the workers, skipping entries already in flight from the
    /// previous poll. Blocks on the wake signal between polls so a stable
    /// in-flight set does not busy-loop.
    async fn produce_candidates(
        &self,
        namespace: &NamespaceId,
        tx: flume::Sender<(BlobId, Score)>,
        wake: &Notify,
        token: &CancellationToken,
        batch: usize,
    ) -> Result<()> {
        let mut in_flight: HashSet<(BlobId, u64)> = HashSet::new();
        let mut last_log: Option<Instant> = None;

        loop {
            if last_log.is_none_or(|at| at.elapsed() > Duration::from_secs(30)) {
                let length = self.inner.queue.len(namespace).await?;
                info!("Garbage collection queue for namespace {namespace} has {length} entries");
                last_log = Some(Instant::now());
            }

            let entries = self.inner.queue.front(namespace, batch).await?;
            if entries.is_empty() {
                info!("Garbage collection complete for namespace {namespace}");
                break;
            }

            let mut next_in_flight = HashSet::with_capacity(entries.len());
            for (id, score) in entries {
                let key = (id, score.to_bits());
                if !in_flight.contains(&key) {
                    tokio::select! {
                        _ = token.cancelled() => return Err(Error::Cancelled),
                        sent = tx.send_async((id, score)) => {
                            if sent.is_err() {
                                // All workers are gone; nothing left to feed
                                return Ok(());
                            }
                        }
                    }
                }
                next_in_flight.insert(key);
            }
            in_flight = next_in_flight;

            // Wait for a worker to finish something before polling again
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = wake.notified() => {}
            }
        }
        Ok(())
    }

    /// Worker half of the sweep pipeline.
    #[allow(clippy::too_many_arguments)]
    async fn consume_candidates(
        &self,
        namespace: &NamespaceId,
        namespace_state: &NamespaceState,
        rx: flume::Receiver<(BlobId, Score)>,
        sweep: &SweepState,
        admission_floor: BlobId,
        config: &StorageConfig,
        wake: &Notify,
        token: &CancellationToken,
    ) -> Result<()> {
        loop {
            let (id, score) = tokio::select! {
                _ = token.cancelled() => return Err(Error::Cancelled),
                received = rx.recv_async() => match received {
                    Ok(entry) => entry,
                    Err(_) => break,
                },
            };

            let result = self
                .check_candidate(namespace, namespace_state, id, score, sweep, admission_floor, config)
                .await;
            if result.is_err() {
                // Fault the whole pipeline rather than strand the producer
                token.cancel();
            }
            wake.notify_one();
            result?;
        }
        Ok(())
    }

    /// Recheck one candidate: delete it (or stamp it, in verification
    /// mode) when unreferenced, re-queue its imports, then conditionally
    /// drop the processed queue entry.
    #[allow(clippy::too_many_arguments)]
    async fn check_candidate(
        &self,
        namespace: &NamespaceId,
        namespace_state: &NamespaceState,
        id: BlobId,
        score: Score,
        sweep: &SweepState,
        admission_floor: BlobId,
        config: &StorageConfig,
    ) -> Result<()> {
        if !self.inner.ledger.is_referenced(id).await? {
            let record = if config.enable_gc {
                self.inner.blobs.remove(id).await?
            } else {
                self.inner.blobs.stamp_gc_version(id, CURRENT_GC_VERSION).await?
            };

            if let Some(record) = record {
                // Deleting this blob may orphan its imports: requeue every
                // already-admitted one for its own recheck.
                let entries: Vec<(BlobId, Score)> = record
                    .imports
                    .iter()
                    .filter(|import| **import <= admission_floor)
                    .map(|import| (*import, sweep.next_score()))
                    .collect();
                if !entries.is_empty() {
                    self.inner.queue.add_many(namespace, &entries).await?;
                }

                let key = ObjectKey::for_locator(&record.locator());
                debug!(
                    "Deleting {namespace} blob {id}, key: {key} ({} imports)",
                    record.imports.len()
                );
                if config.enable_gc {
                    namespace_state.store.delete(&key).await.map_err(Error::from)?;
                }
                sweep.on_removed();
                self.inner.metrics.add_swept(1);
            }
        }

        // Drop the processed entry only if its score is unchanged; a
        // concurrent re-push with a newer score must survive.
        self.inner.queue.remove_if_score(namespace, id, score).await?;
        Ok(())
    }
}

fn namespace_sets_equal(a: &[NamespaceId], b: &[NamespaceId]) -> bool {
    let mut a: Vec<&NamespaceId> = a.iter().collect();
    let mut b: Vec<&NamespaceId> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, ns};
    use blobio_common::{Digest, Locator, RefName};
    use blobio_coord::{CheckQueue, SweepLock};
    use blobio_ledger::AddAliasRequest;
    use blobio_meta_store::BlobCollection;
    use bytes::Bytes;

    /// Run the admission tick plus enough scheduler ticks for one sweep:
    /// the first GC tick registers a fresh namespace, the second (a minute
    /// later) finds it overdue and sweeps.
    async fn run_gc_cycle(fixture: &Fixture) {
        let token = CancellationToken::new();
        fixture.engine.tick_ingest().await.unwrap();
        fixture.engine.tick_gc(&token).await.unwrap();
        fixture.clock.advance(chrono::Duration::minutes(1));
        fixture.engine.tick_gc(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_deletes_unreachable_graph() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        // A <- B <- ref "head", plus an alias on A
        let a = handle
            .write_blob(Bytes::from_static(b"blob a"), &[], None)
            .await
            .unwrap();
        let b = handle
            .write_blob(Bytes::from_static(b"blob b"), std::slice::from_ref(&a), None)
            .await
            .unwrap();
        let head = RefName::new_unchecked("head");
        handle
            .add_ref(&head, Digest::ZERO, b.clone(), None)
            .await
            .unwrap();
        handle
            .add_aliases(&[AddAliasRequest {
                name: "tag".to_string(),
                target: a.clone(),
                rank: 1,
                data: Vec::new(),
            }])
            .await
            .unwrap();

        let a_id = fixture
            .store
            .find_by_path(&namespace, a.base())
            .await
            .unwrap()
            .unwrap()
            .id;
        let b_id = fixture
            .store
            .find_by_path(&namespace, b.base())
            .await
            .unwrap()
            .unwrap()
            .id;

        // Let the grace window elapse, admit, then drop the only root
        fixture.clock.advance(chrono::Duration::hours(13));
        fixture.engine.tick_ingest().await.unwrap();
        assert!(handle.remove_ref(&head).await.unwrap());

        run_gc_cycle(&fixture).await;

        // Both records and both payloads are gone, and nothing surfaces
        // through lookups anymore
        assert!(fixture.store.get(a_id).await.unwrap().is_none());
        assert!(fixture.store.get(b_id).await.unwrap().is_none());
        assert!(fixture.objects.store(&namespace).is_empty());
        assert!(handle.read_ref(&head, None).await.unwrap().is_none());
        assert!(handle.find_aliases("tag", None).await.unwrap().is_empty());
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 0);
        assert_eq!(fixture.engine.metrics().blobs_swept, 2);
    }

    #[tokio::test]
    async fn test_sweep_never_deletes_reachable_blobs() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        let kept = handle
            .write_blob(Bytes::from_static(b"kept"), &[], None)
            .await
            .unwrap();
        let root = handle
            .write_blob(Bytes::from_static(b"root"), std::slice::from_ref(&kept), None)
            .await
            .unwrap();
        let orphan = handle
            .write_blob(Bytes::from_static(b"orphan"), &[], None)
            .await
            .unwrap();
        let head = RefName::new_unchecked("keep");
        handle
            .add_ref(&head, Digest::ZERO, root.clone(), None)
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::hours(13));
        run_gc_cycle(&fixture).await;

        // The ref keeps `root` alive, and `root` keeps its import alive
        assert!(
            fixture
                .store
                .find_by_path(&namespace, kept.base())
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            fixture
                .store
                .find_by_path(&namespace, root.base())
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            fixture
                .store
                .find_by_path(&namespace, orphan.base())
                .await
                .unwrap()
                .is_none()
        );
        assert!(handle.read_ref(&head, None).await.unwrap().is_some());
        assert_eq!(fixture.objects.store(&namespace).len(), 2);
    }

    #[tokio::test]
    async fn test_verification_mode_stamps_instead_of_deleting() {
        let fixture = Fixture::with_config(vec!["test"], |config| {
            config.enable_gc = false;
            config.enable_gc_verification = true;
        })
        .await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        let orphan = handle
            .write_blob(Bytes::from_static(b"orphan"), &[], None)
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::hours(13));
        run_gc_cycle(&fixture).await;

        let record = fixture
            .store
            .find_by_path(&namespace, orphan.base())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.gc_version, CURRENT_GC_VERSION);
        // Dry run: the payload survives, and so does the record
        assert_eq!(fixture.objects.store(&namespace).len(), 1);
        assert!(handle.read_blob(&orphan, 0, None).await.is_ok());
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_skipped_while_lock_held() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        let orphan = handle
            .write_blob(Bytes::from_static(b"orphan"), &[], None)
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::hours(13));
        let token = CancellationToken::new();
        fixture.engine.tick_ingest().await.unwrap();
        fixture.engine.tick_gc(&token).await.unwrap();
        fixture.clock.advance(chrono::Duration::minutes(1));

        // Another holder owns the namespace sweep lock: invisible to
        // users, just delayed
        let guard = fixture
            .coord
            .try_acquire(&namespace, Duration::from_secs(600))
            .await
            .unwrap()
            .unwrap();
        fixture.engine.tick_gc(&token).await.unwrap();
        assert!(
            fixture
                .store
                .find_by_path(&namespace, orphan.base())
                .await
                .unwrap()
                .is_some()
        );

        drop(guard);
        fixture.engine.tick_gc(&token).await.unwrap();
        assert!(
            fixture
                .store
                .find_by_path(&namespace, orphan.base())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_young_blobs_stay_outside_admission_window() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        let young = handle
            .write_blob(Bytes::from_static(b"young"), &[], None)
            .await
            .unwrap();

        // Only one hour old: inside the 12h grace window
        fixture.clock.advance(chrono::Duration::hours(1));
        run_gc_cycle(&fixture).await;

        assert!(
            fixture
                .store
                .find_by_path(&namespace, young.base())
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 0);
    }
}
