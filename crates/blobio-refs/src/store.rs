//! Ref store: add/read/remove with GC cascade, expiry and touch.

use crate::cache::RefCache;
use blobio_common::{BlobId, Clock, Digest, Error, Locator, NamespaceId, RefName, Result};
use blobio_coord::{CheckQueue, score_at};
use blobio_meta_store::{
    BlobCollection, GC_STATE_KEY, GcState, RefCollection, RefRecord, Singleton, StateStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Options for creating a ref.
#[derive(Clone, Debug, Default)]
pub struct RefOptions {
    /// Time before the ref expires
    pub lifetime: Option<Duration>,
    /// Whether reads near the end of the lifetime extend it (default true)
    pub extend: Option<bool>,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::TimeDelta::MAX)
}

/// Named pointers to blobs, with expiry/touch semantics and a read cache.
#[derive(Clone)]
pub struct RefStore {
    refs: Arc<dyn RefCollection>,
    blobs: Arc<dyn BlobCollection>,
    queue: Arc<dyn CheckQueue>,
    gc_state: Singleton<GcState>,
    cache: Arc<RefCache>,
    clock: Arc<dyn Clock>,
}

impl RefStore {
    #[must_use]
    pub fn new(
        refs: Arc<dyn RefCollection>,
        blobs: Arc<dyn BlobCollection>,
        queue: Arc<dyn CheckQueue>,
        state: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            refs,
            blobs,
            queue,
            gc_state: Singleton::new(state, GC_STATE_KEY),
            cache: Arc::new(RefCache::new()),
            clock,
        }
    }

    /// Queue a reachability check for a blob whose last incoming ref may
    /// just have disappeared. Blobs younger than the admission boundary are
    /// skipped: the ingestion ticker will queue them once their grace
    /// window elapses.
    async fn enqueue_check(&self, namespace: &NamespaceId, id: BlobId) -> Result<()> {
        let gc_state = self.gc_state.get().await?;
        if id < gc_state.value.last_admitted {
            let score = score_at(self.clock.now_utc());
            self.queue.add(namespace, id, score).await?;
        }
        Ok(())
    }

    /// Create or replace a ref. The target's base locator must resolve to
    /// a known blob. Replacing an existing ref queues a GC check for its
    /// old target.
    pub async fn add_ref(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        hash: Digest,
        target: Locator,
        options: Option<RefOptions>,
    ) -> Result<()> {
        let path = target.base();
        let target_blob = self
            .blobs
            .find_by_path(namespace, path)
            .await?
            .ok_or_else(|| Error::UnknownBlob {
                namespace: namespace.clone(),
                path: path.to_string(),
            })?;

        let now = self.clock.now_utc();
        let mut record = RefRecord {
            namespace: namespace.clone(),
            name: name.clone(),
            hash,
            target,
            target_blob_id: target_blob.id,
            expires_at: None,
            lifetime: None,
        };
        if let Some(options) = options {
            if let Some(lifetime) = options.lifetime {
                record.expires_at = Some(now + to_chrono(lifetime));
                if options.extend.unwrap_or(true) {
                    record.lifetime = Some(lifetime);
                }
            }
        }

        let old = self.refs.upsert(record.clone()).await?;
        if let Some(old) = old {
            self.enqueue_check(namespace, old.target_blob_id).await?;
        }

        debug!("Added ref {namespace}:{name} to {}", record.target);
        self.cache.insert(namespace, name, Some(record), now);
        Ok(())
    }

    /// Read a ref, honoring the caller's cache-freshness bound.
    ///
    /// An expired ref is lazily deleted (cascading a GC check for its
    /// target) and reads as absent. A ref past 3/4 of its lifetime is
    /// touched: its expiry moves out by another full lifetime.
    pub async fn try_read_ref(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        max_cache_age: Option<Duration>,
    ) -> Result<Option<RefRecord>> {
        let now = self.clock.now_utc();

        let entry = match self.cache.get(namespace, name, now, max_cache_age) {
            Some(value) => value,
            None => {
                let record = self.refs.find(namespace, name).await?;
                self.cache.insert(namespace, name, record.clone(), now);
                record
            }
        };
        let Some(mut record) = entry else {
            return Ok(None);
        };

        if let Some(expires_at) = record.expires_at {
            if record.has_expired(now) {
                // Conditional delete: a concurrent touch wins
                if let Some(old) = self
                    .refs
                    .remove_if_expiry(namespace, name, expires_at)
                    .await?
                {
                    info!("Deleted ref {namespace}:{name}");
                    self.enqueue_check(namespace, old.target_blob_id).await?;
                }
                self.cache.insert(namespace, name, None, now);
                return Ok(None);
            }
            if record.requires_touch(now) {
                if let Some(lifetime) = record.lifetime {
                    let extended = now + to_chrono(lifetime);
                    self.refs.touch(namespace, name, extended).await?;
                    record.expires_at = Some(extended);
                    self.cache.insert(namespace, name, Some(record.clone()), now);
                }
            }
        }

        Ok(Some(record))
    }

    /// Delete a ref. Returns whether one existed; queues a GC check for
    /// the old target when it did.
    pub async fn remove_ref(&self, namespace: &NamespaceId, name: &RefName) -> Result<bool> {
        let old = self.refs.remove(namespace, name).await?;
        self.cache
            .insert(namespace, name, None, self.clock.now_utc());

        match old {
            Some(old) => {
                info!("Deleted ref {namespace}:{name}");
                self.enqueue_check(namespace, old.target_blob_id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Scan out refs whose expiry has passed. Called by the expiry ticker;
    /// reads perform the same deletion lazily.
    pub async fn expire_refs(&self) -> Result<u64> {
        let now = self.clock.now_utc();
        let mut expired = 0u64;
        loop {
            let batch = self.refs.find_expired(now, 500).await?;
            if batch.is_empty() {
                break;
            }
            for record in batch {
                let Some(expires_at) = record.expires_at else {
                    continue;
                };
                if self
                    .refs
                    .remove_if_expiry(&record.namespace, &record.name, expires_at)
                    .await?
                    .is_some()
                {
                    info!("Expired ref {}:{}", record.namespace, record.name);
                    self.enqueue_check(&record.namespace, record.target_blob_id)
                        .await?;
                    expired += 1;
                }
                self.cache.insert(&record.namespace, &record.name, None, now);
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobio_common::ManualClock;
    use blobio_coord::InProcessCoordinator;
    use blobio_meta_store::RedbMetaStore;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct Fixture {
        refs: RefStore,
        store: Arc<RedbMetaStore>,
        coord: Arc<InProcessCoordinator>,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(
            RedbMetaStore::open(dir.path().join("meta.redb"), clock.clone()).unwrap(),
        );
        let coord = Arc::new(InProcessCoordinator::new());
        let refs = RefStore::new(
            store.clone(),
            store.clone(),
            coord.clone(),
            store.clone(),
            clock.clone(),
        );
        Fixture {
            refs,
            store,
            coord,
            clock,
            _dir: dir,
        }
    }

    fn ns(name: &str) -> NamespaceId {
        NamespaceId::new_unchecked(name)
    }

    async fn write_blob(fixture: &Fixture, namespace: &NamespaceId, path: &str) -> BlobId {
        fixture
            .store
            .promote(namespace, path, &[], &[])
            .await
            .unwrap()
            .id
    }

    /// Mark everything written so far as already admitted, so ref removals
    /// cascade into the candidate queue.
    async fn admit_all(fixture: &Fixture) {
        let boundary = BlobId::floor_at(fixture.clock.now_utc() + chrono::Duration::hours(1));
        let singleton: Singleton<GcState> =
            Singleton::new(fixture.store.clone() as Arc<dyn StateStore>, GC_STATE_KEY);
        singleton
            .update_with(|state| state.last_admitted = boundary)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_ref_unknown_blob() {
        let fixture = fixture().await;
        let namespace = ns("test");
        let err = fixture
            .refs
            .add_ref(
                &namespace,
                &RefName::new_unchecked("head"),
                Digest::ZERO,
                Locator::new("pkg/ghost"),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_touch_extends_only_past_three_quarters() {
        let fixture = fixture().await;
        let namespace = ns("test");
        let name = RefName::new_unchecked("head");
        write_blob(&fixture, &namespace, "pkg/a").await;

        let created = fixture.clock.now_utc();
        fixture
            .refs
            .add_ref(
                &namespace,
                &name,
                Digest::ZERO,
                Locator::new("pkg/a"),
                Some(RefOptions {
                    lifetime: Some(Duration::from_secs(100)),
                    extend: None,
                }),
            )
            .await
            .unwrap();

        // At 50s: under the touch threshold, expiry unchanged
        fixture.clock.advance(chrono::Duration::seconds(50));
        fixture
            .refs
            .try_read_ref(&namespace, &name, Some(Duration::ZERO))
            .await
            .unwrap()
            .unwrap();
        let stored = fixture.store.find(&namespace, &name).await.unwrap().unwrap();
        assert_eq!(stored.expires_at.unwrap(), created + chrono::Duration::seconds(100));

        // At 80s: past 3/4 of the lifetime, expiry slides to now + lifetime
        fixture.clock.advance(chrono::Duration::seconds(30));
        fixture
            .refs
            .try_read_ref(&namespace, &name, Some(Duration::ZERO))
            .await
            .unwrap()
            .unwrap();
        let stored = fixture.store.find(&namespace, &name).await.unwrap().unwrap();
        assert_eq!(
            stored.expires_at.unwrap(),
            created + chrono::Duration::seconds(80 + 100)
        );
    }

    #[tokio::test]
    async fn test_fixed_deadline_ref_is_never_touched() {
        let fixture = fixture().await;
        let namespace = ns("test");
        let name = RefName::new_unchecked("pinned");
        write_blob(&fixture, &namespace, "pkg/a").await;

        let created = fixture.clock.now_utc();
        fixture
            .refs
            .add_ref(
                &namespace,
                &name,
                Digest::ZERO,
                Locator::new("pkg/a"),
                Some(RefOptions {
                    lifetime: Some(Duration::from_secs(100)),
                    extend: Some(false),
                }),
            )
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::seconds(90));
        fixture
            .refs
            .try_read_ref(&namespace, &name, Some(Duration::ZERO))
            .await
            .unwrap()
            .unwrap();
        let stored = fixture.store.find(&namespace, &name).await.unwrap().unwrap();
        assert_eq!(stored.expires_at.unwrap(), created + chrono::Duration::seconds(100));

        // Reads kept it alive until the deadline, but no further
        fixture.clock.advance(chrono::Duration::seconds(10));
        assert!(
            fixture
                .refs
                .try_read_ref(&namespace, &name, Some(Duration::ZERO))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_expired_read_deletes_and_enqueues() {
        let fixture = fixture().await;
        let namespace = ns("test");
        let name = RefName::new_unchecked("temp");
        let blob_id = write_blob(&fixture, &namespace, "pkg/a").await;
        admit_all(&fixture).await;

        fixture
            .refs
            .add_ref(
                &namespace,
                &name,
                Digest::ZERO,
                Locator::new("pkg/a"),
                Some(RefOptions {
                    lifetime: Some(Duration::from_secs(60)),
                    extend: Some(false),
                }),
            )
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::seconds(120));
        assert!(
            fixture
                .refs
                .try_read_ref(&namespace, &name, Some(Duration::ZERO))
                .await
                .unwrap()
                .is_none()
        );

        // The lazy delete removed the record and queued a GC check
        assert!(fixture.store.find(&namespace, &name).await.unwrap().is_none());
        let front = fixture.coord.front(&namespace, 10).await.unwrap();
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].0, blob_id);
    }

    #[tokio::test]
    async fn test_expiry_ticker_sweeps_refs() {
        let fixture = fixture().await;
        let namespace = ns("test");
        write_blob(&fixture, &namespace, "pkg/a").await;
        write_blob(&fixture, &namespace, "pkg/b").await;
        admit_all(&fixture).await;

        for (name, lifetime) in [("short", 60), ("long", 3600)] {
            fixture
                .refs
                .add_ref(
                    &namespace,
                    &RefName::new_unchecked(name),
                    Digest::ZERO,
                    Locator::new("pkg/a"),
                    Some(RefOptions {
                        lifetime: Some(Duration::from_secs(lifetime)),
                        extend: Some(false),
                    }),
                )
                .await
                .unwrap();
        }

        fixture.clock.advance(chrono::Duration::seconds(120));
        assert_eq!(fixture.refs.expire_refs().await.unwrap(), 1);

        assert!(
            fixture
                .store
                .find(&namespace, &RefName::new_unchecked("short"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            fixture
                .store
                .find(&namespace, &RefName::new_unchecked("long"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_replace_and_remove_cascade_gc_checks() {
        let fixture = fixture().await;
        let namespace = ns("test");
        let a = write_blob(&fixture, &namespace, "pkg/a").await;
        let b = write_blob(&fixture, &namespace, "pkg/b").await;
        admit_all(&fixture).await;

        let name = RefName::new_unchecked("head");
        fixture
            .refs
            .add_ref(&namespace, &name, Digest::ZERO, Locator::new("pkg/a"), None)
            .await
            .unwrap();
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 0);

        // Re-pointing the ref makes the old target a GC candidate
        fixture
            .refs
            .add_ref(&namespace, &name, Digest::ZERO, Locator::new("pkg/b"), None)
            .await
            .unwrap();
        let front = fixture.coord.front(&namespace, 10).await.unwrap();
        assert_eq!(front.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![a]);

        assert!(fixture.refs.remove_ref(&namespace, &name).await.unwrap());
        let front = fixture.coord.front(&namespace, 10).await.unwrap();
        assert!(front.iter().any(|(id, _)| *id == b));

        assert!(!fixture.refs.remove_ref(&namespace, &name).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_serves_from_cache_within_bound() {
        let fixture = fixture().await;
        let namespace = ns("test");
        let name = RefName::new_unchecked("head");
        write_blob(&fixture, &namespace, "pkg/a").await;

        fixture
            .refs
            .add_ref(&namespace, &name, Digest::ZERO, Locator::new("pkg/a"), None)
            .await
            .unwrap();

        // Delete behind the cache's back
        RefCollection::remove(fixture.store.as_ref(), &namespace, &name)
            .await
            .unwrap();

        // Default freshness: still served from cache
        assert!(
            fixture
                .refs
                .try_read_ref(&namespace, &name, None)
                .await
                .unwrap()
                .is_some()
        );
        // Forced re-read observes the deletion
        assert!(
            fixture
                .refs
                .try_read_ref(&namespace, &name, Some(Duration::ZERO))
                .await
                .unwrap()
                .is_none()
        );
    }
}
