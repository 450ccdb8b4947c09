//! Storage engine facade.
//!
//! One `StorageEngine` per process. Client operations resolve a namespace
//! first, then go through a [`NamespaceHandle`] bound to that namespace's
//! byte store. Configuration is published through a watch channel; the
//! namespace/backend snapshot is rebuilt when the published value changes,
//! and in-flight GC sweeps cancel.

use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::ticker::spawn_ticker;
use blobio_common::config::{NamespaceConfig, StorageConfig, TickerConfig};
use blobio_common::{Clock, Digest, Error, Locator, NamespaceId, RefName, Result};
use blobio_coord::{CheckQueue, SweepLock};
use blobio_ledger::{AddAliasRequest, BlobAlias, BlobLedger, RemoveAliasRequest};
use blobio_meta_store::{
    BlobCollection, GC_STATE_KEY, GcState, LENGTH_SCAN_STATE_KEY, LengthScanState, RefCollection,
    STATS_STATE_KEY, Singleton, StateStore, StatsCollection, StatsSnapshot, StatsState,
};
use blobio_object_store::{ObjectKey, ObjectStore, ObjectStoreError, ObjectStoreFactory};
use blobio_refs::{RefOptions, RefStore};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// External collaborators the engine is built from.
pub struct EngineDeps {
    pub blobs: Arc<dyn BlobCollection>,
    pub refs: Arc<dyn RefCollection>,
    pub stats: Arc<dyn StatsCollection>,
    pub state: Arc<dyn StateStore>,
    pub queue: Arc<dyn CheckQueue>,
    pub sweep_lock: Arc<dyn SweepLock>,
    pub objects: Arc<dyn ObjectStoreFactory>,
    pub clock: Arc<dyn Clock>,
}

pub(crate) struct NamespaceState {
    pub(crate) config: NamespaceConfig,
    pub(crate) store: Arc<dyn ObjectStore>,
}

/// Immutable snapshot of the configured namespaces and their byte stores.
pub(crate) struct EngineState {
    pub(crate) config: Arc<StorageConfig>,
    pub(crate) namespaces: HashMap<NamespaceId, Arc<NamespaceState>>,
}

pub(crate) struct EngineInner {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) blobs: Arc<dyn BlobCollection>,
    pub(crate) stats_collection: Arc<dyn StatsCollection>,
    pub(crate) queue: Arc<dyn CheckQueue>,
    pub(crate) sweep_lock: Arc<dyn SweepLock>,
    pub(crate) objects: Arc<dyn ObjectStoreFactory>,
    pub(crate) ledger: BlobLedger,
    pub(crate) refs: RefStore,
    pub(crate) gc_state: Singleton<GcState>,
    pub(crate) stats_state: Singleton<StatsState>,
    pub(crate) length_state: Singleton<LengthScanState>,
    pub(crate) config_tx: watch::Sender<Arc<StorageConfig>>,
    pub(crate) metrics: EngineMetrics,
    tickers: TickerConfig,
    snapshot: Mutex<Option<Arc<EngineState>>>,
}

/// The storage engine. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct StorageEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl StorageEngine {
    #[must_use]
    pub fn new(deps: EngineDeps, config: StorageConfig, tickers: TickerConfig) -> Self {
        let (config_tx, _) = watch::channel(Arc::new(config));
        let ledger = BlobLedger::new(Arc::clone(&deps.blobs), Arc::clone(&deps.refs));
        let refs = RefStore::new(
            Arc::clone(&deps.refs),
            Arc::clone(&deps.blobs),
            Arc::clone(&deps.queue),
            Arc::clone(&deps.state),
            Arc::clone(&deps.clock),
        );
        Self {
            inner: Arc::new(EngineInner {
                clock: deps.clock,
                blobs: deps.blobs,
                stats_collection: deps.stats,
                queue: deps.queue,
                sweep_lock: deps.sweep_lock,
                objects: deps.objects,
                ledger,
                refs,
                gc_state: Singleton::new(Arc::clone(&deps.state), GC_STATE_KEY),
                stats_state: Singleton::new(Arc::clone(&deps.state), STATS_STATE_KEY),
                length_state: Singleton::new(deps.state, LENGTH_SCAN_STATE_KEY),
                config_tx,
                metrics: EngineMetrics::default(),
                tickers,
                snapshot: Mutex::new(None),
            }),
        }
    }

    /// The currently published configuration.
    #[must_use]
    pub fn config(&self) -> Arc<StorageConfig> {
        self.inner.config_tx.borrow().clone()
    }

    /// Publish a new configuration. In-flight GC sweeps observe the change
    /// and cancel; the namespace snapshot is rebuilt on next use.
    pub fn update_config(&self, config: StorageConfig) {
        self.inner.config_tx.send_replace(Arc::new(config));
    }

    pub(crate) fn subscribe_config(&self) -> watch::Receiver<Arc<StorageConfig>> {
        self.inner.config_tx.subscribe()
    }

    /// Snapshot of the configured namespaces, rebuilt when the published
    /// configuration changes. A namespace whose backend fails to build is
    /// logged and left out; operations against it see `UnknownNamespace`.
    pub(crate) fn state(&self) -> Arc<EngineState> {
        let config = self.config();
        let mut cached = self.inner.snapshot.lock();
        if let Some(state) = cached.as_ref() {
            if Arc::ptr_eq(&state.config, &config) {
                return Arc::clone(state);
            }
        }

        let mut namespaces = HashMap::new();
        for namespace_config in &config.namespaces {
            match self.inner.objects.create(namespace_config) {
                Ok(store) => {
                    namespaces.insert(
                        namespace_config.id.clone(),
                        Arc::new(NamespaceState {
                            config: namespace_config.clone(),
                            store,
                        }),
                    );
                }
                Err(e) => {
                    error!(
                        "Unable to create storage backend for {}: {e}",
                        namespace_config.id
                    );
                }
            }
        }

        let state = Arc::new(EngineState { config, namespaces });
        *cached = Some(Arc::clone(&state));
        state
    }

    /// Bind to a namespace for client operations.
    pub fn namespace(&self, id: &NamespaceId) -> Result<NamespaceHandle> {
        let state = self.state();
        let namespace = state
            .namespaces
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownNamespace(id.clone()))?;
        Ok(NamespaceHandle {
            engine: self.clone(),
            state: namespace,
        })
    }

    /// Published stats snapshots within the time range, newest first.
    pub async fn find_stats(
        &self,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<Vec<StatsSnapshot>> {
        self.inner.stats_collection.find(start, finish, count).await
    }

    /// Current engine counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Expire refs past their deadline. Ticker body; also usable directly.
    pub async fn tick_refs(&self) -> Result<()> {
        let expired = self.inner.refs.expire_refs().await?;
        self.inner.metrics.add_expired(expired);
        Ok(())
    }

    /// Start the five background tickers. They stop when `shutdown` fires;
    /// the returned handles complete once each loop has exited.
    pub fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let intervals = self.inner.tickers.clone();
        let mut handles = Vec::new();

        handles.push(spawn_ticker("storage-blobs", intervals.ingest_interval(), shutdown.child_token(), {
            let engine = self.clone();
            move || {
                let engine = engine.clone();
                async move { engine.tick_ingest().await }
            }
        }));
        handles.push(spawn_ticker("storage-refs", intervals.refs_interval(), shutdown.child_token(), {
            let engine = self.clone();
            move || {
                let engine = engine.clone();
                async move { engine.tick_refs().await }
            }
        }));
        handles.push(spawn_ticker("storage-stats", intervals.stats_interval(), shutdown.child_token(), {
            let engine = self.clone();
            move || {
                let engine = engine.clone();
                async move { engine.tick_stats().await }
            }
        }));
        let gc_token = shutdown.child_token();
        handles.push(spawn_ticker("storage-gc", intervals.gc_interval(), gc_token.clone(), {
            let engine = self.clone();
            move || {
                let engine = engine.clone();
                let token = gc_token.clone();
                async move { engine.tick_gc(&token).await }
            }
        }));
        let lengths_token = shutdown.child_token();
        handles.push(spawn_ticker("storage-lengths", intervals.lengths_interval(), lengths_token.clone(), {
            let engine = self.clone();
            move || {
                let engine = engine.clone();
                let token = lengths_token.clone();
                async move { engine.tick_lengths(&token).await }
            }
        }));

        info!("Storage tickers started");
        handles
    }
}

/// Value of a ref, as surfaced to callers.
#[derive(Clone, Debug)]
pub struct RefValue {
    pub hash: Digest,
    pub target: Locator,
}

/// Request to create or replace a ref in a batch metadata update.
#[derive(Clone, Debug)]
pub struct AddRefRequest {
    pub name: RefName,
    pub hash: Digest,
    pub target: Locator,
    pub options: Option<RefOptions>,
}

/// Request to delete a ref in a batch metadata update.
#[derive(Clone, Debug)]
pub struct RemoveRefRequest {
    pub name: RefName,
}

/// Batched metadata mutation: aliases first, then ref changes in parallel.
#[derive(Clone, Debug, Default)]
pub struct UpdateMetadataRequest {
    pub add_aliases: Vec<AddAliasRequest>,
    pub remove_aliases: Vec<RemoveAliasRequest>,
    pub add_refs: Vec<AddRefRequest>,
    pub remove_refs: Vec<RemoveRefRequest>,
}

/// Client operations bound to one namespace.
pub struct NamespaceHandle {
    engine: StorageEngine,
    state: Arc<NamespaceState>,
}

impl NamespaceHandle {
    #[must_use]
    pub fn id(&self) -> &NamespaceId {
        &self.state.config.id
    }

    /// Store a blob under a freshly allocated locator.
    pub async fn write_blob(
        &self,
        data: Bytes,
        imports: &[Locator],
        prefix: Option<&str>,
    ) -> Result<Locator> {
        let locator = Locator::unique(prefix);
        self.write_blob_at(&locator, data, imports).await?;
        Ok(locator)
    }

    /// Store a blob under a caller-chosen locator. Retrying the same write
    /// is a no-op promotion in the ledger, never a duplicate.
    pub async fn write_blob_at(
        &self,
        locator: &Locator,
        data: Bytes,
        imports: &[Locator],
    ) -> Result<()> {
        let key = ObjectKey::for_locator(locator);
        self.state.store.write(&key, data).await.map_err(Error::from)?;
        self.engine
            .inner
            .ledger
            .add_blob(self.id(), locator, imports, Vec::new())
            .await?;
        Ok(())
    }

    /// Read (part of) a blob's bytes.
    pub async fn read_blob(
        &self,
        locator: &Locator,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes> {
        if self.engine.config().enable_gc_verification {
            self.engine
                .inner
                .ledger
                .verify_not_collected(self.id(), locator)
                .await;
        }
        match self
            .state
            .store
            .read(&ObjectKey::for_locator(locator), offset, length)
            .await
        {
            Ok(data) => Ok(data),
            Err(ObjectStoreError::NotFound(_)) => Err(Error::UnknownBlob {
                namespace: self.id().clone(),
                path: locator.base().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Create or replace a ref.
    pub async fn add_ref(
        &self,
        name: &RefName,
        hash: Digest,
        target: Locator,
        options: Option<RefOptions>,
    ) -> Result<()> {
        self.engine
            .inner
            .refs
            .add_ref(self.id(), name, hash, target, options)
            .await
    }

    /// Read a ref; `None` when absent or expired.
    pub async fn read_ref(
        &self,
        name: &RefName,
        max_cache_age: Option<Duration>,
    ) -> Result<Option<RefValue>> {
        let record = self
            .engine
            .inner
            .refs
            .try_read_ref(self.id(), name, max_cache_age)
            .await?;
        Ok(record.map(|record| RefValue {
            hash: record.hash,
            target: record.target,
        }))
    }

    /// Delete a ref; returns whether one existed.
    pub async fn remove_ref(&self, name: &RefName) -> Result<bool> {
        self.engine.inner.refs.remove_ref(self.id(), name).await
    }

    /// Attach aliases to blobs.
    pub async fn add_aliases(&self, requests: &[AddAliasRequest]) -> Result<()> {
        self.engine.inner.ledger.add_aliases(self.id(), requests).await
    }

    /// Detach aliases from blobs.
    pub async fn remove_aliases(&self, requests: &[RemoveAliasRequest]) -> Result<()> {
        self.engine
            .inner
            .ledger
            .remove_aliases(self.id(), requests)
            .await
    }

    /// Blobs aliased under `name`, by descending rank.
    pub async fn find_aliases(
        &self,
        name: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<BlobAlias>> {
        self.engine
            .inner
            .ledger
            .find_aliases(self.id(), name, max_results)
            .await
    }

    /// Apply a batched metadata update: alias changes first, then all ref
    /// changes concurrently. The first failure is returned after every
    /// operation has settled.
    pub async fn update_metadata(&self, request: UpdateMetadataRequest) -> Result<()> {
        if !request.add_aliases.is_empty() {
            self.add_aliases(&request.add_aliases).await?;
        }
        if !request.remove_aliases.is_empty() {
            self.remove_aliases(&request.remove_aliases).await?;
        }

        let mut actions = Vec::new();
        for add in request.add_refs {
            let handle = self;
            actions.push(async move {
                handle
                    .add_ref(&add.name, add.hash, add.target.clone(), add.options.clone())
                    .await
            });
        }
        let removals = join_all(request.remove_refs.iter().map(|remove| async move {
            self.remove_ref(&remove.name).await.map(|_| ())
        }));

        let (add_results, remove_results) = tokio::join!(join_all(actions), removals);
        let mut first_error = None;
        for result in add_results.into_iter().chain(remove_results) {
            if let Err(e) = result {
                error!("Error during metadata update: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
