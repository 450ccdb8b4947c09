//! Shared engine test fixture: manual clock, redb metadata store,
//! in-process coordinator and per-namespace memory byte stores.

use crate::service::{EngineDeps, StorageEngine};
use blobio_common::config::{NamespaceConfig, StorageConfig, TickerConfig};
use blobio_common::{ManualClock, NamespaceId};
use blobio_coord::InProcessCoordinator;
use blobio_meta_store::RedbMetaStore;
use blobio_object_store::MemoryStoreFactory;
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) fn ns(name: &str) -> NamespaceId {
    NamespaceId::new_unchecked(name)
}

pub(crate) struct Fixture {
    pub(crate) engine: StorageEngine,
    pub(crate) store: Arc<RedbMetaStore>,
    pub(crate) coord: Arc<InProcessCoordinator>,
    pub(crate) objects: Arc<MemoryStoreFactory>,
    pub(crate) clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl Fixture {
    pub(crate) async fn new(namespaces: Vec<&str>) -> Self {
        Self::with_config(namespaces, |_| {}).await
    }

    pub(crate) async fn with_config(
        namespaces: Vec<&str>,
        adjust: impl FnOnce(&mut StorageConfig),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(
            RedbMetaStore::open(dir.path().join("meta.redb"), clock.clone()).unwrap(),
        );
        let coord = Arc::new(InProcessCoordinator::new());
        let objects = Arc::new(MemoryStoreFactory::new());

        let mut config = StorageConfig {
            namespaces: namespaces
                .into_iter()
                .map(Self::namespace_config)
                .collect(),
            ..StorageConfig::default()
        };
        adjust(&mut config);

        let engine = StorageEngine::new(
            EngineDeps {
                blobs: store.clone(),
                refs: store.clone(),
                stats: store.clone(),
                state: store.clone(),
                queue: coord.clone(),
                sweep_lock: coord.clone(),
                objects: objects.clone(),
                clock: clock.clone(),
            },
            config,
            TickerConfig::default(),
        );

        Self {
            engine,
            store,
            coord,
            objects,
            clock,
            _dir: dir,
        }
    }

    /// Namespace config used by tests: aliases on, sweep due as soon as
    /// the clock moves past the last sweep time.
    pub(crate) fn namespace_config(name: &str) -> NamespaceConfig {
        NamespaceConfig {
            id: ns(name),
            root: PathBuf::from("/unused-by-memory-backend"),
            prefix: None,
            enable_aliases: true,
            gc_frequency_hrs: 0.0,
        }
    }
}
