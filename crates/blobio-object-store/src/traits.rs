//! Object store trait surface.

use crate::{ObjectKey, ObjectStoreResult};
use async_trait::async_trait;
use blobio_common::config::NamespaceConfig;
use bytes::Bytes;
use std::sync::Arc;

/// A flat keyed store of immutable byte blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read part of an object. `length = None` reads to the end; reads past
    /// the end are truncated.
    async fn read(&self, key: &ObjectKey, offset: u64, length: Option<u64>)
        -> ObjectStoreResult<Bytes>;

    /// Write an object, replacing any existing data under the key.
    async fn write(&self, key: &ObjectKey, data: Bytes) -> ObjectStoreResult<()>;

    /// Delete an object. Deleting a missing object is a no-op.
    async fn delete(&self, key: &ObjectKey) -> ObjectStoreResult<()>;

    /// Size of an object in bytes.
    async fn size(&self, key: &ObjectKey) -> ObjectStoreResult<u64>;
}

/// Creates the byte store for a namespace from its configuration.
pub trait ObjectStoreFactory: Send + Sync {
    fn create(&self, config: &NamespaceConfig) -> ObjectStoreResult<Arc<dyn ObjectStore>>;
}

/// Wraps a store, prepending a fixed prefix to every key.
pub struct PrefixedObjectStore {
    prefix: String,
    inner: Arc<dyn ObjectStore>,
}

impl PrefixedObjectStore {
    #[must_use]
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn ObjectStore>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { prefix, inner }
    }

    fn prefixed(&self, key: &ObjectKey) -> ObjectKey {
        ObjectKey::new(format!("{}{}", self.prefix, key.as_str()))
    }
}

#[async_trait]
impl ObjectStore for PrefixedObjectStore {
    async fn read(
        &self,
        key: &ObjectKey,
        offset: u64,
        length: Option<u64>,
    ) -> ObjectStoreResult<Bytes> {
        self.inner.read(&self.prefixed(key), offset, length).await
    }

    async fn write(&self, key: &ObjectKey, data: Bytes) -> ObjectStoreResult<()> {
        self.inner.write(&self.prefixed(key), data).await
    }

    async fn delete(&self, key: &ObjectKey) -> ObjectStoreResult<()> {
        self.inner.delete(&self.prefixed(key)).await
    }

    async fn size(&self, key: &ObjectKey) -> ObjectStoreResult<u64> {
        self.inner.size(&self.prefixed(key)).await
    }
}
