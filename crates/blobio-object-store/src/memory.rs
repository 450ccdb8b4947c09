//! In-memory backend, used by tests and available as a volatile namespace
//! backend.

use crate::traits::{ObjectStore, ObjectStoreFactory, PrefixedObjectStore};
use crate::{ObjectKey, ObjectStoreError, ObjectStoreResult};
use async_trait::async_trait;
use blobio_common::NamespaceId;
use blobio_common::config::NamespaceConfig;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// Object store held entirely in process memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Bytes>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether an object exists under the key.
    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.contains_key(key.as_str())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn read(
        &self,
        key: &ObjectKey,
        offset: u64,
        length: Option<u64>,
    ) -> ObjectStoreResult<Bytes> {
        let data = self
            .objects
            .get(key.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.as_str().to_string()))?;

        let start = (offset as usize).min(data.len());
        let end = match length {
            Some(length) => start.saturating_add(length as usize).min(data.len()),
            None => data.len(),
        };
        Ok(data.slice(start..end))
    }

    async fn write(&self, key: &ObjectKey, data: Bytes) -> ObjectStoreResult<()> {
        self.objects.insert(key.as_str().to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> ObjectStoreResult<()> {
        self.objects.remove(key.as_str());
        Ok(())
    }

    async fn size(&self, key: &ObjectKey) -> ObjectStoreResult<u64> {
        self.objects
            .get(key.as_str())
            .map(|entry| entry.len() as u64)
            .ok_or_else(|| ObjectStoreError::NotFound(key.as_str().to_string()))
    }
}

/// Factory handing out one shared [`MemoryObjectStore`] per namespace, so
/// tests can inspect what the engine wrote and deleted.
#[derive(Default)]
pub struct MemoryStoreFactory {
    stores: DashMap<NamespaceId, Arc<MemoryObjectStore>>,
}

impl MemoryStoreFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing store for a namespace (created on first use).
    #[must_use]
    pub fn store(&self, namespace: &NamespaceId) -> Arc<MemoryObjectStore> {
        self.stores
            .entry(namespace.clone())
            .or_default()
            .clone()
    }
}

impl ObjectStoreFactory for MemoryStoreFactory {
    fn create(&self, config: &NamespaceConfig) -> ObjectStoreResult<Arc<dyn ObjectStore>> {
        let store: Arc<dyn ObjectStore> = self.store(&config.id);
        match &config.prefix {
            Some(prefix) if !prefix.is_empty() => {
                Ok(Arc::new(PrefixedObjectStore::new(prefix.clone(), store)))
            }
            _ => Ok(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ranged_reads() {
        let store = MemoryObjectStore::new();
        let key = ObjectKey::new("a.blob");
        store
            .write(&key, Bytes::from_static(b"0123456789"))
            .await
            .unwrap();

        assert_eq!(&store.read(&key, 2, Some(3)).await.unwrap()[..], b"234");
        assert_eq!(&store.read(&key, 8, Some(10)).await.unwrap()[..], b"89");
        assert_eq!(store.read(&key, 20, None).await.unwrap().len(), 0);
        assert_eq!(store.size(&key).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_prefix_wrapper_isolates_keys() {
        let inner = Arc::new(MemoryObjectStore::new());
        let prefixed = PrefixedObjectStore::new("tenant-a", inner.clone() as Arc<dyn ObjectStore>);
        let key = ObjectKey::new("x.blob");

        prefixed.write(&key, Bytes::from_static(b"data")).await.unwrap();
        assert!(inner.contains(&ObjectKey::new("tenant-a/x.blob")));
        assert!(!inner.contains(&key));
        assert_eq!(prefixed.size(&key).await.unwrap(), 4);
    }
}
