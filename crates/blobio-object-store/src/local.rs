//! Local filesystem backend.

use crate::traits::{ObjectStore, ObjectStoreFactory, PrefixedObjectStore};
use crate::{ObjectKey, ObjectStoreError, ObjectStoreResult};
use async_trait::async_trait;
use blobio_common::config::NamespaceConfig;
use bytes::Bytes;
use std::io::ErrorKind;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Object store rooted at a local directory. Keys map to relative file
/// paths below the root.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &ObjectKey) -> ObjectStoreResult<PathBuf> {
        let relative = Path::new(key.as_str());
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.as_str().is_empty() || !safe {
            return Err(ObjectStoreError::InvalidKey(key.as_str().to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn read(
        &self,
        key: &ObjectKey,
        offset: u64,
        length: Option<u64>,
    ) -> ObjectStoreResult<Bytes> {
        let path = self.resolve(key)?;
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.as_str().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(offset)).await?;
        let mut data = Vec::new();
        match length {
            Some(length) => {
                file.take(length).read_to_end(&mut data).await?;
            }
            None => {
                file.read_to_end(&mut data).await?;
            }
        }
        Ok(Bytes::from(data))
    }

    async fn write(&self, key: &ObjectKey, data: Bytes) -> ObjectStoreResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> ObjectStoreResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &ObjectKey) -> ObjectStoreResult<u64> {
        let path = self.resolve(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.as_str().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Factory building a [`LocalObjectStore`] per namespace, honoring the
/// configured key prefix.
#[derive(Default)]
pub struct LocalStoreFactory;

impl ObjectStoreFactory for LocalStoreFactory {
    fn create(&self, config: &NamespaceConfig) -> ObjectStoreResult<Arc<dyn ObjectStore>> {
        std::fs::create_dir_all(&config.root)?;
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.root));
        match &config.prefix {
            Some(prefix) if !prefix.is_empty() => {
                Ok(Arc::new(PrefixedObjectStore::new(prefix.clone(), store)))
            }
            _ => Ok(store),
        }
    }
}
