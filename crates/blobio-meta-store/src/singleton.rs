//! Versioned singleton documents.
//!
//! Process-wide cursors (admission, stats, length scan) are stored as small
//! named documents with a revision counter. Updates are compare-and-swap on
//! the revision; `update_with` retries until the swap lands.

use async_trait::async_trait;
use blobio_common::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Raw storage for singleton documents: `(revision, payload)` per key.
/// Revision 0 means the document does not exist yet.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<(u64, Vec<u8>)>>;

    /// Store the payload iff the current revision equals
    /// `expected_revision`; the stored revision becomes
    /// `expected_revision + 1`. Returns false on a mismatch.
    async fn store(&self, key: &str, expected_revision: u64, payload: &[u8]) -> Result<bool>;
}

/// A value read from a singleton document, carrying its revision.
#[derive(Clone, Debug)]
pub struct Versioned<T> {
    pub value: T,
    revision: u64,
}

impl<T> Versioned<T> {
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Typed access to one singleton document.
pub struct Singleton<T> {
    store: Arc<dyn StateStore>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Singleton<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key,
            _marker: PhantomData,
        }
    }
}

impl<T> Singleton<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            _marker: PhantomData,
        }
    }

    /// Read the current value, or the default if never written.
    pub async fn get(&self) -> Result<Versioned<T>> {
        match self.store.load(self.key).await? {
            Some((revision, payload)) => {
                let value = bincode::deserialize(&payload)
                    .map_err(|e| Error::Metadata(format!("singleton '{}': {e}", self.key)))?;
                Ok(Versioned { value, revision })
            }
            None => Ok(Versioned {
                value: T::default(),
                revision: 0,
            }),
        }
    }

    /// Try to write back a value read earlier. On success the revision in
    /// `current` is advanced so further updates can continue from it.
    pub async fn try_update(&self, current: &mut Versioned<T>) -> Result<bool> {
        let payload = bincode::serialize(&current.value)
            .map_err(|e| Error::Metadata(format!("singleton '{}': {e}", self.key)))?;
        if self.store.store(self.key, current.revision, &payload).await? {
            current.revision += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Read-modify-write loop: applies `f` and retries until the CAS lands.
    pub async fn update_with<F>(&self, mut f: F) -> Result<Versioned<T>>
    where
        F: FnMut(&mut T) + Send,
    {
        loop {
            let mut current = self.get().await?;
            f(&mut current.value);
            if self.try_update(&mut current).await? {
                return Ok(current);
            }
        }
    }
}
