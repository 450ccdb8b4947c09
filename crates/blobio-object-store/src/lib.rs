//! Byte-blob object stores for BlobIO
//!
//! The engine tracks blob metadata; the bytes themselves live behind the
//! [`ObjectStore`] trait. Local-disk and in-memory backends are provided,
//! plus a key-prefix wrapper and a per-namespace factory.

pub mod local;
pub mod memory;
pub mod traits;

pub use local::{LocalObjectStore, LocalStoreFactory};
pub use memory::{MemoryObjectStore, MemoryStoreFactory};
pub use traits::{ObjectStore, ObjectStoreFactory, PrefixedObjectStore};

use blobio_common::Locator;
use std::fmt;
use thiserror::Error;

/// Key of a stored object within a backend.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The object key for a blob locator.
    #[must_use]
    pub fn for_locator(locator: &Locator) -> Self {
        Self(format!("{}.blob", locator.base()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

/// Error type for object store operations
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ObjectStoreError> for blobio_common::Error {
    fn from(e: ObjectStoreError) -> Self {
        blobio_common::Error::Backend(e.to_string())
    }
}

pub type ObjectStoreResult<T> = std::result::Result<T, ObjectStoreError>;
