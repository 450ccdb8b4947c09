//! Error types for BlobIO
//!
//! This module defines the common error type used throughout the system.

use crate::types::{NamespaceId, NamespaceIdError, RefNameError};
use thiserror::Error;

/// Common result type for BlobIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for BlobIO
#[derive(Debug, Error)]
pub enum Error {
    // Client-facing errors
    #[error("namespace not found: {0}")]
    UnknownNamespace(NamespaceId),

    #[error("invalid/unknown blob '{path}' in namespace {namespace}")]
    UnknownBlob {
        namespace: NamespaceId,
        path: String,
    },

    #[error("invalid namespace id: {0}")]
    InvalidNamespaceId(#[from] NamespaceIdError),

    #[error("invalid ref name: {0}")]
    InvalidRefName(#[from] RefNameError),

    // Adapter errors
    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("coordination store error: {0}")]
    Coordination(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    // Background processing
    #[error("sweep lock unavailable for namespace {0}")]
    LockUnavailable(NamespaceId),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownNamespace(_) | Self::UnknownBlob { .. })
    }

    /// Check if this is a cooperative-shutdown error
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        let ns = NamespaceId::new_unchecked("test");
        assert!(Error::UnknownNamespace(ns.clone()).is_not_found());
        assert!(
            Error::UnknownBlob {
                namespace: ns,
                path: "p".into()
            }
            .is_not_found()
        );
        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn test_error_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Backend("io".into()).is_cancelled());
    }
}
