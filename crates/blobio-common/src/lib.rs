//! Common types for BlobIO
//!
//! This crate provides the foundational types used by all BlobIO components:
//! identifiers, error types, configuration structures and the clock seam.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GcConfig, NamespaceConfig, ServerConfig, StorageConfig, TickerConfig};
pub use error::{Error, Result};
pub use types::{BlobId, Digest, Locator, NamespaceId, RefName};
