//! Storage engine for BlobIO
//!
//! Ties the ledger, ref store, coordination queues and byte stores together
//! behind one facade, and runs the five background tickers: blob admission,
//! ref expiry, GC scheduling, stats aggregation and length backfill.

pub mod gc;
pub mod ingest;
pub mod lengths;
pub mod metrics;
pub mod service;
pub mod stats;
#[cfg(test)]
mod test_support;
mod ticker;

pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use service::{
    AddRefRequest, EngineDeps, NamespaceHandle, RefValue, RemoveRefRequest, StorageEngine,
    UpdateMetadataRequest,
};
