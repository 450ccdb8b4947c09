//! Metadata storage for BlobIO
//!
//! Defines the persisted record types (blobs, refs, stats snapshots, cursor
//! singletons), the adapter traits the engine is written against, and the
//! redb-backed implementation with its secondary-index tables.

pub mod records;
pub mod singleton;
pub mod store;
pub mod tables;
pub mod traits;

pub use records::{
    AliasEntry, BlobRecord, GC_STATE_KEY, GcNamespaceState, GcState, LENGTH_SCAN_STATE_KEY,
    LengthScanState, NamespaceStats, RefRecord, STATS_STATE_KEY, StatsSnapshot, StatsState,
};
pub use singleton::{Singleton, StateStore, Versioned};
pub use store::{MetaStoreError, RedbMetaStore};
pub use traits::{BlobCollection, RefCollection, StatsCollection};
