//! Adapter traits the engine is written against.
//!
//! Every operation here is a narrow, indexed access; nothing in the engine
//! is allowed to require a full collection scan.

use crate::records::{AliasEntry, BlobRecord, RefRecord, StatsSnapshot};
use async_trait::async_trait;
use blobio_common::{BlobId, NamespaceId, RefName, Result};
use chrono::{DateTime, Utc};

/// Blob metadata collection.
#[async_trait]
pub trait BlobCollection: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, id: BlobId) -> Result<Option<BlobRecord>>;

    /// Point lookup by `(namespace, path)`.
    async fn find_by_path(&self, namespace: &NamespaceId, path: &str) -> Result<Option<BlobRecord>>;

    /// Resolve a batch of paths to their ids. Unknown paths are omitted.
    async fn find_paths(
        &self,
        namespace: &NamespaceId,
        paths: &[&str],
    ) -> Result<Vec<(String, BlobId)>>;

    /// Insert `shadow = true` placeholders for every path not yet present.
    /// Paths that already exist (in any state) are left untouched.
    async fn insert_shadows(&self, namespace: &NamespaceId, paths: &[&str]) -> Result<()>;

    /// Upsert keyed on `(namespace, path, shadow = true)`: promote a shadow
    /// record (clearing the flag and setting imports/aliases), insert a
    /// fresh non-shadow record if the path is unknown, or return the
    /// existing record unchanged if it was already promoted.
    async fn promote(
        &self,
        namespace: &NamespaceId,
        path: &str,
        imports: &[BlobId],
        aliases: &[AliasEntry],
    ) -> Result<BlobRecord>;

    /// Replace a blob's alias list iff its `update_index` still equals
    /// `expected_update_index`. Returns false on a conflict or if the
    /// record no longer exists; the caller re-reads and retries.
    async fn update_aliases(
        &self,
        id: BlobId,
        expected_update_index: u32,
        aliases: &[AliasEntry],
    ) -> Result<bool>;

    /// All records carrying an alias with the given name.
    async fn find_by_alias(&self, namespace: &NamespaceId, name: &str) -> Result<Vec<BlobRecord>>;

    /// Whether any record lists `id` in its imports. Point lookup against
    /// the reverse-import index.
    async fn is_imported(&self, id: BlobId) -> Result<bool>;

    /// Records with `after < id < before`, ascending, bounded.
    async fn range(&self, after: BlobId, before: BlobId, limit: usize)
        -> Result<Vec<BlobRecord>>;

    /// Delete a record, returning it if it existed.
    async fn remove(&self, id: BlobId) -> Result<Option<BlobRecord>>;

    /// Stamp a record with a GC version instead of deleting it
    /// (verification mode). Returns the stamped record.
    async fn stamp_gc_version(&self, id: BlobId, gc_version: u32) -> Result<Option<BlobRecord>>;

    /// Backfill the byte length of a record.
    async fn set_length(&self, id: BlobId, length: u64) -> Result<()>;
}

/// Ref metadata collection.
#[async_trait]
pub trait RefCollection: Send + Sync {
    /// Point lookup by `(namespace, name)`.
    async fn find(&self, namespace: &NamespaceId, name: &RefName) -> Result<Option<RefRecord>>;

    /// Insert or replace by `(namespace, name)`, returning the replaced
    /// record if there was one.
    async fn upsert(&self, record: RefRecord) -> Result<Option<RefRecord>>;

    /// Delete by `(namespace, name)`, returning the deleted record.
    async fn remove(&self, namespace: &NamespaceId, name: &RefName) -> Result<Option<RefRecord>>;

    /// Delete only if the stored expiry still equals `expires_at` — a
    /// concurrent touch wins over a lazy expiry.
    async fn remove_if_expiry(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<RefRecord>>;

    /// Move a ref's expiry forward.
    async fn touch(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Refs whose expiry lies at or before `now`, via the expiry index.
    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RefRecord>>;

    /// Whether any ref targets the given blob. Point lookup against the
    /// target index.
    async fn has_target(&self, id: BlobId) -> Result<bool>;
}

/// Published statistics snapshots.
#[async_trait]
pub trait StatsCollection: Send + Sync {
    async fn insert(&self, snapshot: &StatsSnapshot) -> Result<()>;

    /// Snapshots within the time range, newest first, bounded.
    async fn find(
        &self,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<Vec<StatsSnapshot>>;
}
