//! Persistent metadata store backed by redb.
//!
//! Provides the blob/ref/stats/state collections over a single embedded
//! database. Every secondary index is maintained in the same write
//! transaction as the record it indexes, so compare-and-swap semantics
//! fall out of redb's exclusive write transactions.

use crate::records::{AliasEntry, BlobRecord, RefRecord, StatsSnapshot};
use crate::singleton::StateStore;
use crate::tables;
use crate::traits::{BlobCollection, RefCollection, StatsCollection};
use async_trait::async_trait;
use blobio_common::{BlobId, Clock, NamespaceId, RefName, Result};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;
use uuid::timestamp::Timestamp;
use uuid::timestamp::context::ContextV7;

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt index entry: {0}")]
    Corrupt(String),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<MetaStoreError> for blobio_common::Error {
    fn from(e: MetaStoreError) -> Self {
        blobio_common::Error::Metadata(e.to_string())
    }
}

type StoreResult<T> = std::result::Result<T, MetaStoreError>;

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn path_key(namespace: &NamespaceId, path: &str) -> String {
    format!("{}\0{}", namespace.as_str(), path)
}

fn alias_prefix(namespace: &NamespaceId, name: &str) -> String {
    format!("{}\0{}\0", namespace.as_str(), name)
}

fn alias_key(namespace: &NamespaceId, name: &str, id: BlobId) -> String {
    format!(
        "{}{}",
        alias_prefix(namespace, name),
        hex::encode(id.as_bytes())
    )
}

fn import_key(imported: BlobId, importer: BlobId) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(imported.as_bytes());
    key[16..].copy_from_slice(importer.as_bytes());
    key
}

fn ref_key(namespace: &NamespaceId, name: &RefName) -> String {
    format!("{}\0{}", namespace.as_str(), name.as_str())
}

fn target_key(id: BlobId, ref_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + ref_key.len());
    key.extend_from_slice(id.as_bytes());
    key.extend_from_slice(ref_key.as_bytes());
    key
}

fn expiry_key(expires_at: DateTime<Utc>, ref_key: &str) -> Vec<u8> {
    let millis = expires_at.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(8 + ref_key.len());
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(ref_key.as_bytes());
    key
}

/// Persistent metadata store backed by redb.
///
/// Blob ids are allocated here, through one UUIDv7 context per store
/// instance, so insertion order matches id order.
pub struct RedbMetaStore {
    db: Database,
    clock: Arc<dyn Clock>,
    id_context: Mutex<ContextV7>,
}

impl RedbMetaStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::BLOBS)?;
            let _t = write_txn.open_table(tables::BLOB_PATHS)?;
            let _t = write_txn.open_table(tables::BLOB_ALIASES)?;
            let _t = write_txn.open_table(tables::BLOB_IMPORTS)?;
            let _t = write_txn.open_table(tables::REFS)?;
            let _t = write_txn.open_table(tables::REF_TARGETS)?;
            let _t = write_txn.open_table(tables::REF_EXPIRY)?;
            let _t = write_txn.open_table(tables::STATS)?;
            let _t = write_txn.open_table(tables::STATE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            clock,
            id_context: Mutex::new(ContextV7::new()),
        })
    }

    fn next_id(&self) -> BlobId {
        let now = self.clock.now_utc();
        let id_context = self.id_context.lock().unwrap();
        let ts = Timestamp::from_unix(
            &*id_context,
            now.timestamp().max(0) as u64,
            now.timestamp_subsec_nanos(),
        );
        BlobId::from_uuid(Uuid::new_v7(ts))
    }

    // ---- Blobs ----

    fn get_blob_inner(&self, id: BlobId) -> StoreResult<Option<BlobRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::BLOBS)?;
        match table.get(id.as_bytes().as_slice())? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_path_inner(
        &self,
        namespace: &NamespaceId,
        path: &str,
    ) -> StoreResult<Option<BlobRecord>> {
        let read_txn = self.db.begin_read()?;
        let paths = read_txn.open_table(tables::BLOB_PATHS)?;
        let Some(id_guard) = paths.get(path_key(namespace, path).as_str())? else {
            return Ok(None);
        };
        let id_bytes = id_guard.value().to_vec();
        drop(id_guard);

        let blobs = read_txn.open_table(tables::BLOBS)?;
        match blobs.get(id_bytes.as_slice())? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Err(MetaStoreError::Corrupt(format!(
                "path index points at missing blob record ({namespace}:{path})"
            ))),
        }
    }

    fn find_paths_inner(
        &self,
        namespace: &NamespaceId,
        paths: &[&str],
    ) -> StoreResult<Vec<(String, BlobId)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::BLOB_PATHS)?;
        let mut result = Vec::new();
        for path in paths {
            if let Some(guard) = table.get(path_key(namespace, path).as_str())? {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(guard.value());
                result.push(((*path).to_string(), BlobId::from_bytes(bytes)));
            }
        }
        Ok(result)
    }

    fn insert_shadows_inner(&self, namespace: &NamespaceId, paths: &[&str]) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut blobs = write_txn.open_table(tables::BLOBS)?;
            let mut path_index = write_txn.open_table(tables::BLOB_PATHS)?;
            for path in paths {
                let key = path_key(namespace, path);
                if path_index.get(key.as_str())?.is_some() {
                    continue;
                }
                let record = BlobRecord {
                    id: self.next_id(),
                    namespace: namespace.clone(),
                    path: (*path).to_string(),
                    imports: Vec::new(),
                    aliases: Vec::new(),
                    shadow: true,
                    gc_version: 0,
                    length: 0,
                    update_index: 0,
                };
                blobs.insert(record.id.as_bytes().as_slice(), encode(&record)?.as_slice())?;
                path_index.insert(key.as_str(), record.id.as_bytes().as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn promote_inner(
        &self,
        namespace: &NamespaceId,
        path: &str,
        imports: &[BlobId],
        aliases: &[AliasEntry],
    ) -> StoreResult<BlobRecord> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut blobs = write_txn.open_table(tables::BLOBS)?;
            let mut path_index = write_txn.open_table(tables::BLOB_PATHS)?;
            let mut alias_index = write_txn.open_table(tables::BLOB_ALIASES)?;
            let mut import_index = write_txn.open_table(tables::BLOB_IMPORTS)?;

            let key = path_key(namespace, path);
            let existing_id = path_index.get(key.as_str())?.map(|g| {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(g.value());
                BlobId::from_bytes(bytes)
            });

            match existing_id {
                Some(id) => {
                    let encoded = blobs
                        .get(id.as_bytes().as_slice())?
                        .map(|g| g.value().to_vec())
                        .ok_or_else(|| {
                            MetaStoreError::Corrupt(format!(
                                "path index points at missing blob record ({namespace}:{path})"
                            ))
                        })?;
                    let mut record: BlobRecord = decode(&encoded)?;
                    if record.shadow {
                        record.shadow = false;
                        record.imports = imports.to_vec();
                        for import in imports {
                            import_index.insert(import_key(*import, id).as_slice(), ())?;
                        }
                        if !aliases.is_empty() {
                            for alias in &record.aliases {
                                alias_index
                                    .remove(alias_key(namespace, &alias.name, id).as_str())?;
                            }
                            record.aliases = aliases.to_vec();
                            for alias in aliases {
                                alias_index.insert(
                                    alias_key(namespace, &alias.name, id).as_str(),
                                    id.as_bytes().as_slice(),
                                )?;
                            }
                        }
                        blobs.insert(id.as_bytes().as_slice(), encode(&record)?.as_slice())?;
                    }
                    record
                }
                None => {
                    let id = self.next_id();
                    let record = BlobRecord {
                        id,
                        namespace: namespace.clone(),
                        path: path.to_string(),
                        imports: imports.to_vec(),
                        aliases: aliases.to_vec(),
                        shadow: false,
                        gc_version: 0,
                        length: 0,
                        update_index: 0,
                    };
                    blobs.insert(id.as_bytes().as_slice(), encode(&record)?.as_slice())?;
                    path_index.insert(key.as_str(), id.as_bytes().as_slice())?;
                    for import in imports {
                        import_index.insert(import_key(*import, id).as_slice(), ())?;
                    }
                    for alias in aliases {
                        alias_index.insert(
                            alias_key(namespace, &alias.name, id).as_str(),
                            id.as_bytes().as_slice(),
                        )?;
                    }
                    record
                }
            }
        };
        write_txn.commit()?;
        Ok(record)
    }

    fn update_aliases_inner(
        &self,
        id: BlobId,
        expected_update_index: u32,
        aliases: &[AliasEntry],
    ) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut blobs = write_txn.open_table(tables::BLOBS)?;
            let mut alias_index = write_txn.open_table(tables::BLOB_ALIASES)?;

            let Some(encoded) = blobs
                .get(id.as_bytes().as_slice())?
                .map(|g| g.value().to_vec())
            else {
                return Ok(false);
            };
            let mut record: BlobRecord = decode(&encoded)?;
            if record.update_index != expected_update_index {
                false
            } else {
                for alias in &record.aliases {
                    alias_index.remove(alias_key(&record.namespace, &alias.name, id).as_str())?;
                }
                for alias in aliases {
                    alias_index.insert(
                        alias_key(&record.namespace, &alias.name, id).as_str(),
                        id.as_bytes().as_slice(),
                    )?;
                }
                record.aliases = aliases.to_vec();
                record.update_index += 1;
                blobs.insert(id.as_bytes().as_slice(), encode(&record)?.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    fn find_by_alias_inner(
        &self,
        namespace: &NamespaceId,
        name: &str,
    ) -> StoreResult<Vec<BlobRecord>> {
        let read_txn = self.db.begin_read()?;
        let alias_index = read_txn.open_table(tables::BLOB_ALIASES)?;

        let prefix = alias_prefix(namespace, name);
        let mut ids = Vec::new();
        for entry in alias_index.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(value.value());
            ids.push(BlobId::from_bytes(bytes));
        }

        let blobs = read_txn.open_table(tables::BLOBS)?;
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(guard) = blobs.get(id.as_bytes().as_slice())? {
                result.push(decode(guard.value())?);
            }
        }
        Ok(result)
    }

    fn is_imported_inner(&self, id: BlobId) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let import_index = read_txn.open_table(tables::BLOB_IMPORTS)?;
        let prefix = id.as_bytes().as_slice();
        match import_index.range(prefix..)?.next() {
            Some(entry) => Ok(entry?.0.value().starts_with(prefix)),
            None => Ok(false),
        }
    }

    fn range_inner(
        &self,
        after: BlobId,
        before: BlobId,
        limit: usize,
    ) -> StoreResult<Vec<BlobRecord>> {
        let read_txn = self.db.begin_read()?;
        let blobs = read_txn.open_table(tables::BLOBS)?;
        let bounds = (
            Bound::Excluded(after.as_bytes().as_slice()),
            Bound::Excluded(before.as_bytes().as_slice()),
        );
        let mut result = Vec::new();
        for entry in blobs.range::<&[u8]>(bounds)? {
            if result.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            result.push(decode(value.value())?);
        }
        Ok(result)
    }

    fn remove_blob_inner(&self, id: BlobId) -> StoreResult<Option<BlobRecord>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut blobs = write_txn.open_table(tables::BLOBS)?;
            let mut path_index = write_txn.open_table(tables::BLOB_PATHS)?;
            let mut alias_index = write_txn.open_table(tables::BLOB_ALIASES)?;
            let mut import_index = write_txn.open_table(tables::BLOB_IMPORTS)?;

            let Some(encoded) = blobs
                .remove(id.as_bytes().as_slice())?
                .map(|g| g.value().to_vec())
            else {
                return Ok(None);
            };
            let record: BlobRecord = decode(&encoded)?;
            path_index.remove(path_key(&record.namespace, &record.path).as_str())?;
            for alias in &record.aliases {
                alias_index.remove(alias_key(&record.namespace, &alias.name, id).as_str())?;
            }
            for import in &record.imports {
                import_index.remove(import_key(*import, id).as_slice())?;
            }
            record
        };
        write_txn.commit()?;
        Ok(Some(removed))
    }

    fn stamp_gc_version_inner(
        &self,
        id: BlobId,
        gc_version: u32,
    ) -> StoreResult<Option<BlobRecord>> {
        let write_txn = self.db.begin_write()?;
        let stamped = {
            let mut blobs = write_txn.open_table(tables::BLOBS)?;
            let Some(encoded) = blobs
                .get(id.as_bytes().as_slice())?
                .map(|g| g.value().to_vec())
            else {
                return Ok(None);
            };
            let mut record: BlobRecord = decode(&encoded)?;
            record.gc_version = gc_version;
            blobs.insert(id.as_bytes().as_slice(), encode(&record)?.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(Some(stamped))
    }

    fn set_length_inner(&self, id: BlobId, length: u64) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut blobs = write_txn.open_table(tables::BLOBS)?;
            let Some(encoded) = blobs
                .get(id.as_bytes().as_slice())?
                .map(|g| g.value().to_vec())
            else {
                return Ok(());
            };
            let mut record: BlobRecord = decode(&encoded)?;
            record.length = length;
            blobs.insert(id.as_bytes().as_slice(), encode(&record)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ---- Refs ----

    fn find_ref_inner(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
    ) -> StoreResult<Option<RefRecord>> {
        let read_txn = self.db.begin_read()?;
        let refs = read_txn.open_table(tables::REFS)?;
        match refs.get(ref_key(namespace, name).as_str())? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn upsert_ref_inner(&self, record: &RefRecord) -> StoreResult<Option<RefRecord>> {
        let write_txn = self.db.begin_write()?;
        let old = {
            let mut refs = write_txn.open_table(tables::REFS)?;
            let mut targets = write_txn.open_table(tables::REF_TARGETS)?;
            let mut expiry = write_txn.open_table(tables::REF_EXPIRY)?;

            let key = ref_key(&record.namespace, &record.name);
            let old = refs
                .insert(key.as_str(), encode(record)?.as_slice())?
                .map(|g| g.value().to_vec());
            let old: Option<RefRecord> = old.map(|bytes| decode(&bytes)).transpose()?;

            if let Some(old) = &old {
                targets.remove(target_key(old.target_blob_id, &key).as_slice())?;
                if let Some(expires_at) = old.expires_at {
                    expiry.remove(expiry_key(expires_at, &key).as_slice())?;
                }
            }
            targets.insert(target_key(record.target_blob_id, &key).as_slice(), ())?;
            if let Some(expires_at) = record.expires_at {
                expiry.insert(expiry_key(expires_at, &key).as_slice(), ())?;
            }
            old
        };
        write_txn.commit()?;
        Ok(old)
    }

    fn remove_ref_inner(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        only_if_expiry: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<RefRecord>> {
        let write_txn = self.db.begin_write()?;
        let old = {
            let mut refs = write_txn.open_table(tables::REFS)?;
            let mut targets = write_txn.open_table(tables::REF_TARGETS)?;
            let mut expiry = write_txn.open_table(tables::REF_EXPIRY)?;

            let key = ref_key(namespace, name);
            let Some(encoded) = refs.get(key.as_str())?.map(|g| g.value().to_vec()) else {
                return Ok(None);
            };
            let old: RefRecord = decode(&encoded)?;
            if let Some(expected) = only_if_expiry {
                if old.expires_at != Some(expected) {
                    return Ok(None);
                }
            }

            refs.remove(key.as_str())?;
            targets.remove(target_key(old.target_blob_id, &key).as_slice())?;
            if let Some(expires_at) = old.expires_at {
                expiry.remove(expiry_key(expires_at, &key).as_slice())?;
            }
            old
        };
        write_txn.commit()?;
        Ok(Some(old))
    }

    fn touch_ref_inner(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut refs = write_txn.open_table(tables::REFS)?;
            let mut expiry = write_txn.open_table(tables::REF_EXPIRY)?;

            let key = ref_key(namespace, name);
            let Some(encoded) = refs.get(key.as_str())?.map(|g| g.value().to_vec()) else {
                return Ok(());
            };
            let mut record: RefRecord = decode(&encoded)?;
            if let Some(old_expires) = record.expires_at {
                expiry.remove(expiry_key(old_expires, &key).as_slice())?;
            }
            record.expires_at = Some(expires_at);
            refs.insert(key.as_str(), encode(&record)?.as_slice())?;
            expiry.insert(expiry_key(expires_at, &key).as_slice(), ())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn find_expired_inner(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<RefRecord>> {
        let read_txn = self.db.begin_read()?;
        let expiry = read_txn.open_table(tables::REF_EXPIRY)?;

        let end_millis = (now.timestamp_millis().max(0) as u64) + 1;
        let end = end_millis.to_be_bytes();
        let mut keys = Vec::new();
        for entry in expiry.range::<&[u8]>((Bound::Unbounded, Bound::Excluded(end.as_slice())))? {
            if keys.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let raw = key.value();
            let text = std::str::from_utf8(&raw[8..])
                .map_err(|_| MetaStoreError::Corrupt("non-utf8 expiry index entry".into()))?;
            keys.push(text.to_string());
        }

        let refs = read_txn.open_table(tables::REFS)?;
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(guard) = refs.get(key.as_str())? {
                result.push(decode(guard.value())?);
            }
        }
        Ok(result)
    }

    fn has_target_inner(&self, id: BlobId) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let targets = read_txn.open_table(tables::REF_TARGETS)?;
        let prefix = id.as_bytes().as_slice();
        match targets.range(prefix..)?.next() {
            Some(entry) => Ok(entry?.0.value().starts_with(prefix)),
            None => Ok(false),
        }
    }

    // ---- Stats ----

    fn insert_stats_inner(&self, snapshot: &StatsSnapshot) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut stats = write_txn.open_table(tables::STATS)?;
            let millis = snapshot.time.timestamp_millis().max(0) as u64;
            stats.insert(millis, encode(snapshot)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn find_stats_inner(
        &self,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        count: usize,
    ) -> StoreResult<Vec<StatsSnapshot>> {
        let read_txn = self.db.begin_read()?;
        let stats = read_txn.open_table(tables::STATS)?;

        let lower = start.map_or(0, |t| t.timestamp_millis().max(0) as u64);
        let upper = finish.map_or(u64::MAX, |t| t.timestamp_millis().max(0) as u64);

        let mut result = Vec::new();
        for entry in stats.range(lower..=upper)?.rev() {
            if result.len() >= count {
                break;
            }
            let (_, value) = entry?;
            result.push(decode(value.value())?);
        }
        Ok(result)
    }

    // ---- Singleton state ----

    fn load_state_inner(&self, key: &str) -> StoreResult<Option<(u64, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let state = read_txn.open_table(tables::STATE)?;
        match state.get(key)? {
            Some(guard) => {
                let raw = guard.value();
                if raw.len() < 8 {
                    return Err(MetaStoreError::Corrupt(format!(
                        "state document '{key}' too short"
                    )));
                }
                let mut rev = [0u8; 8];
                rev.copy_from_slice(&raw[..8]);
                Ok(Some((u64::from_be_bytes(rev), raw[8..].to_vec())))
            }
            None => Ok(None),
        }
    }

    fn store_state_inner(
        &self,
        key: &str,
        expected_revision: u64,
        payload: &[u8],
    ) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let swapped = {
            let mut state = write_txn.open_table(tables::STATE)?;
            let current = state.get(key)?.map(|g| {
                let mut rev = [0u8; 8];
                rev.copy_from_slice(&g.value()[..8]);
                u64::from_be_bytes(rev)
            });
            if current.unwrap_or(0) != expected_revision {
                false
            } else {
                let mut value = Vec::with_capacity(8 + payload.len());
                value.extend_from_slice(&(expected_revision + 1).to_be_bytes());
                value.extend_from_slice(payload);
                state.insert(key, value.as_slice())?;
                true
            }
        };
        if swapped {
            write_txn.commit()?;
        }
        Ok(swapped)
    }
}

#[async_trait]
impl BlobCollection for RedbMetaStore {
    async fn get(&self, id: BlobId) -> Result<Option<BlobRecord>> {
        Ok(self.get_blob_inner(id)?)
    }

    async fn find_by_path(
        &self,
        namespace: &NamespaceId,
        path: &str,
    ) -> Result<Option<BlobRecord>> {
        Ok(self.find_by_path_inner(namespace, path)?)
    }

    async fn find_paths(
        &self,
        namespace: &NamespaceId,
        paths: &[&str],
    ) -> Result<Vec<(String, BlobId)>> {
        Ok(self.find_paths_inner(namespace, paths)?)
    }

    async fn insert_shadows(&self, namespace: &NamespaceId, paths: &[&str]) -> Result<()> {
        Ok(self.insert_shadows_inner(namespace, paths)?)
    }

    async fn promote(
        &self,
        namespace: &NamespaceId,
        path: &str,
        imports: &[BlobId],
        aliases: &[AliasEntry],
    ) -> Result<BlobRecord> {
        Ok(self.promote_inner(namespace, path, imports, aliases)?)
    }

    async fn update_aliases(
        &self,
        id: BlobId,
        expected_update_index: u32,
        aliases: &[AliasEntry],
    ) -> Result<bool> {
        Ok(self.update_aliases_inner(id, expected_update_index, aliases)?)
    }

    async fn find_by_alias(&self, namespace: &NamespaceId, name: &str) -> Result<Vec<BlobRecord>> {
        Ok(self.find_by_alias_inner(namespace, name)?)
    }

    async fn is_imported(&self, id: BlobId) -> Result<bool> {
        Ok(self.is_imported_inner(id)?)
    }

    async fn range(
        &self,
        after: BlobId,
        before: BlobId,
        limit: usize,
    ) -> Result<Vec<BlobRecord>> {
        Ok(self.range_inner(after, before, limit)?)
    }

    async fn remove(&self, id: BlobId) -> Result<Option<BlobRecord>> {
        Ok(self.remove_blob_inner(id)?)
    }

    async fn stamp_gc_version(&self, id: BlobId, gc_version: u32) -> Result<Option<BlobRecord>> {
        Ok(self.stamp_gc_version_inner(id, gc_version)?)
    }

    async fn set_length(&self, id: BlobId, length: u64) -> Result<()> {
        Ok(self.set_length_inner(id, length)?)
    }
}

#[async_trait]
impl RefCollection for RedbMetaStore {
    async fn find(&self, namespace: &NamespaceId, name: &RefName) -> Result<Option<RefRecord>> {
        Ok(self.find_ref_inner(namespace, name)?)
    }

    async fn upsert(&self, record: RefRecord) -> Result<Option<RefRecord>> {
        Ok(self.upsert_ref_inner(&record)?)
    }

    async fn remove(&self, namespace: &NamespaceId, name: &RefName) -> Result<Option<RefRecord>> {
        Ok(self.remove_ref_inner(namespace, name, None)?)
    }

    async fn remove_if_expiry(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<RefRecord>> {
        Ok(self.remove_ref_inner(namespace, name, Some(expires_at))?)
    }

    async fn touch(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self.touch_ref_inner(namespace, name, expires_at)?)
    }

    async fn find_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RefRecord>> {
        Ok(self.find_expired_inner(now, limit)?)
    }

    async fn has_target(&self, id: BlobId) -> Result<bool> {
        Ok(self.has_target_inner(id)?)
    }
}

#[async_trait]
impl StatsCollection for RedbMetaStore {
    async fn insert(&self, snapshot: &StatsSnapshot) -> Result<()> {
        Ok(self.insert_stats_inner(snapshot)?)
    }

    async fn find(
        &self,
        start: Option<DateTime<Utc>>,
        finish: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<Vec<StatsSnapshot>> {
        Ok(self.find_stats_inner(start, finish, count)?)
    }
}

#[async_trait]
impl StateStore for RedbMetaStore {
    async fn load(&self, key: &str) -> Result<Option<(u64, Vec<u8>)>> {
        Ok(self.load_state_inner(key)?)
    }

    async fn store(&self, key: &str, expected_revision: u64, payload: &[u8]) -> Result<bool> {
        Ok(self.store_state_inner(key, expected_revision, payload)?)
    }
}
