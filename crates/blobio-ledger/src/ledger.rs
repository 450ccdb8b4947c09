//! Blob existence records and reachability edges.

use crate::CURRENT_GC_VERSION;
use blobio_common::{BlobId, Error, Locator, NamespaceId, Result};
use blobio_meta_store::{AliasEntry, BlobCollection, BlobRecord, RefCollection};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns blob metadata records: existence, import edges and aliases.
#[derive(Clone)]
pub struct BlobLedger {
    blobs: Arc<dyn BlobCollection>,
    refs: Arc<dyn RefCollection>,
}

impl BlobLedger {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobCollection>, refs: Arc<dyn RefCollection>) -> Self {
        Self { blobs, refs }
    }

    pub(crate) fn blobs(&self) -> &dyn BlobCollection {
        self.blobs.as_ref()
    }

    /// Record an uploaded blob: resolve its imports (creating shadow
    /// records for any not yet uploaded) and upsert the record, clearing
    /// the shadow flag.
    ///
    /// Idempotent under retried uploads: a second identical call is a
    /// no-op promotion, never a duplicate.
    pub async fn add_blob(
        &self,
        namespace: &NamespaceId,
        locator: &Locator,
        imports: &[Locator],
        aliases: Vec<AliasEntry>,
    ) -> Result<BlobRecord> {
        let import_ids = self.find_or_add_shadow_blobs(namespace, imports).await?;
        let record = self
            .blobs
            .promote(namespace, locator.base(), &import_ids, &aliases)
            .await?;
        debug!(
            "Created blob {} at {} ({} imports)",
            record.id,
            record.path,
            imports.len()
        );
        Ok(record)
    }

    /// Resolve import locators to blob ids, inserting `shadow = true`
    /// placeholders for any not yet known. Preserves the caller's input
    /// order in the returned list.
    pub async fn find_or_add_shadow_blobs(
        &self,
        namespace: &NamespaceId,
        imports: &[Locator],
    ) -> Result<Vec<BlobId>> {
        if imports.is_empty() {
            return Ok(Vec::new());
        }

        let mut remaining: HashSet<&str> = imports.iter().map(Locator::base).collect();
        let mut resolved: HashMap<String, BlobId> = HashMap::with_capacity(remaining.len());

        loop {
            // Find the existing blobs, in batches of 100
            let pending: Vec<&str> = remaining.iter().copied().collect();
            for batch in pending.chunks(100) {
                for (path, id) in self.blobs.find_paths(namespace, batch).await? {
                    remaining.retain(|p| *p != path.as_str());
                    resolved.insert(path, id);
                }
            }

            if remaining.is_empty() {
                break;
            }

            // Insert shadow placeholders for the rest; losing an insert
            // race just means the next lookup pass finds the winner's id.
            let missing: Vec<&str> = remaining.iter().copied().collect();
            self.blobs.insert_shadows(namespace, &missing).await?;
        }

        imports
            .iter()
            .map(|import| {
                resolved.get(import.base()).copied().ok_or_else(|| {
                    Error::Metadata(format!(
                        "shadow resolution lost import '{}' in namespace {namespace}",
                        import.base()
                    ))
                })
            })
            .collect()
    }

    /// Point lookup by locator.
    pub async fn find_blob(
        &self,
        namespace: &NamespaceId,
        locator: &Locator,
    ) -> Result<Option<BlobRecord>> {
        self.blobs.find_by_path(namespace, locator.base()).await
    }

    /// Point lookup by id.
    pub async fn get_blob(&self, id: BlobId) -> Result<Option<BlobRecord>> {
        self.blobs.get(id).await
    }

    /// Whether the blob is the target of any ref, or listed in any other
    /// record's imports. Both checks are index point lookups.
    pub async fn is_referenced(&self, id: BlobId) -> Result<bool> {
        if self.blobs.is_imported(id).await? {
            return Ok(true);
        }
        if self.refs.has_target(id).await? {
            return Ok(true);
        }
        Ok(false)
    }

    /// Advisory read-side guard used when GC verification is enabled: logs
    /// when a read touches a record a verification sweep stamped as
    /// collectable. Never fails the read.
    pub async fn verify_not_collected(&self, namespace: &NamespaceId, locator: &Locator) {
        match self.blobs.find_by_path(namespace, locator.base()).await {
            Ok(Some(record)) if record.gc_version >= CURRENT_GC_VERSION => {
                warn!(
                    "Blob {} ({}) accessed after being garbage collected",
                    record.id, locator
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Exception checking if blob {namespace}:{locator} exists: {e}");
            }
        }
    }
}
