//! Alias index layered on the blob ledger.
//!
//! Aliases live inside the blob records they name; mutation is a
//! read-modify-write loop guarded by the record's `update_index`
//! compare-and-swap, so concurrent updates retry instead of blocking.

use crate::ledger::BlobLedger;
use blobio_common::{Locator, NamespaceId, Result};
use blobio_meta_store::AliasEntry;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Request to attach an alias to a blob.
#[derive(Clone, Debug)]
pub struct AddAliasRequest {
    pub name: String,
    /// Target locator; its fragment is stored alongside the alias
    pub target: Locator,
    pub rank: i32,
    pub data: Vec<u8>,
}

/// Request to detach an alias from a blob.
#[derive(Clone, Debug)]
pub struct RemoveAliasRequest {
    pub name: String,
    pub target: Locator,
}

/// One alias match, as returned by lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobAlias {
    /// Locator of the aliased blob, including the alias fragment
    pub target: Locator,
    pub rank: i32,
    pub data: Vec<u8>,
}

impl BlobLedger {
    /// Attach aliases to their target blobs. Entries replace any existing
    /// entry with the same `(name, fragment)`. Requests against unknown
    /// blobs are skipped.
    pub async fn add_aliases(
        &self,
        namespace: &NamespaceId,
        requests: &[AddAliasRequest],
    ) -> Result<()> {
        let mut groups: HashMap<&str, Vec<&AddAliasRequest>> = HashMap::new();
        for request in requests {
            groups.entry(request.target.base()).or_default().push(request);
        }

        for (path, group) in groups {
            loop {
                let Some(record) = self.blobs().find_by_path(namespace, path).await? else {
                    break;
                };

                // New entries first, then surviving current ones
                let mut aliases: Vec<AliasEntry> = group
                    .iter()
                    .map(|request| AliasEntry {
                        name: request.name.clone(),
                        fragment: request.target.fragment().to_string(),
                        rank: request.rank,
                        data: request.data.clone(),
                    })
                    .collect();
                let replaced: HashSet<(String, String)> = aliases
                    .iter()
                    .map(|a| (a.name.clone(), a.fragment.clone()))
                    .collect();
                for existing in &record.aliases {
                    if !replaced.contains(&(existing.name.clone(), existing.fragment.clone())) {
                        aliases.push(existing.clone());
                    }
                }

                if self
                    .blobs()
                    .update_aliases(record.id, record.update_index, &aliases)
                    .await?
                {
                    break;
                }
            }

            for request in group {
                debug!("Added alias {} to {}", request.name, request.target);
            }
        }
        Ok(())
    }

    /// Detach aliases from their target blobs. Removing an alias that does
    /// not exist is a no-op.
    pub async fn remove_aliases(
        &self,
        namespace: &NamespaceId,
        requests: &[RemoveAliasRequest],
    ) -> Result<()> {
        let mut groups: HashMap<&str, Vec<&RemoveAliasRequest>> = HashMap::new();
        for request in requests {
            groups.entry(request.target.base()).or_default().push(request);
        }

        for (path, group) in groups {
            loop {
                let Some(record) = self.blobs().find_by_path(namespace, path).await? else {
                    break;
                };
                if record.aliases.is_empty() {
                    break;
                }

                let removed: HashSet<(String, String)> = group
                    .iter()
                    .map(|request| {
                        (
                            request.name.clone(),
                            request.target.fragment().to_string(),
                        )
                    })
                    .collect();
                let aliases: Vec<AliasEntry> = record
                    .aliases
                    .iter()
                    .filter(|a| !removed.contains(&(a.name.clone(), a.fragment.clone())))
                    .cloned()
                    .collect();

                if self
                    .blobs()
                    .update_aliases(record.id, record.update_index, &aliases)
                    .await?
                {
                    break;
                }
            }

            for request in group {
                debug!("Removed alias {} from {}", request.name, request.target);
            }
        }
        Ok(())
    }

    /// All blobs carrying an alias with the given name, ordered by
    /// descending rank. Returns empty when nothing matches.
    pub async fn find_aliases(
        &self,
        namespace: &NamespaceId,
        name: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<BlobAlias>> {
        let records = self.blobs().find_by_alias(namespace, name).await?;

        let mut results = Vec::new();
        for record in &records {
            for alias in &record.aliases {
                if alias.name == name {
                    results.push(BlobAlias {
                        target: Locator::with_fragment(&record.path, &alias.fragment),
                        rank: alias.rank,
                        data: alias.data.clone(),
                    });
                }
            }
        }
        results.sort_by(|a, b| b.rank.cmp(&a.rank));
        if let Some(max) = max_results {
            results.truncate(max);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobio_common::SystemClock;
    use blobio_meta_store::RedbMetaStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ledger() -> (BlobLedger, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            RedbMetaStore::open(dir.path().join("meta.redb"), Arc::new(SystemClock)).unwrap(),
        );
        (BlobLedger::new(store.clone(), store), dir)
    }

    fn ns(name: &str) -> NamespaceId {
        NamespaceId::new_unchecked(name)
    }

    fn add(name: &str, target: &str, rank: i32) -> AddAliasRequest {
        AddAliasRequest {
            name: name.to_string(),
            target: Locator::new(target),
            rank,
            data: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_find_aliases_orders_by_rank() {
        let (ledger, _dir) = ledger();
        let namespace = ns("test");

        for path in ["pkg/a", "pkg/b"] {
            ledger
                .add_blob(&namespace, &Locator::new(path), &[], Vec::new())
                .await
                .unwrap();
        }
        ledger
            .add_aliases(
                &namespace,
                &[add("x", "pkg/a", 1), add("x", "pkg/b", 5), add("y", "pkg/a", 9)],
            )
            .await
            .unwrap();

        let matches = ledger.find_aliases(&namespace, "x", None).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].rank, 5);
        assert_eq!(matches[0].target.base(), "pkg/b");
        assert_eq!(matches[1].rank, 1);

        let limited = ledger.find_aliases(&namespace, "x", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].rank, 5);
    }

    #[tokio::test]
    async fn test_add_alias_replaces_same_name_and_fragment() {
        let (ledger, _dir) = ledger();
        let namespace = ns("test");

        ledger
            .add_blob(&namespace, &Locator::new("pkg/a"), &[], Vec::new())
            .await
            .unwrap();
        ledger
            .add_aliases(&namespace, &[add("tag", "pkg/a", 1)])
            .await
            .unwrap();
        ledger
            .add_aliases(&namespace, &[add("tag", "pkg/a", 7)])
            .await
            .unwrap();

        let matches = ledger.find_aliases(&namespace, "tag", None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rank, 7);
    }

    #[tokio::test]
    async fn test_remove_alias_twice_is_noop() {
        let (ledger, _dir) = ledger();
        let namespace = ns("test");

        ledger
            .add_blob(&namespace, &Locator::new("pkg/x"), &[], Vec::new())
            .await
            .unwrap();
        ledger
            .add_aliases(&namespace, &[add("tag", "pkg/x#v1", 1)])
            .await
            .unwrap();
        assert_eq!(
            ledger
                .find_aliases(&namespace, "tag", None)
                .await
                .unwrap()
                .len(),
            1
        );

        let remove = RemoveAliasRequest {
            name: "tag".to_string(),
            target: Locator::new("pkg/x#v1"),
        };
        ledger
            .remove_aliases(&namespace, std::slice::from_ref(&remove))
            .await
            .unwrap();
        assert!(
            ledger
                .find_aliases(&namespace, "tag", None)
                .await
                .unwrap()
                .is_empty()
        );

        // Second identical removal: no error, still empty
        ledger
            .remove_aliases(&namespace, &[remove])
            .await
            .unwrap();
        assert!(
            ledger
                .find_aliases(&namespace, "tag", None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_alias_on_unknown_blob_is_skipped() {
        let (ledger, _dir) = ledger();
        let namespace = ns("test");

        ledger
            .add_aliases(&namespace, &[add("tag", "pkg/ghost", 1)])
            .await
            .unwrap();
        assert!(
            ledger
                .find_aliases(&namespace, "tag", None)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
