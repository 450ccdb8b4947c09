//! In-process ref read cache.
//!
//! Entries hold the record (or its absence) together with when it was
//! cached; readers supply a freshness bound and anything older is
//! re-fetched. Negative entries are cached too, so repeated misses stay
//! cheap.

use blobio_common::{NamespaceId, RefName};
use blobio_meta_store::RefRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

/// Upper bound on how long any entry is served from cache.
const CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    value: Option<RefRecord>,
    cached_at: DateTime<Utc>,
}

/// Read cache keyed by `(namespace, name)`.
#[derive(Default)]
pub struct RefCache {
    entries: DashMap<(NamespaceId, RefName), CacheEntry>,
}

impl RefCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached value no older than the caller's bound (and the cache
    /// TTL). The outer `None` means "consult the store".
    pub fn get(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Option<Option<RefRecord>> {
        let key = (namespace.clone(), name.clone());
        let entry = self.entries.get(&key)?;
        let age = now - entry.cached_at;

        let ttl = chrono::Duration::from_std(CACHE_TTL).unwrap();
        if age > ttl {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }

        // The entry survives the cache TTL, but this caller may demand
        // fresher data than we have
        let bound = max_age.map_or(ttl, |bound| {
            chrono::Duration::from_std(bound.min(CACHE_TTL))
                .unwrap_or_else(|_| chrono::Duration::zero())
        });
        if age > bound {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Record the latest known value (or absence) of a ref.
    pub fn insert(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        value: Option<RefRecord>,
        now: DateTime<Utc>,
    ) {
        self.entries.insert(
            (namespace.clone(), name.clone()),
            CacheEntry {
                value,
                cached_at: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobio_common::{BlobId, Digest, Locator};

    fn record(namespace: &NamespaceId, name: &RefName) -> RefRecord {
        RefRecord {
            namespace: namespace.clone(),
            name: name.clone(),
            hash: Digest::ZERO,
            target: Locator::new("pkg/a"),
            target_blob_id: BlobId::default(),
            expires_at: None,
            lifetime: None,
        }
    }

    #[test]
    fn test_cache_freshness_bound() {
        let cache = RefCache::new();
        let namespace = NamespaceId::new_unchecked("ns");
        let name = RefName::new_unchecked("head");
        let now = Utc::now();

        cache.insert(&namespace, &name, Some(record(&namespace, &name)), now);

        // Fresh enough for the default bound
        let later = now + chrono::Duration::seconds(60);
        assert!(cache.get(&namespace, &name, later, None).is_some());

        // Caller demands fresher data than we have
        assert!(
            cache
                .get(&namespace, &name, later, Some(Duration::from_secs(30)))
                .is_none()
        );

        // Past the cache TTL the entry is dropped entirely
        let much_later = now + chrono::Duration::seconds(600);
        assert!(cache.get(&namespace, &name, much_later, None).is_none());
    }

    #[test]
    fn test_cache_negative_entries() {
        let cache = RefCache::new();
        let namespace = NamespaceId::new_unchecked("ns");
        let name = RefName::new_unchecked("gone");
        let now = Utc::now();

        cache.insert(&namespace, &name, None, now);
        assert!(matches!(cache.get(&namespace, &name, now, None), Some(None)));
    }
}
