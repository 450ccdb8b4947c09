//! Persisted record types.

use blobio_common::{BlobId, Digest, Locator, NamespaceId, RefName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Singleton document key for [`GcState`].
pub const GC_STATE_KEY: &str = "gc-state";
/// Singleton document key for [`StatsState`].
pub const STATS_STATE_KEY: &str = "stats-state";
/// Singleton document key for [`LengthScanState`].
pub const LENGTH_SCAN_STATE_KEY: &str = "length-scan-state";

/// A secondary name attached to a blob.
///
/// Multiple aliases may share a name; queries return all of them ordered by
/// descending rank. The `(name, fragment)` pair is unique per blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub name: String,
    pub fragment: String,
    #[serde(default)]
    pub rank: i32,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl AliasEntry {
    /// The identity of this entry within a blob's alias list.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.fragment)
    }
}

/// Metadata record for one content-addressed blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobRecord {
    /// Creation-ordered id, never recycled
    pub id: BlobId,
    pub namespace: NamespaceId,
    /// Base locator, unique per namespace
    pub path: String,
    /// Ids of blobs this blob references
    #[serde(default)]
    pub imports: Vec<BlobId>,
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,
    /// The blob is referenced by something but has not been uploaded yet
    #[serde(default)]
    pub shadow: bool,
    /// Stamped instead of deleting when GC runs in verification mode
    #[serde(default)]
    pub gc_version: u32,
    /// Byte length, backfilled by the length scanner
    #[serde(default)]
    pub length: u64,
    /// Optimistic-concurrency counter for alias updates
    #[serde(default)]
    pub update_index: u32,
}

impl BlobRecord {
    #[must_use]
    pub fn locator(&self) -> Locator {
        Locator::new(self.path.clone())
    }
}

/// A named pointer to a blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefRecord {
    pub namespace: NamespaceId,
    /// Unique per namespace
    pub name: RefName,
    /// Caller-supplied digest, returned verbatim on read
    pub hash: Digest,
    /// Locator of the target, possibly with a fragment
    pub target: Locator,
    /// Id of the record backing the target's base locator
    pub target_blob_id: BlobId,
    /// When the ref stops resolving; `None` means it never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Sliding lifetime; `None` means a fixed deadline that is never extended
    #[serde(default)]
    pub lifetime: Option<Duration>,
}

impl RefRecord {
    #[must_use]
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether more than 3/4 of the lifetime has elapsed, so a read should
    /// extend the expiry by another full lifetime.
    #[must_use]
    pub fn requires_touch(&self, now: DateTime<Utc>) -> bool {
        match (self.expires_at, self.lifetime) {
            (Some(expires_at), Some(lifetime)) => {
                let quarter = chrono::Duration::from_std(lifetime / 4)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                now >= expires_at - quarter
            }
            _ => false,
        }
    }
}

/// Per-namespace blob count and total byte size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub count: u64,
    pub size: u64,
}

/// Immutable per-day statistics snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Time the stats apply to
    pub time: DateTime<Utc>,
    /// How long the scan took, in seconds
    pub scan_secs: i64,
    pub namespaces: HashMap<NamespaceId, NamespaceStats>,
}

/// Cursor singleton for blob admission and GC scheduling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GcState {
    /// Highest blob id already admitted to the candidate queues
    #[serde(default)]
    pub last_admitted: BlobId,
    #[serde(default)]
    pub namespaces: Vec<GcNamespaceState>,
    /// Operator flag: restart the admission scan from the beginning
    #[serde(default)]
    pub reset: bool,
}

impl GcState {
    pub fn do_reset(&mut self) {
        self.last_admitted = BlobId::default();
        self.reset = false;
    }

    pub fn find_or_add(&mut self, id: &NamespaceId, now: DateTime<Utc>) -> &mut GcNamespaceState {
        if let Some(pos) = self.namespaces.iter().position(|ns| &ns.id == id) {
            &mut self.namespaces[pos]
        } else {
            self.namespaces.push(GcNamespaceState {
                id: id.clone(),
                last_time: now,
            });
            self.namespaces.last_mut().unwrap()
        }
    }

    /// Reconcile the tracked namespace list with the configured one.
    pub fn sync_namespaces(&mut self, configured: &[NamespaceId], now: DateTime<Utc>) {
        self.namespaces.retain(|ns| configured.contains(&ns.id));
        for id in configured {
            if !self.namespaces.iter().any(|ns| &ns.id == id) {
                self.namespaces.push(GcNamespaceState {
                    id: id.clone(),
                    last_time: now,
                });
            }
        }
        self.namespaces.sort_by(|a, b| a.id.cmp(&b.id));
    }
}

/// GC bookkeeping for one namespace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcNamespaceState {
    pub id: NamespaceId,
    /// When the last completed sweep started
    pub last_time: DateTime<Utc>,
}

/// Cursor singleton for the statistics scan.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsState {
    /// Start of the current scan; `None` arms a fresh scan
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_id: BlobId,
    /// Accumulating per-namespace totals for the scan in progress
    #[serde(default)]
    pub namespaces: HashMap<NamespaceId, NamespaceStats>,
}

/// Cursor singleton for the length backfill scan.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LengthScanState {
    #[serde(default)]
    pub last_id: BlobId,
    /// Operator flag: restart the scan from the beginning
    #[serde(default)]
    pub reset: bool,
}

impl LengthScanState {
    pub fn do_reset(&mut self) {
        self.last_id = BlobId::default();
        self.reset = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ref_with_lifetime(created: DateTime<Utc>, lifetime: Duration) -> RefRecord {
        RefRecord {
            namespace: NamespaceId::new_unchecked("ns"),
            name: RefName::new_unchecked("head"),
            hash: Digest::ZERO,
            target: Locator::new("pkg/a"),
            target_blob_id: BlobId::default(),
            expires_at: Some(created + chrono::Duration::from_std(lifetime).unwrap()),
            lifetime: Some(lifetime),
        }
    }

    #[test]
    fn test_ref_touch_threshold() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let record = ref_with_lifetime(created, Duration::from_secs(100));

        // 50s in: less than 3/4 elapsed, no touch
        assert!(!record.requires_touch(created + chrono::Duration::seconds(50)));
        // 80s in: more than 3/4 elapsed, touch
        assert!(record.requires_touch(created + chrono::Duration::seconds(80)));
        // expired outright
        assert!(record.has_expired(created + chrono::Duration::seconds(100)));
        assert!(!record.has_expired(created + chrono::Duration::seconds(99)));
    }

    #[test]
    fn test_ref_without_lifetime_never_touches() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut record = ref_with_lifetime(created, Duration::from_secs(100));
        record.lifetime = None;

        assert!(!record.requires_touch(created + chrono::Duration::seconds(99)));
        assert!(record.has_expired(created + chrono::Duration::seconds(100)));
    }

    #[test]
    fn test_gc_state_sync_namespaces() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut state = GcState::default();
        let a = NamespaceId::new_unchecked("a");
        let b = NamespaceId::new_unchecked("b");

        state.sync_namespaces(&[b.clone(), a.clone()], now);
        assert_eq!(state.namespaces.len(), 2);
        assert_eq!(state.namespaces[0].id, a);

        state.sync_namespaces(&[b.clone()], now);
        assert_eq!(state.namespaces.len(), 1);
        assert_eq!(state.namespaces[0].id, b);
    }
}
