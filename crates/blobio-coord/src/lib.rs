//! Coordination primitives for BlobIO
//!
//! The garbage collector coordinates through two structures keyed by
//! namespace: a score-ordered candidate queue of blob ids awaiting a
//! reachability recheck, and a TTL-bounded advisory lock that keeps sweeps
//! mutually exclusive per namespace. This crate defines the trait surface
//! and ships the in-process single-node provider.

pub mod memory;
pub mod traits;

pub use memory::InProcessCoordinator;
pub use traits::{CheckQueue, LockGuard, Score, SweepLock};

use chrono::{DateTime, Utc};

/// GC score for a point in time: whole minutes since the Unix epoch.
///
/// Scores only need to order candidates by when they were last (re)queued;
/// minute resolution keeps re-pushes of hot blobs cheap to coalesce.
#[must_use]
pub fn score_at(now: DateTime<Utc>) -> Score {
    (now.timestamp().max(0) / 60) as Score
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_score_is_minutes_since_epoch() {
        let t = Utc.with_ymd_and_hms(1970, 1, 1, 1, 0, 30).unwrap();
        assert_eq!(score_at(t), 60.0);
    }
}
