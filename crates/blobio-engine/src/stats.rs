//! Statistics aggregation: a cursor-driven scan over the id space that
//! publishes one immutable per-day snapshot of blob count and total size
//! per namespace.

use crate::service::StorageEngine;
use blobio_common::{BlobId, Result};
use blobio_meta_store::{StatsSnapshot, StatsState, Versioned};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

fn next_utc_midnight(after: DateTime<Utc>) -> DateTime<Utc> {
    (after.date_naive() + chrono::Days::new(1))
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

impl StorageEngine {
    /// Stats tick: advance the scan in bounded batches; once the cursor
    /// reaches the scan's start boundary, publish the snapshot and arm the
    /// next scan at the following UTC midnight.
    pub async fn tick_stats(&self) -> Result<()> {
        let mut carried: Option<Versioned<StatsState>> = None;
        loop {
            let mut current = match carried.take() {
                Some(state) => state,
                None => self.inner.stats_state.get().await?,
            };

            if current.value.start_time.is_none() {
                current.value.start_time = Some(self.inner.clock.now_utc());
                current.value.last_id = BlobId::default();
                current.value.namespaces.clear();
            }
            let start_time = current.value.start_time.unwrap();

            let now = self.inner.clock.now_utc();
            if now < start_time {
                debug!("Next stats update will begin at {start_time}");
                break;
            }

            // Only blobs created before the scan started count; later ones
            // belong to the next snapshot.
            let upper = BlobId::floor_at(start_time);
            let batch = self
                .inner
                .blobs
                .range(current.value.last_id, upper, 500)
                .await?;

            let Some(last) = batch.last().map(|record| record.id) else {
                info!("Publishing storage stats for {start_time}");
                let snapshot = StatsSnapshot {
                    time: start_time,
                    scan_secs: (now - start_time).num_seconds(),
                    namespaces: current.value.namespaces.clone(),
                };
                self.inner.stats_collection.insert(&snapshot).await?;

                current.value = StatsState {
                    start_time: Some(next_utc_midnight(start_time)),
                    last_id: BlobId::default(),
                    namespaces: Default::default(),
                };
                let _ = self.inner.stats_state.try_update(&mut current).await?;
                break;
            };

            debug!("Adding {} blobs for stats", batch.len());
            current.value.last_id = last;
            for record in &batch {
                let entry = current
                    .value
                    .namespaces
                    .entry(record.namespace.clone())
                    .or_default();
                entry.count += 1;
                entry.size += record.length;
            }

            if self.inner.stats_state.try_update(&mut current).await? {
                carried = Some(current);
            } else {
                info!("Unable to update stats; resetting scan.");
            }
        }
        Ok(())
    }
}
