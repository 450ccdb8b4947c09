//! Blob admission: feeds newly created blobs into GC consideration once
//! their grace window has elapsed.
//!
//! The delay guards against collecting a blob before all of its sibling
//! uploads and imports from the same batch have landed; the id's embedded
//! timestamp turns "12 hours ago" into an id upper bound.

use crate::service::StorageEngine;
use blobio_common::{BlobId, NamespaceId, Result};
use blobio_coord::score_at;
use blobio_meta_store::BlobRecord;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

impl StorageEngine {
    /// Admission tick: scan records between the cursor and the grace-window
    /// boundary, pushing each onto its namespace's candidate queue.
    pub async fn tick_ingest(&self) -> Result<()> {
        let config = self.config();
        let now = self.inner.clock.now_utc();
        let boundary = BlobId::floor_at(
            now - chrono::Duration::from_std(config.gc.admission_delay())
                .unwrap_or_else(|_| chrono::Duration::zero()),
        );

        let mut gc_state = self.inner.gc_state.get().await?;
        let mut ingested = 0u64;
        loop {
            if gc_state.value.reset {
                info!("Resetting scan for new blobs...");
                gc_state = self
                    .inner
                    .gc_state
                    .update_with(|state| state.do_reset())
                    .await?;
            }

            let batch = self
                .inner
                .blobs
                .range(gc_state.value.last_admitted, boundary, 500)
                .await?;
            let Some(last) = batch.last().map(|record| record.id) else {
                break;
            };

            // Wait until there's some space in the queue
            let mut delay_secs = 1u64;
            while self
                .should_pause_admission(&batch, config.gc.backlog_limit)
                .await?
            {
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                delay_secs = (delay_secs * 2).min(128);
            }

            debug!(
                "Adding {} blobs for GC consideration ({} to {})",
                batch.len(),
                batch[0].id,
                last
            );
            let score = score_at(now);
            for record in &batch {
                if record.shadow {
                    warn!(
                        "Referenced blob {} {} was never uploaded.",
                        record.namespace, record.path
                    );
                }
                self.inner.queue.add(&record.namespace, record.id, score).await?;
            }

            gc_state = self
                .inner
                .gc_state
                .update_with(|state| state.last_admitted = last)
                .await?;
            ingested += batch.len() as u64;
            self.inner.metrics.add_ingested(batch.len() as u64);
        }

        info!(
            "Added {ingested} blobs for GC (boundary: {})",
            gc_state.value.last_admitted.timestamp()
        );
        Ok(())
    }

    /// Back-pressure check: pause admission while any namespace touched by
    /// the batch has more than `limit` queued candidates.
    pub(crate) async fn should_pause_admission(
        &self,
        batch: &[BlobRecord],
        limit: u64,
    ) -> Result<bool> {
        let mut pause = false;
        let namespaces: HashSet<&NamespaceId> =
            batch.iter().map(|record| &record.namespace).collect();
        for namespace in namespaces {
            let length = self.inner.queue.len(namespace).await?;
            if length > limit {
                info!(
                    "Length of GC queue for namespace {namespace} is {length}. Pausing addition of new items."
                );
                pause = true;
            }
        }
        Ok(pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, ns};
    use blobio_common::Clock;
    use blobio_common::Locator;
    use blobio_coord::CheckQueue;
    use blobio_meta_store::BlobCollection;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_ingest_respects_grace_window() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        handle
            .write_blob(Bytes::from_static(b"old"), &[], None)
            .await
            .unwrap();
        fixture.clock.advance(chrono::Duration::hours(13));
        handle
            .write_blob(Bytes::from_static(b"new"), &[], None)
            .await
            .unwrap();

        fixture.engine.tick_ingest().await.unwrap();

        // Only the blob past the 12h window was admitted
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 1);
        assert_eq!(fixture.engine.metrics().blobs_ingested, 1);

        // The young one follows once its window elapses
        fixture.clock.advance(chrono::Duration::hours(13));
        fixture.engine.tick_ingest().await.unwrap();
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_admits_unfulfilled_shadows() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        // B references A, which never gets uploaded
        handle
            .write_blob(
                Bytes::from_static(b"blob b"),
                &[Locator::new("pkg/never-uploaded")],
                None,
            )
            .await
            .unwrap();

        fixture.clock.advance(chrono::Duration::hours(13));
        fixture.engine.tick_ingest().await.unwrap();

        // Both the real record and the shadow promise are candidates
        assert_eq!(fixture.coord.len(&namespace).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_admission_pause_signal() {
        let fixture = Fixture::new(vec!["test"]).await;
        let namespace = ns("test");
        let handle = fixture.engine.namespace(&namespace).unwrap();

        handle
            .write_blob(Bytes::from_static(b"probe"), &[], None)
            .await
            .unwrap();
        let batch = fixture
            .store
            .range(
                blobio_common::BlobId::default(),
                blobio_common::BlobId::floor_at(
                    fixture.clock.now_utc() + chrono::Duration::hours(1),
                ),
                10,
            )
            .await
            .unwrap();

        assert!(
            !fixture
                .engine
                .should_pause_admission(&batch, 2)
                .await
                .unwrap()
        );

        for score in 0..4 {
            fixture
                .coord
                .add(
                    &namespace,
                    blobio_common::BlobId::from_uuid(uuid::Uuid::new_v4()),
                    score as f64,
                )
                .await
                .unwrap();
        }
        assert!(
            fixture
                .engine
                .should_pause_admission(&batch, 2)
                .await
                .unwrap()
        );
    }
}
