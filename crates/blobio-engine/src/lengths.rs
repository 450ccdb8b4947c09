//! Length backfill: asks each namespace's byte store for object sizes and
//! writes them into the blob records, in a producer/worker pipeline like
//! the GC sweep's.

use crate::service::{EngineState, StorageEngine};
use blobio_common::{BlobId, Error, Result};
use blobio_meta_store::BlobRecord;
use blobio_object_store::{ObjectKey, ObjectStoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Blobs younger than this are skipped; their uploads may still be
/// completing through redirects.
const SCAN_DELAY: Duration = Duration::from_secs(30 * 60);

const WORKERS: usize = 8;

impl StorageEngine {
    /// Length-scan tick: stream records past the settle delay to a pool of
    /// workers that query the byte store and backfill `length`.
    pub async fn tick_lengths(&self, shutdown: &CancellationToken) -> Result<()> {
        let state = self.state();
        let token = shutdown.child_token();
        let (tx, rx) = flume::bounded::<BlobRecord>(1000);

        let producer = tokio::spawn({
            let engine = self.clone();
            let token = token.clone();
            async move { engine.produce_lengths(tx, &token).await }
        });
        let mut workers = Vec::new();
        for _ in 0..WORKERS {
            workers.push(tokio::spawn({
                let engine = self.clone();
                let state = Arc::clone(&state);
                let rx = rx.clone();
                let token = token.clone();
                async move {
                    loop {
                        let record = tokio::select! {
                            _ = token.cancelled() => return Err(Error::Cancelled),
                            received = rx.recv_async() => match received {
                                Ok(record) => record,
                                Err(_) => break,
                            },
                        };
                        engine.backfill_length(&state, &record).await?;
                    }
                    Ok(())
                }
            }));
        }
        drop(rx);

        let mut outcome: Result<()> = Ok(());
        for handle in std::iter::once(producer).chain(workers) {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
                Err(e) => {
                    if outcome.is_ok() {
                        outcome = Err(Error::Metadata(format!("length scan task panicked: {e}")));
                    }
                }
            }
        }
        outcome
    }

    async fn produce_lengths(
        &self,
        tx: flume::Sender<BlobRecord>,
        token: &CancellationToken,
    ) -> Result<()> {
        let boundary = BlobId::floor_at(
            self.inner.clock.now_utc()
                - chrono::Duration::from_std(SCAN_DELAY).unwrap_or_else(|_| chrono::Duration::zero()),
        );

        let mut scanned = 0u64;
        let mut state = self.inner.length_state.get().await?;
        loop {
            if state.value.reset {
                info!("Resetting scan for blob lengths...");
                state = self
                    .inner
                    .length_state
                    .update_with(|value| value.do_reset())
                    .await?;
            }

            let batch = self
                .inner
                .blobs
                .range(state.value.last_id, boundary, 2000)
                .await?;
            let Some(last) = batch.last().map(|record| record.id) else {
                break;
            };

            debug!("Finding length for {} blobs", batch.len());
            scanned += batch.len() as u64;
            for record in batch {
                tokio::select! {
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    sent = tx.send_async(record) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }

            // The cursor advances once the batch is handed off; a worker
            // failure loses at most this batch's lengths, not the scan.
            state.value.last_id = last;
            if !self.inner.length_state.try_update(&mut state).await? {
                state = self.inner.length_state.get().await?;
            }
        }

        info!("Added lengths for {scanned} blobs");
        Ok(())
    }

    async fn backfill_length(&self, state: &EngineState, record: &BlobRecord) -> Result<()> {
        let Some(namespace_state) = state.namespaces.get(&record.namespace) else {
            return Ok(());
        };

        let key = ObjectKey::for_locator(&record.locator());
        let length = match namespace_state.store.size(&key).await {
            Ok(length) => length,
            Err(ObjectStoreError::NotFound(_)) => {
                // Shadow promise or an upload that never completed; the GC
                // sweep reclaims it eventually
                debug!(
                    "No stored object for blob {} ({key}); skipping length",
                    record.id
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Length of blob {} ({key}): {length}", record.id);
        self.inner.blobs.set_length(record.id, length).await
    }
}
