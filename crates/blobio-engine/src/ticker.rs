//! Long-lived background task loops.

use blobio_common::Result;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Spawn a named loop invoking `tick` on a fixed interval until the token
/// is cancelled. A failing tick is logged and the loop continues on the
/// next schedule; one bad batch must never stop a ticker permanently.
pub(crate) fn spawn_ticker<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => match tick().await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => info!("{name}: tick cancelled"),
                    Err(e) => error!("{name}: tick failed: {e}"),
                },
            }
        }
        debug!("{name}: stopped");
    })
}
