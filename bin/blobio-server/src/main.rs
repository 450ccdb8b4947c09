//! BlobIO Storage Server
//!
//! Runs the storage engine and its background tickers (blob admission, ref
//! expiry, GC, stats, length backfill) against an embedded metadata store
//! and local-disk byte stores.

use anyhow::{Context, Result};
use blobio_common::config::ServerConfig;
use blobio_common::{Clock, SystemClock};
use blobio_coord::InProcessCoordinator;
use blobio_engine::{EngineDeps, StorageEngine};
use blobio_meta_store::RedbMetaStore;
use blobio_object_store::LocalStoreFactory;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blobio-server")]
#[command(about = "BlobIO Storage Server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/blobio/server.toml")]
    config: PathBuf,

    /// Data directory override (metadata database location)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match std::fs::read_to_string(&args.config) {
        Ok(contents) => toml::from_str(&contents)
            .with_context(|| format!("invalid configuration in {}", args.config.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Configuration file {} not found; using defaults",
                args.config.display()
            );
            ServerConfig::default()
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed reading {}", args.config.display()));
        }
    };

    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BlobIO Storage Server");

    let config = load_config(&args)?;
    info!(
        "Serving {} namespace(s); metadata at {}",
        config.storage.namespaces.len(),
        config.data_dir.display()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let meta = Arc::new(
        RedbMetaStore::open(config.data_dir.join("meta.redb"), Arc::clone(&clock))
            .context("failed opening metadata store")?,
    );
    let coordinator = Arc::new(InProcessCoordinator::new());

    let engine = StorageEngine::new(
        EngineDeps {
            blobs: meta.clone(),
            refs: meta.clone(),
            stats: meta.clone(),
            state: meta.clone(),
            queue: coordinator.clone(),
            sweep_lock: coordinator,
            objects: Arc::new(LocalStoreFactory),
            clock,
        },
        config.storage,
        config.tickers,
    );

    let shutdown = CancellationToken::new();
    let tickers = engine.start(&shutdown);

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
    shutdown.cancel();
    for ticker in tickers {
        ticker.await.ok();
    }

    let metrics = engine.metrics();
    info!(
        "Storage Server shut down gracefully ({} blobs ingested, {} swept, {} refs expired, {} sweeps)",
        metrics.blobs_ingested, metrics.blobs_swept, metrics.refs_expired, metrics.sweeps_completed
    );

    Ok(())
}
