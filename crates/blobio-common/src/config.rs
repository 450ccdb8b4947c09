//! Configuration types for BlobIO
//!
//! This module defines configuration structures used across components.

use crate::types::NamespaceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the BlobIO server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Data directory for the metadata database
    pub data_dir: PathBuf,
    /// Storage configuration (hot-reloadable)
    pub storage: StorageConfig,
    /// Background ticker intervals
    pub tickers: TickerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/blobio"),
            storage: StorageConfig::default(),
            tickers: TickerConfig::default(),
        }
    }
}

/// Storage configuration: namespaces plus garbage-collection tuning.
///
/// This is the hot-reloadable part of the configuration; publishing a new
/// value cancels in-flight GC sweeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Configured namespaces
    pub namespaces: Vec<NamespaceConfig>,
    /// Delete unreferenced blobs
    pub enable_gc: bool,
    /// Stamp unreferenced blobs instead of deleting them (dry-run auditing)
    pub enable_gc_verification: bool,
    /// Garbage collection tuning
    pub gc: GcConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            enable_gc: true,
            enable_gc_verification: false,
            gc: GcConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Look up a namespace by id.
    #[must_use]
    pub fn namespace(&self, id: &NamespaceId) -> Option<&NamespaceConfig> {
        self.namespaces.iter().find(|ns| &ns.id == id)
    }
}

/// Configuration for a single namespace
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace identifier
    pub id: NamespaceId,
    /// Root directory of the namespace's byte store
    pub root: PathBuf,
    /// Optional key prefix inside the byte store
    #[serde(default)]
    pub prefix: Option<String>,
    /// Whether alias queries are enabled for this namespace
    #[serde(default)]
    pub enable_aliases: bool,
    /// How often to garbage collect this namespace, in hours
    #[serde(default = "default_gc_frequency_hrs")]
    pub gc_frequency_hrs: f64,
}

fn default_gc_frequency_hrs() -> f64 {
    24.0
}

impl NamespaceConfig {
    /// Sweep cadence as a duration.
    #[must_use]
    pub fn gc_frequency(&self) -> Duration {
        Duration::from_secs_f64(self.gc_frequency_hrs * 3600.0)
    }
}

/// Garbage collection tuning parameters.
///
/// The defaults are the values the system was tuned with; the correctness
/// argument (ids are creation-ordered and never recycled) holds for any
/// positive admission delay.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Grace window before a new blob is considered for collection, in hours
    pub admission_delay_hours: f64,
    /// TTL of the per-namespace sweep lock, in minutes
    pub lock_ttl_minutes: u64,
    /// Candidate-queue length above which admission pauses
    pub backlog_limit: u64,
    /// Concurrent reachability-check workers per sweep
    pub sweep_workers: usize,
    /// Candidates fetched from the front of the queue per poll
    pub sweep_batch: usize,
    /// Capacity of the producer/worker channel
    pub channel_capacity: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            admission_delay_hours: 12.0,
            lock_ttl_minutes: 20,
            backlog_limit: 50_000,
            sweep_workers: 8,
            sweep_batch: 1024,
            channel_capacity: 128,
        }
    }
}

impl GcConfig {
    /// Admission grace window as a duration.
    #[must_use]
    pub fn admission_delay(&self) -> Duration {
        Duration::from_secs_f64(self.admission_delay_hours * 3600.0)
    }

    /// Sweep lock TTL as a duration.
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_minutes * 60)
    }
}

/// Background ticker intervals, in seconds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Blob admission scan
    pub ingest_secs: u64,
    /// Ref expiry scan
    pub refs_secs: u64,
    /// Stats aggregation
    pub stats_secs: u64,
    /// GC scheduling
    pub gc_secs: u64,
    /// Blob length backfill
    pub lengths_secs: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            ingest_secs: 300,
            refs_secs: 300,
            stats_secs: 600,
            gc_secs: 300,
            lengths_secs: 300,
        }
    }
}

impl TickerConfig {
    #[must_use]
    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_secs)
    }

    #[must_use]
    pub fn refs_interval(&self) -> Duration {
        Duration::from_secs(self.refs_secs)
    }

    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_secs)
    }

    #[must_use]
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_secs)
    }

    #[must_use]
    pub fn lengths_interval(&self) -> Duration {
        Duration::from_secs(self.lengths_secs)
    }
}
