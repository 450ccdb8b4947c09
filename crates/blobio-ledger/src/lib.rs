//! Blob ledger for BlobIO
//!
//! Owns blob existence records and the reachability-graph edges between
//! them: shadow resolution for out-of-order uploads, idempotent promotion,
//! and the point reference-check the garbage collector relies on. The
//! alias index is layered on the same records.

pub mod aliases;
pub mod ledger;

pub use aliases::{AddAliasRequest, BlobAlias, RemoveAliasRequest};
pub use ledger::BlobLedger;

/// Version stamped onto records by verification-only GC sweeps. Bumped when
/// the sweep logic changes enough that old stamps stop being meaningful.
pub const CURRENT_GC_VERSION: u32 = 2;
