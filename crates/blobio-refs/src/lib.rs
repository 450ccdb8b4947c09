//! Named refs for BlobIO
//!
//! Refs are the GC roots: named pointers to blobs with optional expiry and
//! sliding-lifetime touch semantics, fronted by an in-process read cache.
//! Every ref removal or replacement cascades a GC check for the old target.

pub mod cache;
pub mod store;

pub use cache::RefCache;
pub use store::{RefOptions, RefStore};
