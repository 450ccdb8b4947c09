//! redb table definitions.
//!
//! Primary tables hold bincode-encoded records; the remaining tables are
//! secondary indexes maintained in the same write transaction as the
//! record they index. Composite string keys join components with NUL.

use redb::TableDefinition;

/// Blob records: id (16 bytes, creation-ordered) -> bincode `BlobRecord`
pub const BLOBS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blobs");

/// Unique path index: "ns\0path" -> id (16 bytes)
pub const BLOB_PATHS: TableDefinition<&str, &[u8]> = TableDefinition::new("blob_paths");

/// Alias index: "ns\0alias\0id-hex" -> id (16 bytes)
pub const BLOB_ALIASES: TableDefinition<&str, &[u8]> = TableDefinition::new("blob_aliases");

/// Reverse import index: imported id (16 bytes) + importer id (16 bytes) -> ()
pub const BLOB_IMPORTS: TableDefinition<&[u8], ()> = TableDefinition::new("blob_imports");

/// Ref records: "ns\0name" -> bincode `RefRecord`
pub const REFS: TableDefinition<&str, &[u8]> = TableDefinition::new("refs");

/// Ref target index: target id (16 bytes) + "ns\0name" bytes -> ()
pub const REF_TARGETS: TableDefinition<&[u8], ()> = TableDefinition::new("ref_targets");

/// Sparse expiry index: expiry millis (8 bytes BE) + "ns\0name" bytes -> ()
pub const REF_EXPIRY: TableDefinition<&[u8], ()> = TableDefinition::new("ref_expiry");

/// Stats snapshots: snapshot time in epoch millis -> bincode `StatsSnapshot`
pub const STATS: TableDefinition<u64, &[u8]> = TableDefinition::new("stats");

/// Singleton documents: name -> revision (8 bytes BE) + bincode payload
pub const STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");
