//! # workflowd-storage
//!
//! Storage layer for workflowd.
//!
//! This crate provides:
//! - The versioned snapshot document (export and import)
//! - On-disk snapshot storage with checksums and retention

pub mod error;
pub mod schema;
pub mod snapshot;

pub use error::StorageError;
pub use schema::{
    DefinitionRecord, InstanceRecord, RestoreReport, Snapshot, SNAPSHOT_FORMAT_VERSION,
};
pub use snapshot::{SnapshotMeta, SnapshotStore};
