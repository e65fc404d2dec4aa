//! High-level backup and restore operations.
//!
//! These are the operations a front end calls: collection inventory, running
//! the dump tool, packaging, the backup catalog and restore. Each one returns
//! a plain result value; rendering is left to the caller.

pub mod backup;
pub mod catalog;
pub mod inventory;
pub mod package;
pub mod restore;

// Re-export commonly used types and functions
pub use backup::{
    default_base_name, ArchiveFormat, BackupOrchestrator, BackupRequest, BackupResult, DumpTarget,
};
pub use catalog::{BackupCatalog, BackupRecord, DeletionReport, RecordKind};
pub use inventory::{drop_collections, list_collections, CollectionStats, DropReport};
pub use package::{package, package_locked, PackagedArtifact};
pub use restore::{Outcome, RestoreEngine, RestoreSession, StatementReader, StatementResult};
