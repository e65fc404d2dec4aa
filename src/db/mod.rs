//! Database collaborators of the backup pipeline.
//!
//! The pipeline depends only on two small interfaces:
//!
//! - [`StatsProvider`]: enumerates collections and reports their statistics,
//!   one implementation per backend
//! - [`DatabaseClient`]: executes restore statements and drops collections
//!
//! [`Database`] is the SQLite implementation of both, pooled through r2d2.
//!
//! # Example
//!
//! ```no_run
//! use docdump::db::{Database, StatsProvider};
//! use std::path::Path;
//!
//! let db = Database::open(Path::new("/var/lib/app/app.db"))?;
//! for name in db.collection_names()? {
//!     println!("{}: {} documents", name, db.document_count(&name)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod sqlite;

use crate::errors::DatabaseError;
use serde::Serialize;
use std::fmt;

pub use sqlite::Database;

/// A storage statistic a backend may or may not be able to supply.
///
/// `Unsupported` is reported instead of zero so an empty collection and an
/// unknown size are never confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Bytes(u64),
    Unsupported,
}

impl Stat {
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Stat::Bytes(n) => Some(*n),
            Stat::Unsupported => None,
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stat::Bytes(n) => write!(f, "{}", n),
            Stat::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Per-backend access to collection statistics.
pub trait StatsProvider {
    /// Human-readable backend name shown next to each collection.
    fn backend_name(&self) -> &str;

    /// Names of all collections, in a stable order.
    fn collection_names(&self) -> Result<Vec<String>, DatabaseError>;

    /// Number of documents in `collection`.
    fn document_count(&self, collection: &str) -> Result<u64, DatabaseError>;

    /// Bytes used by the collection's data.
    fn data_size(&self, collection: &str) -> Result<Stat, DatabaseError>;

    /// Bytes used by the collection's indexes.
    fn index_size(&self, collection: &str) -> Result<Stat, DatabaseError>;
}

/// Write access used by restore and collection drops.
pub trait DatabaseClient {
    /// Executes one restore statement (which may span several lines).
    fn execute_statement(&self, text: &str) -> Result<(), DatabaseError>;

    /// Removes a collection and all of its documents.
    fn drop_collection(&self, name: &str) -> Result<(), DatabaseError>;
}
