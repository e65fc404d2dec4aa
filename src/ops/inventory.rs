//! Collection inventory and collection drops.

use crate::db::{DatabaseClient, Stat, StatsProvider};
use crate::errors::{AppError, AppResult};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Live statistics for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    /// Backend that produced the numbers.
    pub engine: String,
    pub document_count: u64,
    pub data_size: Stat,
    pub index_size: Stat,
}

/// Outcome of dropping a batch of collections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DropReport {
    pub requested: usize,
    pub failed: usize,
    /// Collection name and reason for each failure, in request order.
    pub failures: Vec<(String, String)>,
}

impl DropReport {
    pub fn dropped(&self) -> usize {
        self.requested - self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Lists every collection with its document count and storage sizes.
///
/// Statistics are read fresh on every call.
///
/// # Errors
///
/// Returns `AppError::Database` when the backend can't be reached or a
/// collection's document count can't be read.
pub fn list_collections(provider: &dyn StatsProvider) -> AppResult<Vec<CollectionStats>> {
    let names = provider.collection_names()?;
    debug!("Found {} collections", names.len());

    let mut collections = Vec::with_capacity(names.len());
    for name in names {
        let document_count = provider.document_count(&name)?;
        let data_size = provider.data_size(&name)?;
        let index_size = provider.index_size(&name)?;

        collections.push(CollectionStats {
            engine: provider.backend_name().to_string(),
            document_count,
            data_size,
            index_size,
            name,
        });
    }

    Ok(collections)
}

/// Drops each named collection, continuing past failures.
///
/// # Errors
///
/// `AppError::InvalidRequest` when `names` is empty. Individual drop
/// failures are counted in the report instead.
pub fn drop_collections(client: &dyn DatabaseClient, names: &[String]) -> AppResult<DropReport> {
    if names.is_empty() {
        return Err(AppError::InvalidRequest(
            "no collections selected to drop".to_string(),
        ));
    }

    let mut report = DropReport {
        requested: names.len(),
        ..Default::default()
    };

    for name in names {
        match client.drop_collection(name) {
            Ok(()) => debug!("Dropped collection {}", name),
            Err(e) => {
                warn!(collection = %name, error = %e, "failed to drop collection");
                report.failed += 1;
                report.failures.push((name.clone(), e.to_string()));
            }
        }
    }

    info!(
        "Dropped {} of {} collections",
        report.dropped(),
        report.requested
    );
    Ok(report)
}
