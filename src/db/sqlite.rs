//! SQLite backend.
//!
//! Tables play the role of collections. Storage sizes come from the `dbstat`
//! virtual table; when it isn't compiled in, sizes are reported as
//! [`Stat::Unsupported`].

use super::{DatabaseClient, Stat, StatsProvider};
use crate::errors::{AppResult, DatabaseError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a pooled SQLite connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const BACKEND_NAME: &str = "SQLite";

/// Database handle with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

/// Quotes an identifier for interpolation into SQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Database {
    /// Opens an existing SQLite database.
    ///
    /// The file is never created: inventory or restore against a missing
    /// database is an error, not an empty result.
    ///
    /// # Errors
    ///
    /// `DatabaseError::BackendUnavailable` if the file is missing or no
    /// connection can be established.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        debug!("Opening database at: {:?}", db_path);

        if !db_path.is_file() {
            return Err(DatabaseError::BackendUnavailable(format!(
                "database file {} does not exist",
                db_path.display()
            ))
            .into());
        }

        let manager = SqliteConnectionManager::file(db_path).with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(2)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .map_err(|e| DatabaseError::BackendUnavailable(e.to_string()))?;

        // Test the connection
        let conn = pool
            .get()
            .map_err(|e| DatabaseError::BackendUnavailable(e.to_string()))?;
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| DatabaseError::BackendUnavailable(e.to_string()))?;
        drop(conn);

        info!("Database opened successfully");
        Ok(Database { pool })
    }

    /// Gets a connection from the pool.
    pub fn get_conn(&self) -> Result<PooledConnection, DatabaseError> {
        self.pool.get().map_err(DatabaseError::Pool)
    }

    fn sum_dbstat(&self, sql: &str, collection: &str) -> Result<Stat, DatabaseError> {
        let conn = self.get_conn()?;
        let result = conn.query_row(sql, [collection], |row| row.get::<_, Option<i64>>(0));
        match result {
            Ok(total) => Ok(Stat::Bytes(total.unwrap_or(0).max(0) as u64)),
            Err(e) if is_missing_dbstat(&e) => {
                debug!("dbstat unavailable for {}: {}", collection, e);
                Ok(Stat::Unsupported)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// True when the build has no `dbstat` virtual table.
fn is_missing_dbstat(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.contains("no such table: dbstat")
    )
}

impl StatsProvider for Database {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn collection_names(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn document_count(&self, collection: &str) -> Result<u64, DatabaseError> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(collection));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn data_size(&self, collection: &str) -> Result<Stat, DatabaseError> {
        self.sum_dbstat("SELECT SUM(pgsize) FROM dbstat WHERE name = ?1", collection)
    }

    fn index_size(&self, collection: &str) -> Result<Stat, DatabaseError> {
        self.sum_dbstat(
            "SELECT SUM(d.pgsize) FROM dbstat d \
             JOIN sqlite_master m ON d.name = m.name \
             WHERE m.type = 'index' AND m.tbl_name = ?1",
            collection,
        )
    }
}

impl DatabaseClient for Database {
    fn execute_statement(&self, text: &str) -> Result<(), DatabaseError> {
        let conn = self.get_conn()?;
        conn.execute_batch(text)
            .map_err(|e| DatabaseError::Statement(e.to_string()))
    }

    fn drop_collection(&self, name: &str) -> Result<(), DatabaseError> {
        let conn = self.get_conn()?;
        conn.execute_batch(&format!("DROP TABLE {}", quote_identifier(name)))
            .map_err(|e| DatabaseError::Statement(e.to_string()))
    }
}
