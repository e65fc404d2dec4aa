//! Error handling utilities for the docdump application.
//!
//! This module provides the central error type `AppError` which represents all
//! possible error conditions of the backup/restore pipeline, as well as the
//! convenience type alias `AppResult` for functions that can return these errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Represents errors that can occur when locking a backup folder.
///
/// Backup, restore and delete operations hold an exclusive lock on the backup
/// folder for their whole duration.
///
/// # Examples
///
/// ```
/// use docdump::errors::LockError;
/// use std::path::PathBuf;
///
/// let error = LockError::ConcurrentOperationInProgress {
///     path: PathBuf::from("/var/backups/docdump"),
/// };
///
/// assert!(format!("{}", error).contains("already running"));
/// ```
#[derive(Debug, Error)]
pub enum LockError {
    /// Another backup, restore or delete holds the folder lock.
    #[error("Another backup or restore operation is already running on {path}. Wait for it to finish and try again.")]
    ConcurrentOperationInProgress {
        /// The backup folder that is locked
        path: PathBuf,
    },

    /// The lock file could not be created or locked for a technical reason.
    #[error("Failed to acquire lock for backup folder {path}: {source}. Please check folder permissions.")]
    AcquisitionFailed {
        /// The backup folder that couldn't be locked
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A held lock was passed to an operation on a different folder.
    #[error("Lock held on {held} does not cover backup folder {requested}")]
    WrongFolder {
        /// The folder the lock was taken on
        held: PathBuf,
        /// The folder the operation works on
        requested: PathBuf,
    },
}

/// Represents errors that abort a restore before or while reading its source.
///
/// # Examples
///
/// ```
/// use docdump::errors::RestoreError;
/// use std::path::PathBuf;
///
/// let error = RestoreError::Extract {
///     path: PathBuf::from("prod_backup.zip"),
///     message: "invalid Zip archive".to_string(),
/// };
/// assert!(format!("{}", error).contains("prod_backup.zip"));
/// ```
#[derive(Debug, Error)]
pub enum RestoreError {
    /// The restore source could not be read as text.
    #[error("Could not read restore source {path}: {source}")]
    Read {
        /// The source that failed to read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The archive could not be extracted to the scratch directory.
    #[error("Could not extract archive {path}: {message}")]
    Extract {
        /// The archive that failed to extract
        path: PathBuf,
        /// What went wrong
        message: String,
    },
}

/// Represents errors raised by a database backend.
///
/// # Examples
///
/// ```
/// use docdump::errors::DatabaseError;
///
/// let error = DatabaseError::BackendUnavailable("connection refused".to_string());
/// assert!(format!("{}", error).contains("unavailable"));
/// ```
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database could not be reached.
    #[error("Database backend unavailable: {0}")]
    BackendUnavailable(String),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("Failed to get connection from pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// A statement was rejected by the backend.
    #[error("Statement failed: {0}")]
    Statement(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Errors related to configuration loading or validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/output errors from filesystem operations.
    ///
    /// This variant automatically converts from `std::io::Error` through the `From` trait.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The external dump or export tool could not be located.
    #[error("External tool '{tool}' is not installed or not on PATH. Install it or point the tool setting at its location.")]
    ToolNotInstalled {
        /// The tool name or path that was searched for
        tool: String,
    },

    /// The backup folder is missing, not a directory, or not writable.
    #[error("Backup destination {path} is unavailable: {reason}")]
    DestinationUnavailable {
        /// The destination that was checked
        path: PathBuf,
        /// Why it is unusable
        reason: String,
    },

    /// Every invocation of a backup batch failed.
    #[error("Backup failed: {failed} of {total} tool invocations failed")]
    InvocationFailed {
        /// Number of failed invocations
        failed: usize,
        /// Number of invocations attempted
        total: usize,
    },

    /// The dump output could not be packaged into an archive.
    #[error("Packaging error: {0}")]
    Packaging(String),

    /// A user-supplied filename was rejected by the filename guard.
    ///
    /// This is a security rejection and is reported separately from a missing file.
    #[error("Rejected filename '{name}': {reason}")]
    InvalidFilename {
        /// The rejected name
        name: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// A validated backup name does not exist in the backup folder.
    #[error("Backup '{0}' does not exist")]
    BackupNotFound(String),

    /// A request that cannot be carried out as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Errors that abort a restore.
    #[error("Restore error: {0}")]
    Restore(#[from] RestoreError),

    /// Errors related to backup folder locking.
    #[error("Locking error: {0}")]
    Lock(#[from] LockError),

    /// Errors raised by the database backend.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The operation was cancelled by the host.
    #[error("Operation cancelled; partial output was discarded")]
    Cancelled,
}

impl AppError {
    /// Returns true for rejections that must be reported as security events.
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, AppError::InvalidFilename { .. })
    }
}

/// A type alias for `Result<T, AppError>` to simplify function signatures.
///
/// # Examples
///
/// ```
/// use docdump::errors::{AppResult, AppError};
///
/// fn might_fail() -> AppResult<String> {
///     if false {
///         return Err(AppError::Config("Something went wrong".to_string()));
///     }
///     Ok("Operation succeeded".to_string())
/// }
/// ```
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_app_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");

        let app_error: AppError = io_error.into();

        match app_error {
            AppError::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::NotFound);
            }
            _ => panic!("Expected AppError::Io variant"),
        }
    }

    #[test]
    fn test_app_error_display() {
        let config_error = AppError::Config("Invalid configuration".to_string());
        assert_eq!(
            format!("{}", config_error),
            "Configuration error: Invalid configuration"
        );

        let tool_error = AppError::ToolNotInstalled {
            tool: "mongodump".to_string(),
        };
        assert!(format!("{}", tool_error).contains("'mongodump' is not installed"));

        let invocation_error = AppError::InvocationFailed {
            failed: 3,
            total: 3,
        };
        assert_eq!(
            format!("{}", invocation_error),
            "Backup failed: 3 of 3 tool invocations failed"
        );
    }

    #[test]
    fn test_invalid_filename_is_distinct_from_not_found() {
        let rejected = AppError::InvalidFilename {
            name: "../etc/passwd".to_string(),
            reason: "contains a path separator",
        };
        let missing = AppError::BackupNotFound("prod_backup.zip".to_string());

        assert!(rejected.is_security_rejection());
        assert!(!missing.is_security_rejection());
        assert!(format!("{}", rejected).starts_with("Rejected filename"));
        assert!(format!("{}", missing).contains("does not exist"));
    }

    #[test]
    fn test_lock_error_conversion_to_app_error() {
        let lock_error = LockError::ConcurrentOperationInProgress {
            path: PathBuf::from("/backups"),
        };
        let app_error: AppError = lock_error.into();

        let message = format!("{}", app_error);
        assert!(message.starts_with("Locking error: "));
        assert!(message.contains("/backups"));
    }

    #[test]
    fn test_restore_error_source_chaining() {
        let io_error = io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        let app_error: AppError = RestoreError::Read {
            path: PathBuf::from("dump.sql"),
            source: io_error,
        }
        .into();

        let restore_error = app_error.source().expect("restore error source");
        let io_source = restore_error.source().expect("io error source");
        assert!(io_source.to_string().contains("valid UTF-8"));
    }

    #[test]
    fn test_database_error_conversion_to_app_error() {
        let app_error: AppError = DatabaseError::BackendUnavailable("no such file".to_string()).into();
        assert_eq!(
            format!("{}", app_error),
            "Database error: Database backend unavailable: no such file"
        );
    }
}
