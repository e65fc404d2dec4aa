//! Filename validation for names that arrive from outside the process.
//!
//! Every read, restore and delete of a backup artifact goes through [`validate`]
//! before the name is joined onto the backup folder. A rejection is a security
//! event: it is logged at `warn` and surfaces as [`AppError::InvalidFilename`],
//! never as a missing file.

use crate::constants::PATH_SEPARATORS;
use crate::errors::{AppError, AppResult};
use tracing::warn;

fn reject(raw_name: &str, reason: &'static str) -> AppError {
    warn!(name = %raw_name.escape_debug(), reason, "rejected backup filename");
    AppError::InvalidFilename {
        name: raw_name.to_string(),
        reason,
    }
}

fn check_common(raw_name: &str) -> AppResult<()> {
    if raw_name.is_empty() {
        return Err(reject(raw_name, "name is empty"));
    }
    if raw_name.contains(PATH_SEPARATORS) {
        return Err(reject(raw_name, "contains a path separator"));
    }
    if raw_name.contains('\0') {
        return Err(reject(raw_name, "contains a NUL byte"));
    }
    // Covers "..", "." and the folder's own lock file.
    if raw_name.starts_with('.') {
        return Err(reject(raw_name, "starts with a dot"));
    }
    Ok(())
}

/// Validates the name of an existing backup artifact.
///
/// The name must be a single path component with an extension.
///
/// # Examples
///
/// ```
/// use docdump::guard;
///
/// assert!(guard::validate("production_backup_2024-01-15_093000.zip").is_ok());
/// assert!(guard::validate("../../dev/null.zip").is_err());
/// assert!(guard::validate("COM1").is_err());
/// ```
pub fn validate(raw_name: &str) -> AppResult<&str> {
    check_common(raw_name)?;
    if !raw_name.contains('.') {
        return Err(reject(raw_name, "has no file extension"));
    }
    Ok(raw_name)
}

/// Validates a destination base name for a new backup.
///
/// Base names carry no extension (the packager appends one), so only the
/// component rules apply.
pub fn validate_base_name(raw_name: &str) -> AppResult<&str> {
    check_common(raw_name)?;
    Ok(raw_name)
}
