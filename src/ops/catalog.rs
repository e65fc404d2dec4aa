//! Backup catalog.
//!
//! The backup folder listing is the catalog: there is no index file, and
//! every query reads the directory again. All names coming from callers pass
//! through [`guard::validate`] before they touch the filesystem.

use crate::errors::{AppError, AppResult};
use crate::guard;
use crate::lock::FolderLock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Whether a catalog entry is a single file or a raw dump directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    File,
    Directory,
}

/// One backup artifact in the backup folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub file_name: String,
    /// File size, or the total size of the files in a dump directory.
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub kind: RecordKind,
}

/// Outcome of a bulk deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeletionReport {
    pub requested: usize,
    pub failed: usize,
    /// Name and reason for each failed deletion, in request order.
    pub failures: Vec<(String, String)>,
}

impl DeletionReport {
    pub fn deleted(&self) -> usize {
        self.requested - self.failed
    }

    /// True when every requested artifact was removed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Read and delete access to the artifacts in one backup folder.
#[derive(Debug, Clone)]
pub struct BackupCatalog {
    backup_dir: PathBuf,
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

impl BackupCatalog {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        BackupCatalog {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Lists the artifacts in the backup folder, newest first.
    ///
    /// Only the top level is listed. Hidden entries (including the lock file)
    /// are skipped.
    ///
    /// # Errors
    ///
    /// `AppError::DestinationUnavailable` if the backup folder can't be read.
    pub fn list(&self) -> AppResult<Vec<BackupRecord>> {
        let entries =
            fs::read_dir(&self.backup_dir).map_err(|e| AppError::DestinationUnavailable {
                path: self.backup_dir.clone(),
                reason: e.to_string(),
            })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!("Skipping {}: {}", file_name, e);
                    continue;
                }
            };
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH);

            let (kind, size_bytes) = if metadata.is_dir() {
                (RecordKind::Directory, directory_size(&entry.path()))
            } else {
                (RecordKind::File, metadata.len())
            };

            records.push(BackupRecord {
                file_name,
                size_bytes,
                modified_at,
                kind,
            });
        }

        records.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        debug!("Catalog lists {} backups", records.len());
        Ok(records)
    }

    /// Resolves a backup name to its path for download.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidFilename` if the name fails validation
    /// - `AppError::BackupNotFound` if it passes but doesn't exist
    pub fn get_backup(&self, name: &str) -> AppResult<PathBuf> {
        let name = guard::validate(name)?;
        let path = self.backup_dir.join(name);
        if !path.exists() {
            return Err(AppError::BackupNotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Copies a single-file backup to `destination`, returning the bytes copied.
    pub fn copy_backup(&self, name: &str, destination: &Path) -> AppResult<u64> {
        let path = self.get_backup(name)?;
        if !path.is_file() {
            return Err(AppError::InvalidRequest(format!(
                "'{}' is a dump directory; package it before downloading",
                name
            )));
        }
        let bytes = fs::copy(&path, destination)?;
        info!("Copied {} ({} bytes) to {:?}", name, bytes, destination);
        Ok(bytes)
    }

    /// Deletes each named artifact once and counts the failures.
    ///
    /// Every name is validated before anything is deleted; one invalid name
    /// fails the whole call. Missing files and permission errors are counted,
    /// not raised, so repeating a call is safe.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidRequest` when `names` is empty
    /// - `AppError::InvalidFilename` for any invalid name
    /// - `AppError::Lock` when another operation holds the folder
    pub fn delete_many(&self, names: &[String]) -> AppResult<DeletionReport> {
        if names.is_empty() {
            return Err(AppError::InvalidRequest(
                "no backups selected to delete".to_string(),
            ));
        }
        for name in names {
            guard::validate(name)?;
        }

        let _lock = FolderLock::try_acquire(&self.backup_dir)?;

        let mut report = DeletionReport {
            requested: names.len(),
            ..Default::default()
        };

        for name in names {
            let path = self.backup_dir.join(name);
            let outcome = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => debug!("Deleted backup {}", name),
                Err(e) => {
                    let reason = if e.kind() == io::ErrorKind::NotFound {
                        "not found".to_string()
                    } else {
                        e.to_string()
                    };
                    warn!(backup = %name, reason = %reason, "failed to delete backup");
                    report.failed += 1;
                    report.failures.push((name.clone(), reason));
                }
            }
        }

        info!(
            "Deleted {} of {} backups",
            report.deleted(),
            report.requested
        );
        Ok(report)
    }
}
