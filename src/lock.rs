//! Exclusive lock on a backup folder.
//!
//! Backups, restores and deletions against one folder must not interleave. The
//! lock is an `fs2` advisory lock on a file inside the folder; it is released
//! when the [`FolderLock`] is dropped, including on early returns.

use crate::constants::LOCK_FILE_NAME;
use crate::errors::{AppResult, LockError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Guard holding the exclusive lock on a backup folder.
#[derive(Debug)]
pub struct FolderLock {
    file: File,
    folder: PathBuf,
}

impl FolderLock {
    /// Tries to lock `folder` without blocking.
    ///
    /// # Errors
    ///
    /// - `LockError::ConcurrentOperationInProgress` if another holder has the lock
    /// - `LockError::AcquisitionFailed` if the lock file can't be opened
    pub fn try_acquire(folder: &Path) -> AppResult<Self> {
        let lock_path = folder.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| LockError::AcquisitionFailed {
                path: folder.to_path_buf(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired lock on {:?}", folder);
                Ok(FolderLock {
                    file,
                    folder: folder.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::ConcurrentOperationInProgress {
                    path: folder.to_path_buf(),
                }
                .into())
            }
            Err(source) => Err(LockError::AcquisitionFailed {
                path: folder.to_path_buf(),
                source,
            }
            .into()),
        }
    }

    /// The folder this lock protects.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Checks that this lock was taken on `folder`.
    ///
    /// Operations that accept an already-held lock call this before touching
    /// the folder.
    pub fn ensure_covers(&self, folder: &Path) -> AppResult<()> {
        if self.folder != folder {
            return Err(LockError::WrongFolder {
                held: self.folder.clone(),
                requested: folder.to_path_buf(),
            }
            .into());
        }
        Ok(())
    }
}

impl Drop for FolderLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to release lock on {:?}: {}", self.folder, e);
        } else {
            debug!("Released lock on {:?}", self.folder);
        }
    }
}
