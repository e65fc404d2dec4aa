//! Restore: replays the statements in a backup against the database.
//!
//! A restore source is a plain UTF-8 file, a zip or tar.gz archive, or a raw
//! dump directory. Archives are unpacked into a scratch directory that is
//! removed when the restore returns. Text is fed line by line through a
//! [`StatementReader`], which reassembles statements that span several lines.

use crate::db::DatabaseClient;
use crate::errors::{AppResult, RestoreError};
use crate::lock::FolderLock;
use crate::ops::catalog::BackupCatalog;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::mem;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Result of executing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementResult {
    /// Statement text exactly as sent, including line terminators.
    pub statement: String,
    pub outcome: Outcome,
}

/// Report of one restore run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSession {
    pub source_file: PathBuf,
    pub statement_results: Vec<StatementResult>,
    /// Statements still open when their input ended. These were not executed.
    pub discarded_incomplete: usize,
    /// Files in an archive or dump directory that were not valid UTF-8.
    pub skipped_files: Vec<PathBuf>,
}

impl RestoreSession {
    fn new(source_file: &Path) -> Self {
        RestoreSession {
            source_file: source_file.to_path_buf(),
            statement_results: Vec::new(),
            discarded_incomplete: 0,
            skipped_files: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.statement_results.len()
    }

    pub fn succeeded_count(&self) -> usize {
        self.statement_results
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.total() - self.succeeded_count()
    }

    /// True when every executed statement succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Idle,
    Accumulating,
}

/// Line-driven reassembly of `;`-terminated statements.
///
/// Lines whose trimmed text starts with `#` are comments and are dropped in
/// any state. Every other line is appended verbatim, terminator included. A
/// line whose trimmed text ends with `;` completes the statement.
///
/// # Examples
///
/// ```
/// use docdump::ops::restore::StatementReader;
///
/// let mut reader = StatementReader::new();
/// assert_eq!(reader.feed_line("UPDATE t SET x=2\n"), None);
/// assert_eq!(reader.feed_line("# skipped\n"), None);
/// assert_eq!(
///     reader.feed_line("WHERE id=1;\n").as_deref(),
///     Some("UPDATE t SET x=2\nWHERE id=1;\n")
/// );
/// assert!(!reader.finish());
/// ```
#[derive(Debug)]
pub struct StatementReader {
    state: ReaderState,
    buffer: String,
}

impl Default for StatementReader {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementReader {
    pub fn new() -> Self {
        StatementReader {
            state: ReaderState::Idle,
            buffer: String::new(),
        }
    }

    /// Feeds one physical line and returns a statement when it completes.
    pub fn feed_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            return None;
        }
        if self.state == ReaderState::Idle && trimmed.is_empty() {
            return None;
        }

        self.buffer.push_str(line);
        self.state = ReaderState::Accumulating;

        if trimmed.ends_with(';') {
            self.state = ReaderState::Idle;
            return Some(mem::take(&mut self.buffer));
        }
        None
    }

    /// Ends the input. Returns true if an unterminated statement was dropped.
    pub fn finish(&mut self) -> bool {
        let discarded = self.state == ReaderState::Accumulating;
        if discarded {
            debug!("Discarding unterminated statement: {:?}", self.buffer);
        }
        self.buffer.clear();
        self.state = ReaderState::Idle;
        discarded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Text,
    Zip,
    TarGz,
    Directory,
}

fn detect_kind(path: &Path) -> Result<SourceKind, RestoreError> {
    let read_error = |source: io::Error| RestoreError::Read {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(path).map_err(read_error)?;
    if metadata.is_dir() {
        return Ok(SourceKind::Directory);
    }

    let mut magic = [0u8; 4];
    let mut file = File::open(path).map_err(read_error)?;
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..]).map_err(read_error)? {
            0 => break,
            n => filled += n,
        }
    }

    let kind = if filled >= 4 && magic == ZIP_MAGIC {
        SourceKind::Zip
    } else if filled >= 2 && magic[..2] == GZIP_MAGIC {
        SourceKind::TarGz
    } else {
        SourceKind::Text
    };
    Ok(kind)
}

fn extract_error(path: &Path, message: impl ToString) -> RestoreError {
    RestoreError::Extract {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn extract_zip(archive_path: &Path, scratch: &Path) -> Result<(), RestoreError> {
    let file = File::open(archive_path).map_err(|e| extract_error(archive_path, e))?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| extract_error(archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extract_error(archive_path, e))?;
        let relative = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                warn!(entry = %entry.name(), "refusing zip entry outside the scratch directory");
                return Err(extract_error(
                    archive_path,
                    format!("entry '{}' escapes the extraction directory", entry.name()),
                ));
            }
        };
        let target = scratch.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| extract_error(archive_path, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| extract_error(archive_path, e))?;
        }
        let mut out = File::create(&target).map_err(|e| extract_error(archive_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| extract_error(archive_path, e))?;
    }
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, scratch: &Path) -> Result<(), RestoreError> {
    let file = File::open(archive_path).map_err(|e| extract_error(archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive
        .unpack(scratch)
        .map_err(|e| extract_error(archive_path, e))
}

/// Replays backups through a [`DatabaseClient`].
pub struct RestoreEngine<'a> {
    client: &'a dyn DatabaseClient,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(client: &'a dyn DatabaseClient) -> Self {
        RestoreEngine { client }
    }

    /// Restores from `source`, which may be a text file, an archive or a
    /// dump directory.
    ///
    /// Statement failures are recorded in the session and do not stop the
    /// replay.
    ///
    /// # Errors
    ///
    /// - `RestoreError::Read` if a plain source is missing or not UTF-8
    /// - `RestoreError::Extract` if an archive can't be unpacked; no
    ///   statement has run in that case
    pub fn restore(&self, source: &Path) -> AppResult<RestoreSession> {
        let kind = detect_kind(source)?;
        info!("Restoring from {:?} ({:?})", source, kind);

        let mut session = RestoreSession::new(source);
        match kind {
            SourceKind::Text => {
                let content =
                    fs::read_to_string(source).map_err(|e| RestoreError::Read {
                        path: source.to_path_buf(),
                        source: e,
                    })?;
                self.replay_text(&content, &mut session);
            }
            SourceKind::Directory => self.replay_tree(source, &mut session)?,
            SourceKind::Zip | SourceKind::TarGz => {
                let scratch = TempDir::new().map_err(|e| extract_error(source, e))?;
                if kind == SourceKind::Zip {
                    extract_zip(source, scratch.path())?;
                } else {
                    extract_tar_gz(source, scratch.path())?;
                }
                debug!("Extracted {:?} to {:?}", source, scratch.path());
                self.replay_tree(scratch.path(), &mut session)?;
            }
        }

        info!(
            "{} of {} statements succeeded ({} discarded incomplete, {} files skipped)",
            session.succeeded_count(),
            session.total(),
            session.discarded_incomplete,
            session.skipped_files.len()
        );
        Ok(session)
    }

    /// Restores a named artifact from the backup folder.
    ///
    /// The name is validated first, and the folder lock is held for the
    /// whole replay.
    pub fn restore_backup(&self, catalog: &BackupCatalog, name: &str) -> AppResult<RestoreSession> {
        let path = catalog.get_backup(name)?;
        let _lock = FolderLock::try_acquire(catalog.backup_dir())?;
        self.restore(&path)
    }

    fn replay_tree(&self, root: &Path, session: &mut RestoreSession) -> Result<(), RestoreError> {
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| RestoreError::Read {
                path: root.to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            let bytes = fs::read(entry.path()).map_err(|e| RestoreError::Read {
                path: entry.path().to_path_buf(),
                source: e,
            })?;

            match String::from_utf8(bytes) {
                Ok(content) => {
                    debug!("Replaying {:?}", relative);
                    self.replay_text(&content, session);
                }
                Err(_) => {
                    debug!("Skipping non-text file {:?}", relative);
                    session.skipped_files.push(relative);
                }
            }
        }
        Ok(())
    }

    fn replay_text(&self, content: &str, session: &mut RestoreSession) {
        let mut reader = StatementReader::new();
        for line in content.split_inclusive('\n') {
            if let Some(statement) = reader.feed_line(line) {
                let outcome = match self.client.execute_statement(&statement) {
                    Ok(()) => Outcome::Success,
                    Err(e) => {
                        warn!(error = %e, "statement failed");
                        Outcome::Failure(e.to_string())
                    }
                };
                session.statement_results.push(StatementResult { statement, outcome });
            }
        }
        if reader.finish() {
            session.discarded_incomplete += 1;
        }
    }
}
