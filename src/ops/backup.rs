//! Backup orchestration.
//!
//! Runs the external dump tool once per selected collection (or once for the
//! whole database) into a fresh `<base>.raw` directory inside the backup
//! folder. JSON exports run the export tool per collection into `<base>.json`
//! instead. Invocations run one after another; a failed invocation is recorded
//! and the batch continues.

use crate::config::ConnectionCredentials;
use crate::constants::{
    BACKUP_TIMESTAMP_FORMAT, JSON_EXPORT_EXTENSION, RAW_DUMP_EXTENSION, TAR_GZ_EXTENSION,
    WRITE_PROBE_PREFIX, ZIP_EXTENSION,
};
use crate::errors::{AppError, AppResult};
use crate::guard;
use crate::lock::FolderLock;
use crate::tool::{CancelFlag, ExitCode, ExternalTool, InvocationStatus};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How the dump output is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// Leave the dump directory `<base>.raw` as is.
    Raw,
    /// Compress the dump directory into `<base>.zip`.
    Zip,
    /// Compress the dump directory into `<base>.tar.gz`.
    Gzip,
    /// Export each collection as line-delimited JSON into `<base>.json/`.
    JsonExport,
}

impl ArchiveFormat {
    /// Extension of the folder the tools write into.
    pub fn dump_extension(self) -> &'static str {
        match self {
            ArchiveFormat::JsonExport => JSON_EXPORT_EXTENSION,
            _ => RAW_DUMP_EXTENSION,
        }
    }

    /// Extension of the single-file archive, for formats that produce one.
    pub fn archive_extension(self) -> Option<&'static str> {
        match self {
            ArchiveFormat::Zip => Some(ZIP_EXTENSION),
            ArchiveFormat::Gzip => Some(TAR_GZ_EXTENSION),
            ArchiveFormat::Raw | ArchiveFormat::JsonExport => None,
        }
    }

    /// File name the finished backup of `base_name` ends up under.
    ///
    /// # Examples
    ///
    /// ```
    /// use docdump::ops::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::Raw.artifact_name("nightly"), "nightly.raw");
    /// assert_eq!(ArchiveFormat::Gzip.artifact_name("nightly"), "nightly.tar.gz");
    /// assert_eq!(ArchiveFormat::JsonExport.artifact_name("nightly"), "nightly.json");
    /// ```
    pub fn artifact_name(self, base_name: &str) -> String {
        let extension = self
            .archive_extension()
            .unwrap_or_else(|| self.dump_extension());
        format!("{}.{}", base_name, extension)
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "txt" => Ok(ArchiveFormat::Raw),
            "zip" => Ok(ArchiveFormat::Zip),
            "gzip" | "tar.gz" | "tgz" => Ok(ArchiveFormat::Gzip),
            "json" => Ok(ArchiveFormat::JsonExport),
            other => Err(format!(
                "unsupported archive format '{}' (expected raw, zip, gzip or json)",
                other
            )),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::Raw => "raw",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::JsonExport => "json",
        };
        f.write_str(name)
    }
}

/// What a user asked to back up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    /// Collections to dump, in order, without duplicates. Empty means the whole database.
    pub target_collections: Vec<String>,
    pub archive_format: ArchiveFormat,
    /// Backup name without extension; see [`ArchiveFormat::artifact_name`].
    pub destination_base_name: String,
}

impl BackupRequest {
    pub fn new(
        collections: impl IntoIterator<Item = String>,
        archive_format: ArchiveFormat,
        destination_base_name: impl Into<String>,
    ) -> Self {
        let mut target_collections: Vec<String> = Vec::new();
        for name in collections {
            if !target_collections.contains(&name) {
                target_collections.push(name);
            }
        }
        BackupRequest {
            target_collections,
            archive_format,
            destination_base_name: destination_base_name.into(),
        }
    }
}

/// Builds the conventional backup name `<environment>_backup_<YYYY-MM-DD_HHMMSS>`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use docdump::ops::backup::default_base_name;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 5).unwrap();
/// assert_eq!(
///     default_base_name("production", &at),
///     "production_backup_2024-01-15_093005"
/// );
/// ```
pub fn default_base_name<Tz: TimeZone>(environment: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    format!(
        "{}_backup_{}",
        environment,
        at.format(BACKUP_TIMESTAMP_FORMAT)
    )
}

/// One unit of work for the dump tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpTarget {
    Collection(String),
    WholeDatabase,
}

impl fmt::Display for DumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpTarget::Collection(name) => f.write_str(name),
            DumpTarget::WholeDatabase => f.write_str("(entire database)"),
        }
    }
}

/// Outcome of a backup run. Built once by the orchestrator and never modified.
#[derive(Debug, Clone)]
pub struct BackupResult {
    /// The dump directory inside the backup folder, `<base>.raw` or `<base>.json`.
    pub output_path: PathBuf,
    pub format: ArchiveFormat,
    /// True only if every invocation succeeded.
    pub succeeded: bool,
    /// Status of every invocation, in execution order.
    pub per_collection_status: Vec<(DumpTarget, InvocationStatus)>,
    pub duration: Duration,
}

impl BackupResult {
    pub fn total(&self) -> usize {
        self.per_collection_status.len()
    }

    pub fn succeeded_count(&self) -> usize {
        self.per_collection_status
            .iter()
            .filter(|(_, status)| status.is_success())
            .count()
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &(DumpTarget, InvocationStatus)> {
        self.per_collection_status
            .iter()
            .filter(|(_, status)| !status.is_success())
    }

    /// Fails with `InvocationFailed` when not a single invocation succeeded.
    ///
    /// A partial backup still counts as produced output.
    pub fn ensure_any_succeeded(&self) -> AppResult<()> {
        if self.total() > 0 && self.succeeded_count() == 0 {
            return Err(AppError::InvocationFailed {
                failed: self.total(),
                total: self.total(),
            });
        }
        Ok(())
    }
}

/// Runs dump and export tools against one backup folder.
pub struct BackupOrchestrator {
    backup_dir: PathBuf,
    dump_tool: Box<dyn ExternalTool>,
    export_tool: Box<dyn ExternalTool>,
}

/// A validated request, ready to run under the folder lock.
struct Prepared<'a> {
    tool: &'a dyn ExternalTool,
    exporting: bool,
    output_path: PathBuf,
    artifact_path: PathBuf,
    started: Instant,
}

impl BackupOrchestrator {
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        dump_tool: Box<dyn ExternalTool>,
        export_tool: Box<dyn ExternalTool>,
    ) -> Self {
        BackupOrchestrator {
            backup_dir: backup_dir.into(),
            dump_tool,
            export_tool,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Creates a backup as described by `req`.
    ///
    /// # Flow
    ///
    /// 1. Validate the base name and resolve the tool
    /// 2. Check the backup folder exists and is writable
    /// 3. Lock the backup folder
    /// 4. Run one invocation per target, sequentially, into `<base>.raw`
    ///    (`<base>.json` for JSON exports)
    /// 5. Aggregate per-target statuses
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidFilename` for a base name with separators
    /// - `AppError::InvalidRequest` for a JSON export without collections
    /// - `AppError::ToolNotInstalled` if the tool can't be found; nothing is run
    /// - `AppError::DestinationUnavailable` if the folder is unusable or the
    ///   dump folder or final archive already exists
    /// - `AppError::Lock` if another operation holds the folder
    /// - `AppError::Cancelled` if `cancel` trips; partial output is removed
    ///
    /// Failed invocations are not errors: they show up in the result.
    pub fn run(
        &self,
        req: &BackupRequest,
        credentials: &ConnectionCredentials,
        cancel: &CancelFlag,
    ) -> AppResult<BackupResult> {
        let prepared = self.prepare(req)?;
        let lock = FolderLock::try_acquire(&self.backup_dir)?;
        self.execute(req, prepared, credentials, cancel, &lock)
    }

    /// Same as [`run`](Self::run) under a lock the caller already holds.
    ///
    /// Lets a caller keep the folder locked from the dump through
    /// [`package_locked`](crate::ops::package::package_locked).
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run), plus `LockError::WrongFolder` if `lock` was
    /// taken on another folder.
    pub fn run_locked(
        &self,
        req: &BackupRequest,
        credentials: &ConnectionCredentials,
        cancel: &CancelFlag,
        lock: &FolderLock,
    ) -> AppResult<BackupResult> {
        lock.ensure_covers(&self.backup_dir)?;
        let prepared = self.prepare(req)?;
        self.execute(req, prepared, credentials, cancel, lock)
    }

    fn prepare(&self, req: &BackupRequest) -> AppResult<Prepared<'_>> {
        let started = Instant::now();
        let base_name = guard::validate_base_name(&req.destination_base_name)?;

        let exporting = req.archive_format == ArchiveFormat::JsonExport;
        if exporting {
            if req.target_collections.is_empty() {
                return Err(AppError::InvalidRequest(
                    "a JSON export needs an explicit list of collections".to_string(),
                ));
            }
            // Collection names become file names below the output directory.
            for collection in &req.target_collections {
                guard::validate_base_name(collection)?;
            }
        }

        let tool = if exporting {
            self.export_tool.as_ref()
        } else {
            self.dump_tool.as_ref()
        };
        let program = tool.locate()?;
        debug!("Using {} at {:?}", tool.name(), program);

        check_destination(&self.backup_dir)?;

        let format = req.archive_format;
        Ok(Prepared {
            tool,
            exporting,
            output_path: self
                .backup_dir
                .join(format!("{}.{}", base_name, format.dump_extension())),
            artifact_path: self.backup_dir.join(format.artifact_name(base_name)),
            started,
        })
    }

    fn execute(
        &self,
        req: &BackupRequest,
        prepared: Prepared<'_>,
        credentials: &ConnectionCredentials,
        cancel: &CancelFlag,
        _lock: &FolderLock,
    ) -> AppResult<BackupResult> {
        let Prepared {
            tool,
            exporting,
            output_path,
            artifact_path,
            started,
        } = prepared;

        for existing in [&output_path, &artifact_path] {
            if existing.exists() {
                return Err(AppError::DestinationUnavailable {
                    path: existing.clone(),
                    reason: "a backup with this name already exists".to_string(),
                });
            }
        }
        fs::create_dir(&output_path).map_err(|e| AppError::DestinationUnavailable {
            path: output_path.clone(),
            reason: e.to_string(),
        })?;

        let targets: Vec<DumpTarget> = if req.target_collections.is_empty() {
            vec![DumpTarget::WholeDatabase]
        } else {
            req.target_collections
                .iter()
                .cloned()
                .map(DumpTarget::Collection)
                .collect()
        };

        info!(
            "Creating {} backup {:?} with {} invocation(s)",
            req.archive_format,
            output_path,
            targets.len()
        );

        let mut per_collection_status = Vec::with_capacity(targets.len());
        for target in targets {
            if cancel.is_cancelled() {
                return Err(discard_partial_output(&output_path));
            }

            let args = if exporting {
                export_args(credentials, &target, &output_path)
            } else {
                dump_args(credentials, &target, &output_path)
            };

            debug!("Invoking {} for {}", tool.name(), target);
            let status = tool.invoke(&args, cancel);

            if status.exit == ExitCode::Cancelled {
                return Err(discard_partial_output(&output_path));
            }
            if status.is_success() {
                debug!("{} finished for {}", tool.name(), target);
            } else {
                warn!(
                    target = %target,
                    exit = %status.exit,
                    "tool invocation failed; continuing with remaining targets"
                );
            }
            per_collection_status.push((target, status));
        }

        let succeeded = per_collection_status.iter().all(|(_, s)| s.is_success());
        let result = BackupResult {
            output_path,
            format: req.archive_format,
            succeeded,
            per_collection_status,
            duration: started.elapsed(),
        };

        info!(
            "Backed up {} of {} targets in {} seconds",
            result.succeeded_count(),
            result.total(),
            result.duration.as_secs()
        );
        Ok(result)
    }
}

/// Checks that `dir` is an existing, writable directory.
fn check_destination(dir: &Path) -> AppResult<()> {
    if !dir.is_dir() {
        return Err(AppError::DestinationUnavailable {
            path: dir.to_path_buf(),
            reason: "does not exist or is not a directory".to_string(),
        });
    }

    tempfile::Builder::new()
        .prefix(WRITE_PROBE_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| AppError::DestinationUnavailable {
            path: dir.to_path_buf(),
            reason: format!("not writable: {}", e),
        })?;
    Ok(())
}

fn discard_partial_output(output_path: &Path) -> AppError {
    warn!("Backup cancelled; removing partial output {:?}", output_path);
    match fs::remove_dir_all(output_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {:?}: {}", output_path, e),
    }
    AppError::Cancelled
}

fn dump_args(
    credentials: &ConnectionCredentials,
    target: &DumpTarget,
    output_path: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = credentials.to_flags().into_iter().map(OsString::from).collect();
    if let DumpTarget::Collection(name) = target {
        args.push("--collection".into());
        args.push(name.into());
    }
    args.push("--out".into());
    args.push(output_path.into());
    args
}

fn export_args(
    credentials: &ConnectionCredentials,
    target: &DumpTarget,
    output_path: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = credentials.to_flags().into_iter().map(OsString::from).collect();
    if let DumpTarget::Collection(name) = target {
        args.push("--collection".into());
        args.push(name.into());
        args.push("--out".into());
        args.push(
            output_path
                .join(format!("{}.{}", name, JSON_EXPORT_EXTENSION))
                .into(),
        );
    }
    args
}
