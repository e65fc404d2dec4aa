//! Packaging of dump directories into single-file archives.
//!
//! The archive is written to a temporary file inside the backup folder and
//! renamed into place only after it has been completely written and flushed.
//! The raw dump directory is removed after that rename, never before.

use crate::errors::{AppError, AppResult};
use crate::lock::FolderLock;
use crate::ops::backup::{ArchiveFormat, BackupResult};
use blake3::Hasher;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Final artifact of a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub path: PathBuf,
    pub format: ArchiveFormat,
    /// BLAKE3 checksum of single-file archives.
    pub checksum: Option<String>,
}

fn packaging_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Packaging(format!("{}: {}", context, e))
}

/// Packages the output of a backup run under its own folder lock.
///
/// `Raw` and `JsonExport` return the dump directory (`<base>.raw` or
/// `<base>.json`) unchanged. `Zip` and `Gzip` write `<base>.zip` /
/// `<base>.tar.gz` next to it and then delete the directory.
///
/// # Errors
///
/// `AppError::Packaging` if the dump directory is missing, the archive
/// already exists, or writing the archive fails. The dump directory is left
/// untouched in every error case. `AppError::Lock` if the folder is busy.
pub fn package(result: &BackupResult, format: ArchiveFormat) -> AppResult<PackagedArtifact> {
    let parent = dump_parent(&result.output_path)?;
    let lock = FolderLock::try_acquire(parent)?;
    package_locked(result, format, &lock)
}

/// Same as [`package`] under a lock the caller already holds, usually the one
/// held across [`BackupOrchestrator::run_locked`](crate::ops::BackupOrchestrator::run_locked).
pub fn package_locked(
    result: &BackupResult,
    format: ArchiveFormat,
    lock: &FolderLock,
) -> AppResult<PackagedArtifact> {
    let source = &result.output_path;
    let parent = dump_parent(source)?;
    lock.ensure_covers(parent)?;

    if !source.is_dir() {
        return Err(AppError::Packaging(format!(
            "dump directory {} does not exist",
            source.display()
        )));
    }

    let extension = match format.archive_extension() {
        Some(extension) => extension,
        None => {
            debug!("No packaging requested for {:?}", source);
            return Ok(PackagedArtifact {
                path: source.clone(),
                format,
                checksum: None,
            });
        }
    };

    // The dump folder is `<base>.raw`; the archive is `<base>.<extension>`.
    let base_name = source
        .file_stem()
        .ok_or_else(|| AppError::Packaging("dump directory has no name".to_string()))?;
    let mut archive_name = base_name.to_os_string();
    archive_name.push(".");
    archive_name.push(extension);
    let archive_path = parent.join(archive_name);

    if archive_path.exists() {
        return Err(AppError::Packaging(format!(
            "archive {} already exists",
            archive_path.display()
        )));
    }

    info!("Packaging {:?} into {:?}", source, archive_path);
    let staging = NamedTempFile::new_in(parent)
        .map_err(|e| packaging_error("could not create temporary archive", e))?;

    match format {
        ArchiveFormat::Zip => write_zip(source, staging.as_file())?,
        _ => write_tar_gz(source, staging.as_file())?,
    }
    staging
        .as_file()
        .sync_all()
        .map_err(|e| packaging_error("could not flush archive", e))?;

    staging
        .persist_noclobber(&archive_path)
        .map_err(|e| packaging_error("could not move archive into place", e.error))?;

    let checksum = checksum_file(&archive_path)?;

    // The archive is confirmed on disk; the raw directory is now redundant.
    if let Err(e) = fs::remove_dir_all(source) {
        warn!("Archive written but failed to remove {:?}: {}", source, e);
    }

    info!("Created archive {:?} ({})", archive_path, checksum);
    Ok(PackagedArtifact {
        path: archive_path,
        format,
        checksum: Some(checksum),
    })
}

fn dump_parent(source: &Path) -> AppResult<&Path> {
    source
        .parent()
        .ok_or_else(|| AppError::Packaging("dump directory has no parent".to_string()))
}

fn relative_name(root: &Path, path: &Path) -> AppResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| packaging_error("unexpected path outside dump directory", e))?;
    // Zip entry names always use forward slashes.
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

fn write_zip(source: &Path, out: &File) -> AppResult<()> {
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let file_options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let dir_options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(|e| packaging_error("could not walk dump directory", e))?;
        let name = relative_name(source, entry.path())?;

        if entry.file_type().is_dir() {
            zip.add_directory(name.as_str(), dir_options)
                .map_err(|e| packaging_error(&format!("could not add directory {}", name), e))?;
        } else if entry.file_type().is_file() {
            debug!("Adding to archive: {}", name);
            zip.start_file(name.as_str(), file_options)
                .map_err(|e| packaging_error(&format!("could not add {}", name), e))?;
            let mut reader = BufReader::new(
                File::open(entry.path())
                    .map_err(|e| packaging_error(&format!("could not read {}", name), e))?,
            );
            io::copy(&mut reader, &mut zip)
                .map_err(|e| packaging_error(&format!("could not compress {}", name), e))?;
        } else {
            warn!("Skipping non-regular file in dump: {}", name);
        }
    }

    let mut writer = zip
        .finish()
        .map_err(|e| packaging_error("could not finish zip archive", e))?;
    writer
        .flush()
        .map_err(|e| packaging_error("could not flush zip archive", e))?;
    Ok(())
}

fn write_tar_gz(source: &Path, out: &File) -> AppResult<()> {
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);

    tar.append_dir_all(".", source)
        .map_err(|e| packaging_error("could not add dump directory to tar archive", e))?;

    let encoder = tar
        .into_inner()
        .map_err(|e| packaging_error("could not finalize tar archive", e))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| packaging_error("could not finish gzip compression", e))?;
    writer
        .flush()
        .map_err(|e| packaging_error("could not flush tar archive", e))?;
    Ok(())
}

fn checksum_file(path: &Path) -> AppResult<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LockError;
    use crate::ops::backup::DumpTarget;
    use crate::tool::{ExitCode, InvocationStatus};
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::io::Read;
    use std::time::Duration;
    use tempfile::TempDir;

    fn dump_fixture(backup_dir: &Path, base: &str) -> BackupResult {
        let out = backup_dir.join(format!("{}.raw", base));
        fs::create_dir_all(out.join("app")).unwrap();
        fs::write(out.join("app").join("users.bson"), b"\x16\x00\x00\x00users").unwrap();
        fs::write(out.join("app").join("users.metadata.json"), b"{\"indexes\":[]}").unwrap();
        fs::write(out.join("oplog.bson"), vec![7u8; 70_000]).unwrap();

        BackupResult {
            output_path: out,
            format: ArchiveFormat::Zip,
            succeeded: true,
            per_collection_status: vec![(
                DumpTarget::WholeDatabase,
                InvocationStatus {
                    exit: ExitCode::Code(0),
                    output: String::new(),
                },
            )],
            duration: Duration::from_secs(1),
        }
    }

    fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    relative_name(root, e.path()).unwrap(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_raw_returns_directory_unchanged() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");

        let artifact = package(&result, ArchiveFormat::Raw).unwrap();

        assert_eq!(artifact.path, dir.path().join("nightly.raw"));
        assert!(artifact.checksum.is_none());
        assert!(result.output_path.is_dir());
    }

    #[test]
    fn test_zip_round_trip_reproduces_dump() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        let original = read_tree(&result.output_path);

        let artifact = package(&result, ArchiveFormat::Zip).unwrap();

        assert_eq!(artifact.path, dir.path().join("nightly.zip"));
        assert!(!result.output_path.exists());
        assert_eq!(artifact.checksum.as_ref().map(|c| c.len()), Some(64));

        let extracted = TempDir::new().unwrap();
        let mut archive = zip::ZipArchive::new(File::open(&artifact.path).unwrap()).unwrap();
        archive.extract(extracted.path()).unwrap();

        assert_eq!(read_tree(extracted.path()), original);
    }

    #[test]
    fn test_gzip_round_trip_reproduces_dump() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        let original = read_tree(&result.output_path);

        let artifact = package(&result, ArchiveFormat::Gzip).unwrap();
        assert_eq!(artifact.path, dir.path().join("nightly.tar.gz"));
        assert!(!result.output_path.exists());

        let extracted = TempDir::new().unwrap();
        let mut bytes = Vec::new();
        GzDecoder::new(File::open(&artifact.path).unwrap())
            .read_to_end(&mut bytes)
            .unwrap();
        tar::Archive::new(bytes.as_slice())
            .unpack(extracted.path())
            .unwrap();

        assert_eq!(read_tree(extracted.path()), original);
    }

    #[test]
    fn test_existing_archive_keeps_raw_directory() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        fs::write(dir.path().join("nightly.zip"), b"older archive").unwrap();

        let outcome = package(&result, ArchiveFormat::Zip);

        assert!(matches!(outcome, Err(AppError::Packaging(_))));
        assert!(result.output_path.join("oplog.bson").exists());
        assert_eq!(fs::read(dir.path().join("nightly.zip")).unwrap(), b"older archive");
    }

    #[test]
    fn test_missing_dump_directory() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        fs::remove_dir_all(&result.output_path).unwrap();

        match package(&result, ArchiveFormat::Zip) {
            Err(AppError::Packaging(msg)) => assert!(msg.contains("does not exist")),
            other => panic!("Expected Packaging error, got {:?}", other),
        }
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");

        package(&result, ArchiveFormat::Zip).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with(".docdump"))
            .collect();
        names.sort();
        assert_eq!(names, vec!["nightly.zip".to_string()]);
    }

    #[test]
    fn test_dotted_base_name_keeps_its_dots() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly.v2");

        let artifact = package(&result, ArchiveFormat::Gzip).unwrap();

        assert_eq!(artifact.path, dir.path().join("nightly.v2.tar.gz"));
    }

    #[test]
    fn test_package_refuses_busy_folder() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        let _held = FolderLock::try_acquire(dir.path()).unwrap();

        match package(&result, ArchiveFormat::Zip) {
            Err(AppError::Lock(LockError::ConcurrentOperationInProgress { .. })) => {}
            other => panic!("Expected ConcurrentOperationInProgress, got {:?}", other),
        }
        assert!(result.output_path.is_dir());
    }

    #[test]
    fn test_package_locked_runs_under_held_lock() {
        let dir = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        let lock = FolderLock::try_acquire(dir.path()).unwrap();

        let artifact = package_locked(&result, ArchiveFormat::Zip, &lock).unwrap();

        assert_eq!(artifact.path, dir.path().join("nightly.zip"));
        assert!(!result.output_path.exists());
    }

    #[test]
    fn test_package_locked_rejects_foreign_lock() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let result = dump_fixture(dir.path(), "nightly");
        let lock = FolderLock::try_acquire(elsewhere.path()).unwrap();

        match package_locked(&result, ArchiveFormat::Zip, &lock) {
            Err(AppError::Lock(LockError::WrongFolder { .. })) => {}
            other => panic!("Expected WrongFolder, got {:?}", other),
        }
        assert!(result.output_path.is_dir());
    }
}
