//! Constants used throughout the application.
//!
//! This module contains all constants used in docdump, organized into logical
//! groups.

// Application Metadata
/// The name of the application.
pub const APP_NAME: &str = "docdump";
/// The description of the application used in CLI help text.
pub const APP_DESCRIPTION: &str = "Backup, catalog and restore tool for a document database";

// CLI Arguments & Defaults
/// Log format identifier for plain text.
pub const LOG_FORMAT_TEXT: &str = "text";
/// Log format identifier for JSON.
pub const LOG_FORMAT_JSON: &str = "json";
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Configuration Keys & Environment Variables
/// Environment variable for the backup folder.
pub const ENV_VAR_BACKUP_DIR: &str = "DOCDUMP_BACKUP_DIR";
/// Environment variable for the SQLite database file.
pub const ENV_VAR_DB_PATH: &str = "DOCDUMP_DB_PATH";
/// Environment variable for the database host.
pub const ENV_VAR_HOST: &str = "DOCDUMP_HOST";
/// Environment variable for the database port.
pub const ENV_VAR_PORT: &str = "DOCDUMP_PORT";
/// Environment variable for the database user.
pub const ENV_VAR_USERNAME: &str = "DOCDUMP_USERNAME";
/// Environment variable for the database password.
pub const ENV_VAR_PASSWORD: &str = "DOCDUMP_PASSWORD";
/// Environment variable for the database name.
pub const ENV_VAR_DATABASE: &str = "DOCDUMP_DATABASE";
/// Environment variable for the dump tool name or path.
pub const ENV_VAR_DUMP_TOOL: &str = "DOCDUMP_DUMP_TOOL";
/// Environment variable for the export tool name or path.
pub const ENV_VAR_EXPORT_TOOL: &str = "DOCDUMP_EXPORT_TOOL";
/// Environment variable for the per-invocation tool timeout, in seconds.
pub const ENV_VAR_TOOL_TIMEOUT: &str = "DOCDUMP_TOOL_TIMEOUT_SECS";
/// Environment variable for the environment label used in backup names.
pub const ENV_VAR_ENVIRONMENT: &str = "DOCDUMP_ENV";
/// Default backup folder, expanded with `shellexpand`.
pub const DEFAULT_BACKUP_DIR: &str = "~/.local/share/docdump/backups";
/// Default database file, expanded with `shellexpand`.
pub const DEFAULT_DB_PATH: &str = "~/.local/share/docdump/docdump.db";
/// Default dump tool.
pub const DEFAULT_DUMP_TOOL: &str = "mongodump";
/// Default export tool used for JSON exports.
pub const DEFAULT_EXPORT_TOOL: &str = "mongoexport";
/// Default timeout for one external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3600;
/// Default environment label.
pub const DEFAULT_ENVIRONMENT: &str = "development";

// Validation
/// Characters that separate path components on any supported platform.
pub const PATH_SEPARATORS: &[char] = &['/', '\\'];
/// Placeholder string for redacted information in debug output.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

// File System Parameters
/// Name of the lock file kept inside the backup folder.
pub const LOCK_FILE_NAME: &str = ".docdump.lock";
/// Name of the probe file used to check that the backup folder is writable.
pub const WRITE_PROBE_PREFIX: &str = ".docdump-probe";
/// Extension of zip archives.
pub const ZIP_EXTENSION: &str = "zip";
/// Extension of gzip-compressed tar archives.
pub const TAR_GZ_EXTENSION: &str = "tar.gz";
/// Extension of per-collection JSON export files and of JSON export folders.
pub const JSON_EXPORT_EXTENSION: &str = "json";
/// Extension of raw dump folders. Archives replace it with their own.
pub const RAW_DUMP_EXTENSION: &str = "raw";
/// Timestamp format in generated backup names.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

// Process Handling
/// Interval between child process status polls.
pub const PROCESS_POLL_INTERVAL_MS: u64 = 50;
/// Captured tool output longer than this is truncated in results.
pub const MAX_CAPTURED_OUTPUT_BYTES: usize = 64 * 1024;

// Logging Configuration
/// Name for the root tracing span covering an application invocation.
pub const TRACING_ROOT_SPAN_NAME: &str = "app_invocation";
