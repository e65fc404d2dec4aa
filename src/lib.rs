/*!
# docdump

docdump is an administrative backup and restore tool for a document database.
It selects collections, runs an external dump utility, optionally packages the
result into a portable archive, keeps a catalog of existing backups and can
replay a backup to restore state.

## Core Features

- List collections with document counts and storage sizes
- Back up selected collections, or the whole database, with an external dump tool
- Package a dump as `.zip` or `.tar.gz`, or export collections as JSON
- List, download and delete backups in the backup folder
- Restore from a statement file, an archive or a raw dump directory

## Architecture

- `cli`: Command-line interface handling using clap
- `config`: Configuration loading and validation
- `errors`: Error handling infrastructure
- `guard`: Validation of user-supplied backup names
- `lock`: Exclusive lock on a backup folder
- `tool`: External tool invocation with timeout and cancellation
- `db`: Database traits and the SQLite backend
- `ops`: Inventory, backup, packaging, catalog and restore operations

## Usage Example

```rust,no_run
use docdump::ops::{package, ArchiveFormat, BackupOrchestrator, BackupRequest};
use docdump::tool::{CancelFlag, ProcessTool};
use docdump::Config;

fn main() -> docdump::AppResult<()> {
    let config = Config::load()?;
    config.validate()?;

    let orchestrator = BackupOrchestrator::new(
        config.backup_dir.clone(),
        Box::new(ProcessTool::new(config.dump_tool.clone(), config.tool_timeout)),
        Box::new(ProcessTool::new(config.export_tool.clone(), config.tool_timeout)),
    );
    let request = BackupRequest::new(vec![], ArchiveFormat::Zip, "nightly".to_string());
    let result = orchestrator.run(&request, &config.credentials, &CancelFlag::new())?;
    let artifact = package(&result, request.archive_format)?;
    println!("{}", artifact.path.display());
    Ok(())
}
```
*/

/// Command-line interface for parsing and handling user arguments
pub mod cli;
/// Configuration loading and management
pub mod config;
/// Application-wide constants
pub mod constants;
/// Database traits and backends
pub mod db;
/// Error types and utilities for error handling
pub mod errors;
/// Backup filename validation
pub mod guard;
/// Backup folder locking
pub mod lock;
/// Backup, catalog and restore operations
pub mod ops;
/// External tool invocation
pub mod tool;

// Re-export important types for convenience
pub use cli::CliArgs;
pub use config::Config;
pub use errors::{AppError, AppResult};
