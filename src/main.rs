/*!
# docdump - Backup and Restore for a Document Database

This file contains the command-line front end. It parses arguments, sets up
logging, loads configuration and hands each command to the library, then
renders the result with counts for every batch operation.

## Usage

```
docdump [OPTIONS] <COMMAND>

Commands:
  collections  List collections with document counts and storage sizes
  backup       Back up collections with the external dump tool
  list         List backups in the backup folder, newest first
  get          Copy a backup out of the backup folder
  delete       Delete one or more backups
  restore      Replay a backup against the database
  drop         Drop one or more collections from the database

Options:
  -v, --verbose              Print verbose output
      --log-format <FORMAT>  Log output format [default: text] [possible values: text, json]
      --json                 Print results as JSON instead of a table
```

## Exit status

`0` when everything succeeded, `1` on error, `2` when a batch only partly
succeeded (some collections, files or statements failed).

## Configuration

See [`docdump::config::Config::load`] for the `DOCDUMP_*` environment variables.
*/

use chrono::Local;
use docdump::cli::{CliArgs, Command};
use docdump::config::Config;
use docdump::constants::{DEFAULT_LOG_LEVEL, LOG_FORMAT_JSON, TRACING_ROOT_SPAN_NAME};
use docdump::db::{Database, StatsProvider};
use docdump::errors::{AppError, AppResult};
use docdump::lock::FolderLock;
use docdump::ops::{
    self, ArchiveFormat, BackupCatalog, BackupOrchestrator, BackupRequest, RestoreEngine,
};
use docdump::tool::{CancelFlag, ProcessTool};
use serde::Serialize;
use std::fs;
use std::process::ExitCode;
use tracing::{debug, error, info, info_span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Complete,
    Partial,
}

impl Completion {
    fn from_failures(failed: usize) -> Self {
        if failed == 0 {
            Completion::Complete
        } else {
            Completion::Partial
        }
    }
}

fn init_tracing(args: &CliArgs) {
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = if args.log_format == LOG_FORMAT_JSON {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(&args);

    let correlation_id = Uuid::new_v4();
    let span = info_span!(TRACING_ROOT_SPAN_NAME, correlation_id = %correlation_id);
    let _enter = span.enter();

    info!("Starting docdump");
    debug!("CLI arguments: {:?}", args);

    match run(&args) {
        Ok(Completion::Complete) => ExitCode::SUCCESS,
        Ok(Completion::Partial) => ExitCode::from(2),
        Err(e) => {
            if e.is_security_rejection() {
                error!(error = %e, "request rejected");
            } else {
                error!(error = %e, "command failed");
            }
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> AppResult<Completion> {
    info!("Loading configuration");
    let config = Config::load()?;
    config.validate()?;
    debug!("Configuration: {:?}", config);

    match &args.command {
        Command::Collections => show_collections(&config, args.json),
        Command::Backup {
            collections,
            format,
            name,
        } => run_backup(&config, collections, *format, name.as_deref(), args.json),
        Command::List => show_backups(&config, args.json),
        Command::Get { name, output } => {
            let catalog = BackupCatalog::new(&config.backup_dir);
            let bytes = catalog.copy_backup(name, output)?;
            println!("Copied {} ({} bytes) to {}", name, bytes, output.display());
            Ok(Completion::Complete)
        }
        Command::Delete { names } => {
            let catalog = BackupCatalog::new(&config.backup_dir);
            let report = catalog.delete_many(names)?;
            println!("{} of {} files deleted", report.deleted(), report.requested);
            for (name, reason) in &report.failures {
                println!("  failed: {} ({})", name, reason);
            }
            Ok(Completion::from_failures(report.failed))
        }
        Command::Restore { name } => run_restore(&config, name, args.json),
        Command::Drop { collections } => {
            let db = Database::open(&config.db_path)?;
            let report = ops::drop_collections(&db, collections)?;
            println!("{} of {} collections dropped", report.dropped(), report.requested);
            for (name, reason) in &report.failures {
                println!("  failed: {} ({})", name, reason);
            }
            Ok(Completion::from_failures(report.failed))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::InvalidRequest(format!("could not render JSON: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

fn show_collections(config: &Config, json: bool) -> AppResult<Completion> {
    let db = Database::open(&config.db_path)?;
    let collections = ops::list_collections(&db)?;

    if json {
        print_json(&collections)?;
    } else if collections.is_empty() {
        println!("No collections found");
    } else {
        println!(
            "{:<32} {:>12} {:>14} {:>14}",
            "COLLECTION", "DOCUMENTS", "DATA", "INDEXES"
        );
        for c in &collections {
            println!(
                "{:<32} {:>12} {:>14} {:>14}",
                c.name,
                c.document_count,
                c.data_size.to_string(),
                c.index_size.to_string()
            );
        }
    }
    Ok(Completion::Complete)
}

fn run_backup(
    config: &Config,
    collections: &[String],
    format: ArchiveFormat,
    name: Option<&str>,
    json: bool,
) -> AppResult<Completion> {
    let base_name = match name {
        Some(n) => n.to_string(),
        None => ops::default_base_name(&config.environment, &Local::now()),
    };

    // JSON exports run per collection, so "everything" has to be spelled out.
    let collections = if format == ArchiveFormat::JsonExport && collections.is_empty() {
        let db = Database::open(&config.db_path)?;
        db.collection_names()?
    } else {
        collections.to_vec()
    };

    fs::create_dir_all(&config.backup_dir).map_err(|e| AppError::DestinationUnavailable {
        path: config.backup_dir.clone(),
        reason: e.to_string(),
    })?;

    let orchestrator = BackupOrchestrator::new(
        config.backup_dir.clone(),
        Box::new(ProcessTool::new(config.dump_tool.clone(), config.tool_timeout)),
        Box::new(ProcessTool::new(
            config.export_tool.clone(),
            config.tool_timeout,
        )),
    );
    let request = BackupRequest::new(collections, format, base_name);

    // One lock from the first dump through packaging.
    let lock = FolderLock::try_acquire(&config.backup_dir)?;
    let result =
        orchestrator.run_locked(&request, &config.credentials, &CancelFlag::new(), &lock)?;

    for (target, status) in result.failed_targets() {
        eprintln!("  failed: {} ({})", target, status.exit);
        if !status.output.trim().is_empty() {
            debug!("{} output:\n{}", target, status.output);
        }
    }
    result.ensure_any_succeeded()?;

    let artifact = ops::package_locked(&result, format, &lock)?;
    drop(lock);

    if json {
        #[derive(Serialize)]
        struct Summary<'a> {
            path: String,
            format: ArchiveFormat,
            succeeded: usize,
            total: usize,
            checksum: Option<&'a str>,
        }
        print_json(&Summary {
            path: artifact.path.display().to_string(),
            format: artifact.format,
            succeeded: result.succeeded_count(),
            total: result.total(),
            checksum: artifact.checksum.as_deref(),
        })?;
    } else {
        println!(
            "{} of {} collections backed up",
            result.succeeded_count(),
            result.total()
        );
        println!("Backup written to {}", artifact.path.display());
        if let Some(checksum) = &artifact.checksum {
            println!("BLAKE3: {}", checksum);
        }
    }

    Ok(Completion::from_failures(
        result.total() - result.succeeded_count(),
    ))
}

fn show_backups(config: &Config, json: bool) -> AppResult<Completion> {
    let catalog = BackupCatalog::new(&config.backup_dir);
    let records = catalog.list()?;

    if json {
        print_json(&records)?;
    } else if records.is_empty() {
        println!("No backups in {}", config.backup_dir.display());
    } else {
        println!("{:<48} {:>14} {:<20}", "NAME", "SIZE", "MODIFIED (UTC)");
        for r in &records {
            println!(
                "{:<48} {:>14} {:<20}",
                r.file_name,
                r.size_bytes,
                r.modified_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(Completion::Complete)
}

fn run_restore(config: &Config, name: &str, json: bool) -> AppResult<Completion> {
    let catalog = BackupCatalog::new(&config.backup_dir);
    let db = Database::open(&config.db_path)?;
    let session = RestoreEngine::new(&db).restore_backup(&catalog, name)?;

    if json {
        #[derive(Serialize)]
        struct Summary<'a> {
            source: String,
            succeeded: usize,
            total: usize,
            discarded_incomplete: usize,
            failures: Vec<&'a str>,
            skipped_files: Vec<String>,
        }
        print_json(&Summary {
            source: session.source_file.display().to_string(),
            succeeded: session.succeeded_count(),
            total: session.total(),
            discarded_incomplete: session.discarded_incomplete,
            failures: session
                .statement_results
                .iter()
                .filter(|r| !r.outcome.is_success())
                .map(|r| r.statement.trim())
                .collect(),
            skipped_files: session
                .skipped_files
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        })?;
    } else {
        println!(
            "{} of {} statements succeeded",
            session.succeeded_count(),
            session.total()
        );
        for result in &session.statement_results {
            if let ops::Outcome::Failure(reason) = &result.outcome {
                println!("  failed: {} ({})", result.statement.trim(), reason);
            }
        }
        if session.discarded_incomplete > 0 {
            println!(
                "{} unterminated statement(s) discarded",
                session.discarded_incomplete
            );
        }
        for skipped in &session.skipped_files {
            println!("  skipped non-text file: {}", skipped.display());
        }
    }

    Ok(Completion::from_failures(session.failed_count()))
}
