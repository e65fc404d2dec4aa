use crate::constants::{APP_DESCRIPTION, APP_NAME, LOG_FORMAT_JSON, LOG_FORMAT_TEXT};
use crate::ops::ArchiveFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Backup, catalog and restore tool for a document database
#[derive(Parser, Debug)]
#[command(name = APP_NAME, about = APP_DESCRIPTION)]
#[command(author, version, long_about = None)]
pub struct CliArgs {
    /// Print verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(
        long,
        global = true,
        value_name = "FORMAT",
        default_value = LOG_FORMAT_TEXT,
        value_parser = [LOG_FORMAT_TEXT, LOG_FORMAT_JSON]
    )]
    pub log_format: String,

    /// Print results as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List collections with document counts and storage sizes
    Collections,

    /// Back up collections with the external dump tool
    Backup {
        /// Collection to back up (repeatable). Omit to back up the whole database
        #[arg(short = 'c', long = "collection", value_name = "NAME")]
        collections: Vec<String>,

        /// Archive format: raw, zip, gzip or json
        #[arg(short = 'f', long, default_value = "zip")]
        format: ArchiveFormat,

        /// Base name for the backup (defaults to <environment>_backup_<timestamp>)
        #[arg(short = 'n', long)]
        name: Option<String>,
    },

    /// List backups in the backup folder, newest first
    List,

    /// Copy a backup out of the backup folder
    Get {
        /// Backup file name
        name: String,

        /// Where to write the copy
        #[arg(short = 'o', long, value_name = "PATH")]
        output: PathBuf,
    },

    /// Delete one or more backups
    Delete {
        /// Backup file names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Replay a backup against the database
    Restore {
        /// Backup file name
        name: String,
    },

    /// Drop one or more collections from the database
    Drop {
        /// Collection names
        #[arg(required = true)]
        collections: Vec<String>,
    },
}

impl CliArgs {
    /// Parse command-line arguments
    pub fn parse() -> Self {
        CliArgs::parse_from(std::env::args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(vec!["docdump", "list"]);
        assert!(!args.verbose);
        assert!(!args.json);
        assert_eq!(args.log_format, LOG_FORMAT_TEXT);
        assert_eq!(args.command, Command::List);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(vec![
            "docdump",
            "collections",
            "--verbose",
            "--log-format",
            "json",
            "--json",
        ]);
        assert!(args.verbose);
        assert!(args.json);
        assert_eq!(args.log_format, LOG_FORMAT_JSON);
        assert_eq!(args.command, Command::Collections);

        // Short form
        let args = CliArgs::parse_from(vec!["docdump", "-v", "list"]);
        assert!(args.verbose);
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let result = CliArgs::try_parse_from(vec!["docdump", "--log-format", "xml", "list"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_backup_defaults() {
        let args = CliArgs::parse_from(vec!["docdump", "backup"]);
        assert_eq!(
            args.command,
            Command::Backup {
                collections: vec![],
                format: ArchiveFormat::Zip,
                name: None,
            }
        );
    }

    #[test]
    fn test_backup_with_collections_and_format() {
        let args = CliArgs::parse_from(vec![
            "docdump", "backup", "-c", "users", "--collection", "orders", "--format", "gzip",
            "--name", "nightly",
        ]);
        match args.command {
            Command::Backup {
                collections,
                format,
                name,
            } => {
                assert_eq!(collections, vec!["users", "orders"]);
                assert_eq!(format, ArchiveFormat::Gzip);
                assert_eq!(name.as_deref(), Some("nightly"));
            }
            other => panic!("Expected backup command, got {:?}", other),
        }
    }

    #[test]
    fn test_backup_invalid_format() {
        let result = CliArgs::try_parse_from(vec!["docdump", "backup", "--format", "rar"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_get_requires_output() {
        assert!(CliArgs::try_parse_from(vec!["docdump", "get", "a.zip"]).is_err());

        let args = CliArgs::parse_from(vec!["docdump", "get", "a.zip", "-o", "/tmp/a.zip"]);
        assert_eq!(
            args.command,
            Command::Get {
                name: "a.zip".to_string(),
                output: PathBuf::from("/tmp/a.zip"),
            }
        );
    }

    #[test]
    fn test_delete_and_drop_require_names() {
        assert!(CliArgs::try_parse_from(vec!["docdump", "delete"]).is_err());
        assert!(CliArgs::try_parse_from(vec!["docdump", "drop"]).is_err());

        let args = CliArgs::parse_from(vec!["docdump", "delete", "a.zip", "b.tar.gz"]);
        assert_eq!(
            args.command,
            Command::Delete {
                names: vec!["a.zip".to_string(), "b.tar.gz".to_string()],
            }
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(CliArgs::try_parse_from(vec!["docdump"]).is_err());
    }
}
