//! Configuration management for the docdump application.
//!
//! This module handles loading and validating configuration settings from environment
//! variables, with sensible defaults. Connection credentials are loaded once here and
//! passed explicitly into the pipeline; nothing reads configuration mid-operation.
//!
//! # Environment Variables
//!
//! - `DOCDUMP_BACKUP_DIR`: Backup folder (defaults to ~/.local/share/docdump/backups)
//! - `DOCDUMP_DB_PATH`: SQLite database file used for inventory, drop and restore
//! - `DOCDUMP_HOST`, `DOCDUMP_PORT`, `DOCDUMP_USERNAME`, `DOCDUMP_PASSWORD`,
//!   `DOCDUMP_DATABASE`: Credentials handed to the dump and export tools
//! - `DOCDUMP_DUMP_TOOL`, `DOCDUMP_EXPORT_TOOL`: Tool names or paths
//! - `DOCDUMP_TOOL_TIMEOUT_SECS`: Timeout for one tool invocation
//! - `DOCDUMP_ENV`: Environment label used in generated backup names

use crate::constants::{
    DEFAULT_BACKUP_DIR, DEFAULT_DB_PATH, DEFAULT_DUMP_TOOL, DEFAULT_ENVIRONMENT,
    DEFAULT_EXPORT_TOOL, DEFAULT_TOOL_TIMEOUT_SECS, ENV_VAR_BACKUP_DIR, ENV_VAR_DATABASE,
    ENV_VAR_DB_PATH, ENV_VAR_DUMP_TOOL, ENV_VAR_ENVIRONMENT, ENV_VAR_EXPORT_TOOL, ENV_VAR_HOST,
    ENV_VAR_PASSWORD, ENV_VAR_PORT, ENV_VAR_TOOL_TIMEOUT, ENV_VAR_USERNAME, REDACTED_PLACEHOLDER,
};
use crate::errors::{AppError, AppResult};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings handed to the external dump and export tools.
///
/// Every field is optional in practice: an empty field means the matching
/// command-line flag is left out entirely.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionCredentials {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() {
            ""
        } else {
            REDACTED_PLACEHOLDER
        };
        f.debug_struct("ConnectionCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &password)
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionCredentials {
    /// Builds the optional connection flags in a fixed order.
    ///
    /// A flag is emitted only when its value is non-empty, so a tool never sees
    /// `--password ""`.
    ///
    /// # Examples
    ///
    /// ```
    /// use docdump::config::ConnectionCredentials;
    ///
    /// let creds = ConnectionCredentials {
    ///     host: "db1.example.net".to_string(),
    ///     database: "app".to_string(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(
    ///     creds.to_flags(),
    ///     vec!["--host", "db1.example.net", "--db", "app"]
    /// );
    /// ```
    pub fn to_flags(&self) -> Vec<String> {
        let pairs = [
            ("--host", &self.host),
            ("--port", &self.port),
            ("--username", &self.username),
            ("--password", &self.password),
            ("--db", &self.database),
        ];

        let mut flags = Vec::new();
        for (flag, value) in pairs {
            if !value.is_empty() {
                flags.push(flag.to_string());
                flags.push(value.clone());
            }
        }
        flags
    }
}

/// Configuration for the docdump application.
pub struct Config {
    /// Folder holding every backup artifact. The listing of this folder is the catalog.
    pub backup_dir: PathBuf,

    /// SQLite database file used by the inventory, drop and restore commands.
    pub db_path: PathBuf,

    /// Credentials passed to the external tools.
    pub credentials: ConnectionCredentials,

    /// Dump tool name (looked up on PATH) or path.
    pub dump_tool: String,

    /// Export tool name (looked up on PATH) or path, used for JSON exports.
    pub export_tool: String,

    /// Upper bound on a single tool invocation.
    pub tool_timeout: Duration,

    /// Environment label used in generated backup names.
    pub environment: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backup_dir", &self.backup_dir)
            .field("db_path", &self.db_path)
            .field("credentials", &self.credentials)
            .field("dump_tool", &self.dump_tool)
            .field("export_tool", &self.export_tool)
            .field("tool_timeout", &self.tool_timeout)
            .field("environment", &self.environment)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backup_dir: PathBuf::from(""),
            db_path: PathBuf::from(""),
            credentials: ConnectionCredentials::default(),
            dump_tool: DEFAULT_DUMP_TOOL.to_string(),
            export_tool: DEFAULT_EXPORT_TOOL.to_string(),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }
}

impl Config {
    /// Validates a tool command string for security.
    ///
    /// Tools are executed directly with an argument list, never through a shell,
    /// but a tool setting containing shell syntax is almost certainly a mistake
    /// or an injection attempt and is rejected early.
    fn validate_tool_command(tool_cmd: &str) -> AppResult<&str> {
        if tool_cmd.is_empty() {
            return Err(AppError::Config("Tool command cannot be empty".to_string()));
        }

        if tool_cmd.contains(' ') {
            return Err(AppError::Config(
                "Tool command cannot contain spaces. Use a wrapper script for tools requiring extra arguments".to_string(),
            ));
        }

        const FORBIDDEN_CHARS: &[char] =
            &['|', '&', ';', '$', '(', ')', '`', '<', '>', '\'', '"'];

        for &ch in FORBIDDEN_CHARS.iter() {
            if tool_cmd.contains(ch) {
                return Err(AppError::Config(format!(
                    "Tool command cannot contain shell metacharacters: '{}'",
                    ch
                )));
            }
        }

        Ok(tool_cmd)
    }

    fn expand_path(raw: &str) -> AppResult<PathBuf> {
        let expanded = shellexpand::full(raw)
            .map_err(|e| AppError::Config(format!("Failed to expand path: {}", e)))?;
        Ok(PathBuf::from(expanded.into_owned()))
    }

    /// Loads configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if:
    /// - A path fails to expand
    /// - A tool command fails validation
    /// - The timeout is not a positive integer
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use docdump::Config;
    ///
    /// match Config::load() {
    ///     Ok(config) => println!("Backups live in {}", config.backup_dir.display()),
    ///     Err(err) => eprintln!("Failed to load config: {}", err),
    /// }
    /// ```
    pub fn load() -> AppResult<Self> {
        let backup_dir_raw =
            env::var(ENV_VAR_BACKUP_DIR).unwrap_or_else(|_| DEFAULT_BACKUP_DIR.to_string());
        let backup_dir = Self::expand_path(&backup_dir_raw)?;

        let db_path_raw = env::var(ENV_VAR_DB_PATH).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let db_path = Self::expand_path(&db_path_raw)?;

        let dump_tool_raw =
            env::var(ENV_VAR_DUMP_TOOL).unwrap_or_else(|_| DEFAULT_DUMP_TOOL.to_string());
        let dump_tool = Self::validate_tool_command(&dump_tool_raw)?.to_string();

        let export_tool_raw =
            env::var(ENV_VAR_EXPORT_TOOL).unwrap_or_else(|_| DEFAULT_EXPORT_TOOL.to_string());
        let export_tool = Self::validate_tool_command(&export_tool_raw)?.to_string();

        let tool_timeout = match env::var(ENV_VAR_TOOL_TIMEOUT) {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    AppError::Config(format!(
                        "{} must be a whole number of seconds, got '{}'",
                        ENV_VAR_TOOL_TIMEOUT, raw
                    ))
                })?;
                if secs == 0 {
                    return Err(AppError::Config(format!(
                        "{} must be greater than zero",
                        ENV_VAR_TOOL_TIMEOUT
                    )));
                }
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        };

        let credentials = ConnectionCredentials {
            host: env::var(ENV_VAR_HOST).unwrap_or_default(),
            port: env::var(ENV_VAR_PORT).unwrap_or_default(),
            username: env::var(ENV_VAR_USERNAME).unwrap_or_default(),
            password: env::var(ENV_VAR_PASSWORD).unwrap_or_default(),
            database: env::var(ENV_VAR_DATABASE).unwrap_or_default(),
        };

        let environment =
            env::var(ENV_VAR_ENVIRONMENT).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());

        Ok(Config {
            backup_dir,
            db_path,
            credentials,
            dump_tool,
            export_tool,
            tool_timeout,
            environment,
        })
    }

    /// Validates that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the backup folder is empty or relative,
    /// when the port is not numeric, or when the environment label contains a
    /// path separator (it becomes part of backup file names).
    ///
    /// # Examples
    ///
    /// ```
    /// use docdump::Config;
    /// use std::path::PathBuf;
    ///
    /// let config = Config {
    ///     backup_dir: PathBuf::from("/var/backups/docdump"),
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_ok());
    ///
    /// let relative = Config {
    ///     backup_dir: PathBuf::from("backups"),
    ///     ..Default::default()
    /// };
    /// assert!(relative.validate().is_err());
    /// ```
    pub fn validate(&self) -> AppResult<()> {
        if self.backup_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Backup directory path is empty".to_string()));
        }

        if !self.backup_dir.is_absolute() {
            return Err(AppError::Config(
                "Backup directory must be an absolute path".to_string(),
            ));
        }

        if !self.credentials.port.is_empty() && self.credentials.port.parse::<u16>().is_err() {
            return Err(AppError::Config(format!(
                "Port must be a number between 0 and 65535, got '{}'",
                self.credentials.port
            )));
        }

        if self.environment.is_empty()
            || self.environment.contains(crate::constants::PATH_SEPARATORS)
        {
            return Err(AppError::Config(
                "Environment label must be non-empty and contain no path separators".to_string(),
            ));
        }

        Ok(())
    }
}
