//! External tool invocation.
//!
//! The dump and export utilities are modelled as an [`ExternalTool`] capability
//! so the orchestrator never builds shell strings and tests can substitute a
//! scripted tool. [`ProcessTool`] is the real implementation: it resolves the
//! program on `PATH`, runs it with an argument list, enforces a timeout and
//! honours a [`CancelFlag`].

use crate::constants::{MAX_CAPTURED_OUTPUT_BYTES, PROCESS_POLL_INTERVAL_MS};
use crate::errors::{AppError, AppResult};
use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared cancellation signal.
///
/// Cloning shares the flag; the host trips it with [`CancelFlag::cancel`] and
/// in-flight invocations are killed at the next poll.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a single tool invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCode {
    /// The process exited with this status code.
    Code(i32),
    /// The process was terminated by a signal.
    Signaled,
    /// The process ran past the timeout and was killed.
    TimedOut,
    /// The host cancelled the operation and the process was killed.
    Cancelled,
    /// The process could not be started.
    SpawnFailed(String),
}

impl ExitCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Code(0))
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Code(code) => write!(f, "exit code {}", code),
            ExitCode::Signaled => write!(f, "terminated by signal"),
            ExitCode::TimedOut => write!(f, "timed out"),
            ExitCode::Cancelled => write!(f, "cancelled"),
            ExitCode::SpawnFailed(reason) => write!(f, "failed to start: {}", reason),
        }
    }
}

/// Exit status and captured output of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationStatus {
    pub exit: ExitCode,
    /// Combined stdout and stderr, truncated for very chatty tools.
    pub output: String,
}

impl InvocationStatus {
    pub fn is_success(&self) -> bool {
        self.exit.is_success()
    }
}

/// A command-line utility the pipeline can run.
pub trait ExternalTool {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Resolves the tool's executable.
    ///
    /// # Errors
    ///
    /// `AppError::ToolNotInstalled` when it can't be found.
    fn locate(&self) -> AppResult<PathBuf>;

    /// Runs the tool with `args` and waits for it to finish, be killed on
    /// timeout, or be killed on cancellation.
    fn invoke(&self, args: &[OsString], cancel: &CancelFlag) -> InvocationStatus;
}

/// Runs a real executable through `std::process::Command`.
#[derive(Debug, Clone)]
pub struct ProcessTool {
    program: String,
    timeout: Duration,
}

impl ProcessTool {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        ProcessTool {
            program: program.into(),
            timeout,
        }
    }

    fn capture(mut file: File) -> String {
        let mut bytes = Vec::new();
        if file.seek(SeekFrom::Start(0)).is_ok() {
            let _ = file
                .take(MAX_CAPTURED_OUTPUT_BYTES as u64)
                .read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn kill(child: &mut Child) {
        if let Err(e) = child.kill() {
            debug!("kill failed (process may have exited): {}", e);
        }
        let _ = child.wait();
    }

    fn wait(&self, child: &mut Child, cancel: &CancelFlag) -> ExitCode {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return match status.code() {
                        Some(code) => ExitCode::Code(code),
                        None => ExitCode::Signaled,
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    Self::kill(child);
                    return ExitCode::SpawnFailed(format!("wait failed: {}", e));
                }
            }

            if cancel.is_cancelled() {
                Self::kill(child);
                return ExitCode::Cancelled;
            }
            if started.elapsed() >= self.timeout {
                warn!(tool = %self.program, timeout_secs = self.timeout.as_secs(), "tool invocation timed out");
                Self::kill(child);
                return ExitCode::TimedOut;
            }
            thread::sleep(Duration::from_millis(PROCESS_POLL_INTERVAL_MS));
        }
    }
}

/// Looks `program` up the way a shell would: a value with a separator is a
/// path, anything else is searched for on `PATH`.
fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

impl ExternalTool for ProcessTool {
    fn name(&self) -> &str {
        &self.program
    }

    fn locate(&self) -> AppResult<PathBuf> {
        find_executable(&self.program).ok_or_else(|| AppError::ToolNotInstalled {
            tool: self.program.clone(),
        })
    }

    fn invoke(&self, args: &[OsString], cancel: &CancelFlag) -> InvocationStatus {
        let executable = match self.locate() {
            Ok(path) => path,
            Err(e) => {
                return InvocationStatus {
                    exit: ExitCode::SpawnFailed(e.to_string()),
                    output: String::new(),
                }
            }
        };

        // Output goes to an unnamed temp file so a chatty tool can't block on a full pipe.
        let sink = match tempfile::tempfile() {
            Ok(file) => file,
            Err(e) => {
                return InvocationStatus {
                    exit: ExitCode::SpawnFailed(format!("could not create output buffer: {}", e)),
                    output: String::new(),
                }
            }
        };
        let (stdout, stderr) = match (sink.try_clone(), sink.try_clone()) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                return InvocationStatus {
                    exit: ExitCode::SpawnFailed(format!("could not share output buffer: {}", e)),
                    output: String::new(),
                }
            }
        };

        debug!(
            "Running {} with {} arguments",
            executable.display(),
            args.len()
        );
        let spawned = Command::new(&executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return InvocationStatus {
                    exit: ExitCode::SpawnFailed(e.to_string()),
                    output: String::new(),
                }
            }
        };

        let exit = self.wait(&mut child, cancel);
        InvocationStatus {
            exit,
            output: Self::capture(sink),
        }
    }
}
