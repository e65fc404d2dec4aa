//! Concurrency tests: operations on one backup folder are serialized.
#![cfg(unix)]


use docdump::config::ConnectionCredentials;
use docdump::errors::{AppError, LockError};
use docdump::lock::FolderLock;
use docdump::ops::{package_locked, ArchiveFormat, BackupCatalog, BackupOrchestrator, BackupRequest};
use docdump::tool::{CancelFlag, ProcessTool};
use predicates::prelude::*;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use test_helpers::TestEnv;

/// Dump tool that creates its output, then holds on for a while.
const SLOW_DUMP_SCRIPT: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out/app"
echo slow > "$out/app/all.bson"
sleep 3
"#;

fn orchestrator(backup_dir: &Path, tool: &Path) -> BackupOrchestrator {
    let tool = tool.to_string_lossy().into_owned();
    BackupOrchestrator::new(
        backup_dir.to_path_buf(),
        Box::new(ProcessTool::new(tool.clone(), Duration::from_secs(30))),
        Box::new(ProcessTool::new(tool, Duration::from_secs(30))),
    )
}

/// Wait for a path to appear with timeout
fn wait_for_path(path: &Path, timeout: Duration) -> Result<(), String> {
    let start_time = Instant::now();
    while start_time.elapsed() < timeout {
        if path.exists() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(20));
    }
    Err(format!("{} did not appear within {:?}", path.display(), timeout))
}

#[test]
#[serial]
fn test_second_concurrent_run_is_rejected() {
    let env = TestEnv::new();
    let tool = env.install_tool("slowdump", SLOW_DUMP_SCRIPT);
    let backup_dir: PathBuf = env.backup_dir.clone();

    let first = {
        let backup_dir = backup_dir.clone();
        let tool = tool.clone();
        thread::spawn(move || {
            let request = BackupRequest::new(vec![], ArchiveFormat::Raw, "first");
            orchestrator(&backup_dir, &tool).run(
                &request,
                &ConnectionCredentials::default(),
                &CancelFlag::new(),
            )
        })
    };

    wait_for_path(&backup_dir.join("first.raw").join("app"), Duration::from_secs(10)).unwrap();

    let request = BackupRequest::new(vec![], ArchiveFormat::Raw, "second");
    let second = orchestrator(&backup_dir, &tool).run(
        &request,
        &ConnectionCredentials::default(),
        &CancelFlag::new(),
    );

    assert!(matches!(
        second,
        Err(AppError::Lock(LockError::ConcurrentOperationInProgress { .. }))
    ));
    assert!(!backup_dir.join("second.raw").exists());

    let first = first.join().unwrap().unwrap();
    assert!(first.succeeded);
    assert_eq!(first.total(), 1);
    assert!(backup_dir.join("first.raw").join("app").join("all.bson").exists());
}

#[test]
#[serial]
fn test_cancel_discards_partial_output() {
    let env = TestEnv::new();
    let tool = env.install_tool("slowdump", SLOW_DUMP_SCRIPT);
    let cancel = CancelFlag::new();

    let handle = {
        let backup_dir = env.backup_dir.clone();
        let tool = tool.clone();
        let cancel = cancel.clone();
        thread::spawn(move || {
            let request = BackupRequest::new(vec![], ArchiveFormat::Raw, "cancelled");
            orchestrator(&backup_dir, &tool).run(&request, &ConnectionCredentials::default(), &cancel)
        })
    };

    wait_for_path(
        &env.backup_dir.join("cancelled.raw").join("app"),
        Duration::from_secs(10),
    )
    .unwrap();
    cancel.cancel();

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(AppError::Cancelled)));
    assert!(!env.backup_dir.join("cancelled.raw").exists());

    // The lock was released on the way out.
    let request = BackupRequest::new(vec![], ArchiveFormat::Raw, "after");
    let quick = env.install_tool("mongodump", test_helpers::FAKE_DUMP_SCRIPT);
    let result = orchestrator(&env.backup_dir, &quick)
        .run(&request, &ConnectionCredentials::default(), &CancelFlag::new())
        .unwrap();
    assert!(result.succeeded);
}

#[test]
#[serial]
fn test_cli_delete_fails_fast_while_backup_runs() {
    let env = TestEnv::new();
    env.install_tool("mongodump", SLOW_DUMP_SCRIPT);
    env.write_backup("old.zip", b"old");

    let mut backup = std::process::Command::new(assert_cmd::cargo::cargo_bin("docdump"));
    backup
        .env_clear()
        .env("HOME", env.root.path())
        .env("DOCDUMP_BACKUP_DIR", &env.backup_dir)
        .env("DOCDUMP_DB_PATH", &env.db_path)
        .env("DOCDUMP_DUMP_TOOL", env.bin_dir.join("mongodump"))
        .args(["backup", "--format", "raw", "--name", "slow"]);
    if let Ok(path) = std::env::var("PATH") {
        backup.env("PATH", path);
    }
    let mut child = backup.spawn().unwrap();

    wait_for_path(&env.backup_dir.join("slow.raw").join("app"), Duration::from_secs(10)).unwrap();

    env.command()
        .args(["delete", "old.zip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));
    assert!(env.backup_dir.join("old.zip").exists());

    let status = child.wait().unwrap();
    assert!(status.success());

    env.command()
        .args(["delete", "old.zip"])
        .assert()
        .success();
}

#[test]
#[serial]
fn test_dump_stays_locked_until_packaged() {
    let env = TestEnv::new();
    let tool = env.install_tool("mongodump", test_helpers::FAKE_DUMP_SCRIPT);
    let catalog = BackupCatalog::new(&env.backup_dir);

    let lock = FolderLock::try_acquire(&env.backup_dir).unwrap();
    let request = BackupRequest::new(vec![], ArchiveFormat::Zip, "held");
    let result = orchestrator(&env.backup_dir, &tool)
        .run_locked(&request, &ConnectionCredentials::default(), &CancelFlag::new(), &lock)
        .unwrap();

    // Between dump and packaging the raw folder can't be deleted.
    match catalog.delete_many(&["held.raw".to_string()]) {
        Err(AppError::Lock(LockError::ConcurrentOperationInProgress { .. })) => {}
        other => panic!("Expected ConcurrentOperationInProgress, got {:?}", other),
    }

    let artifact = package_locked(&result, ArchiveFormat::Zip, &lock).unwrap();
    drop(lock);

    assert_eq!(artifact.path, env.backup_dir.join("held.zip"));
    assert_eq!(env.backup_names(), vec!["held.zip".to_string()]);
}
