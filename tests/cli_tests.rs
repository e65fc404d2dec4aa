
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use test_helpers::TestEnv;

#[test]
fn test_cli_help_lists_commands() {
    let env = TestEnv::new();
    env.command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("collections"));
}

#[test]
fn test_cli_requires_a_command() {
    let env = TestEnv::new();
    env.command().assert().failure();
}

#[test]
#[serial]
fn test_cli_list_empty_folder() {
    let env = TestEnv::new();
    env.command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups"));
}

#[test]
#[serial]
fn test_cli_list_shows_backups_as_json() {
    let env = TestEnv::new();
    env.write_backup("test_backup_2024-01-15_093000.zip", b"zipbytes");
    fs::create_dir_all(env.backup_dir.join("raw_dump.raw").join("app")).unwrap();
    fs::write(env.backup_dir.join("raw_dump.raw").join("app").join("u.bson"), b"abc").unwrap();

    let output = env.command().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    let zip = records
        .iter()
        .find(|r| r["file_name"] == "test_backup_2024-01-15_093000.zip")
        .unwrap();
    assert_eq!(zip["size_bytes"], 8);
    assert_eq!(zip["kind"], "file");
    let raw = records.iter().find(|r| r["file_name"] == "raw_dump.raw").unwrap();
    assert_eq!(raw["kind"], "directory");
    assert_eq!(raw["size_bytes"], 3);
}

#[test]
#[serial]
fn test_cli_get_copies_backup() {
    let env = TestEnv::new();
    env.write_backup("nightly.zip", b"archive-bytes");
    let dest = env.root.path().join("download.zip");

    env.command()
        .args(["get", "nightly.zip", "--output"])
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("13 bytes"));

    assert_eq!(fs::read(&dest).unwrap(), b"archive-bytes");
}

#[test]
#[serial]
fn test_cli_get_missing_backup_is_not_found() {
    let env = TestEnv::new();
    env.command()
        .args(["get", "missing.zip", "-o"])
        .arg(env.root.path().join("out.zip"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
#[serial]
fn test_cli_delete_reports_counts_and_partial_exit() {
    let env = TestEnv::new();
    env.write_backup("a.zip", b"a");
    env.write_backup("b.zip", b"b");

    env.command()
        .args(["delete", "a.zip", "b.zip", "c.zip"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("2 of 3 files deleted"))
        .stdout(predicate::str::contains("c.zip (not found)"));

    assert!(env.backup_names().is_empty());

    env.command()
        .args(["delete", "a.zip", "b.zip", "c.zip"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("0 of 3 files deleted"));
}

#[test]
#[serial]
fn test_cli_delete_all_succeeded() {
    let env = TestEnv::new();
    env.write_backup("a.zip", b"a");

    env.command()
        .args(["delete", "a.zip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 1 files deleted"));
}

#[test]
#[serial]
fn test_cli_collections_lists_tables() {
    let env = TestEnv::new();
    env.seed_database(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY);
         INSERT INTO users (email) VALUES ('a@example.com'), ('b@example.com');",
    );

    let output = env
        .command()
        .args(["collections", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let stats = stats.as_array().unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0]["name"], "orders");
    assert_eq!(stats[0]["document_count"], 0);
    assert_eq!(stats[1]["name"], "users");
    assert_eq!(stats[1]["document_count"], 2);
    assert_eq!(stats[1]["engine"], "SQLite");
}

#[test]
#[serial]
fn test_cli_collections_without_database() {
    let env = TestEnv::new();
    env.command()
        .arg("collections")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unavailable"));
    assert!(!env.db_path.exists());
}

#[test]
#[serial]
fn test_cli_drop_counts_failures() {
    let env = TestEnv::new();
    env.seed_database("CREATE TABLE users (id INTEGER); CREATE TABLE orders (id INTEGER);");

    env.command()
        .args(["drop", "users", "ghosts"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("1 of 2 collections dropped"));

    assert_eq!(
        env.query_count("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'"),
        1
    );
}

#[test]
#[serial]
fn test_cli_invalid_port_is_config_error() {
    let env = TestEnv::new();
    env.command()
        .env("DOCDUMP_PORT", "not-a-port")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Port must be a number"));
}

#[test]
#[serial]
fn test_cli_relative_backup_dir_is_config_error() {
    let env = TestEnv::new();
    env.command()
        .env("DOCDUMP_BACKUP_DIR", "relative/backups")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("absolute path"));
}
