use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn keymirror_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("keymirror"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("KEYMIRROR_LOG_LEVEL")
        .env_remove("KEYMIRROR_MANIFESTS_DIR")
        .env_remove("KEYMIRROR_STORE_DIR")
        .env_remove("KEYMIRROR_POLL_INTERVAL_MS");
    cmd
}

fn write_store_document(home: &Path, key: &str, json: &str) {
    let path = home
        .join(".keymirror")
        .join("store")
        .join(format!("{key}.json"));
    fs::create_dir_all(path.parent().expect("parent")).expect("create store dir");
    fs::write(path, json).expect("write document");
}

#[test]
fn config_prints_defaults_under_home() {
    let home = TempDir::new().expect("home");
    keymirror_cmd(home.path())
        .arg("config")
        .assert()
        .success()
        .stdout(contains("poll_interval_ms: 1000"))
        .stdout(contains(".keymirror/manifests"));
}

#[test]
fn config_respects_explicit_file_and_env() {
    let home = TempDir::new().expect("home");
    let path = home.path().join("custom.yaml");
    fs::write(&path, "log_level: debug\npoll_interval_ms: 300\n").expect("write config");

    keymirror_cmd(home.path())
        .args(["--config", path.to_str().expect("utf8 path"), "config"])
        .env("KEYMIRROR_POLL_INTERVAL_MS", "75")
        .assert()
        .success()
        .stdout(contains("log_level: debug"))
        .stdout(contains("poll_interval_ms: 75"));
}

#[test]
fn invalid_config_fails_with_context() {
    let home = TempDir::new().expect("home");
    let path = home.path().join("broken.yaml");
    fs::write(&path, "unknown_key: 1\n").expect("write config");

    keymirror_cmd(home.path())
        .args(["--config", path.to_str().expect("utf8 path"), "config"])
        .assert()
        .failure()
        .stderr(contains("failed to load config"));
}

#[test]
fn inspect_prints_sorted_fields() {
    let home = TempDir::new().expect("home");
    write_store_document(home.path(), "default/app", r#"{"b": "2", "a": "1"}"#);

    keymirror_cmd(home.path())
        .args(["inspect", "default/app"])
        .assert()
        .success()
        .stdout("a=1\nb=2\n");
}

#[test]
fn inspect_json_output() {
    let home = TempDir::new().expect("home");
    write_store_document(home.path(), "default/app", r#"{"a": "1"}"#);

    let output = keymirror_cmd(home.path())
        .args(["inspect", "default/app", "--json"])
        .output()
        .expect("run inspect");
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(parsed, serde_json::json!({"a": "1"}));
}

#[test]
fn inspect_missing_resource_reports_no_fields() {
    let home = TempDir::new().expect("home");
    keymirror_cmd(home.path())
        .args(["inspect", "default/absent"])
        .assert()
        .success()
        .stdout(contains("no fields in store"));
}

#[test]
fn inspect_rejects_malformed_identity() {
    let home = TempDir::new().expect("home");
    keymirror_cmd(home.path())
        .args(["inspect", "no-slash"])
        .assert()
        .failure()
        .stderr(contains("invalid resource 'no-slash'"));
}
