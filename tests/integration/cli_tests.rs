//! Integration tests for the CLI binary.
//!
//! Runs `ktrack` against temporary storage roots and key family dumps.
//!
//! This test is registered as a [[test]] in the keytrack-cli crate
//! so that CARGO_BIN_EXE_ktrack is available.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::{Command, Output};

use keytrack::crypto::keys::Ed25519KeyPair;
use keytrack::keyfamily::{DeviceKey, DeviceType};
use keytrack::storage::FileStatementStore;
use keytrack::tracking::{IdentityOutcome, StatementBuilder};
use keytrack::{StatementStore, Uid};

/// Get a Command pointing to the `ktrack` binary.
fn ktrack_binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ktrack"))
}

fn run(root: &Path, args: &[&str]) -> Output {
    ktrack_binary()
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("failed to execute ktrack")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Write two signed statements for `uid_t -> uid_a` under `root`.
fn seed_statements(root: &Path) {
    let store = FileStatementStore::new(root.join("statements")).unwrap();
    let signer = Ed25519KeyPair::generate();
    let outcome = IdentityOutcome {
        uid: Uid::new("uid_a"),
        username: "alice".into(),
        results: vec![],
        key_fingerprints: BTreeSet::new(),
    };
    let tracker = Uid::new("uid_t");
    let mut latest = None;
    for created_at in [1_000, 2_000] {
        let stmt = StatementBuilder::new(tracker.clone(), &outcome)
            .supersede(latest)
            .created_at(created_at)
            .sign(&signer.kid(), signer.signing_key())
            .unwrap();
        store.append(&stmt).unwrap();
        latest = Some(stmt.sequence_number);
    }
}

#[test]
fn cli_responds_to_help() {
    let output = ktrack_binary()
        .arg("--help")
        .output()
        .expect("failed to execute ktrack --help");

    assert!(
        output.status.success(),
        "ktrack --help should exit with success, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = stdout(&output);
    assert!(
        out.contains("ktrack") || out.contains("Usage"),
        "ktrack --help output should contain usage information, got: {out}"
    );
}

#[test]
fn cli_responds_to_version() {
    let output = ktrack_binary()
        .arg("--version")
        .output()
        .expect("failed to execute ktrack --version");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(
        out.contains("0.1") || out.contains("ktrack"),
        "ktrack --version should contain version info, got: {out}"
    );
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = ktrack_binary()
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute ktrack");

    assert!(
        !output.status.success(),
        "ktrack with unknown flag should exit with error"
    );
}

#[test]
fn cli_config_reflects_root_override() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["config"]);
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["storage"]["root"], dir.path().to_string_lossy().as_ref());
    assert_eq!(config["tracking"]["proof_attempts"], 3);
    assert_eq!(config["polling"]["max_attempts"], 10);
}

#[test]
fn cli_config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keytrack.json");
    std::fs::write(&path, br#"{ "polling": { "max_attempts": 4 } }"#).unwrap();

    let output = ktrack_binary()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .output()
        .expect("failed to execute ktrack");
    assert!(output.status.success());
    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["polling"]["max_attempts"], 4);
}

#[test]
fn cli_keys_check_reports_active_key() {
    let dir = tempfile::tempdir().unwrap();
    let eldest = DeviceKey::eldest(
        Ed25519KeyPair::generate().kid(),
        "laptop",
        DeviceType::Desktop,
        1,
    );
    let phone = DeviceKey::sibkey(
        Ed25519KeyPair::generate().kid(),
        "phone",
        DeviceType::Mobile,
        &eldest.kid,
        2,
    );
    let dump = serde_json::json!({
        "uid": "uid_a",
        "keys": [eldest, phone],
    });
    let file = dir.path().join("keys.json");
    std::fs::write(&file, serde_json::to_vec(&dump).unwrap()).unwrap();

    let output = run(dir.path(), &["keys", "check", file.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "keys check should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = stdout(&output);
    assert!(out.contains("2 key(s)"), "got: {out}");
    assert!(out.contains(&format!("Active signing key: {}", eldest.kid)), "got: {out}");
}

#[test]
fn cli_keys_check_rejects_corrupt_family() {
    let dir = tempfile::tempdir().unwrap();
    let eldest = DeviceKey::eldest(
        Ed25519KeyPair::generate().kid(),
        "laptop",
        DeviceType::Desktop,
        1,
    );
    let twin = DeviceKey::sibkey(
        Ed25519KeyPair::generate().kid(),
        "laptop",
        DeviceType::Desktop,
        &eldest.kid,
        2,
    );
    let dump = serde_json::json!({ "uid": "uid_a", "keys": [eldest, twin] });
    let file = dir.path().join("keys.json");
    std::fs::write(&file, serde_json::to_vec(&dump).unwrap()).unwrap();

    let output = run(dir.path(), &["keys", "check", file.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("laptop"), "got: {stderr}");
}

#[test]
fn cli_history_pairs_and_untrack() {
    let dir = tempfile::tempdir().unwrap();
    seed_statements(dir.path());

    let output = run(dir.path(), &["history", "uid_t", "uid_a"]);
    assert!(
        output.status.success(),
        "history should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = stdout(&output);
    assert!(out.contains("2 statement(s), tracking"), "got: {out}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("History: valid"));

    let output = run(dir.path(), &["history", "uid_t", "uid_a", "--json"]);
    let history: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(history.as_array().map(Vec::len), Some(2));

    let output = run(dir.path(), &["pairs"]);
    assert!(stdout(&output).contains("uid_t -> uid_a  #2  tracking"));

    let output = run(dir.path(), &["untrack", "uid_t", "uid_a"]);
    assert!(output.status.success());
    let output = run(dir.path(), &["pairs"]);
    assert!(stdout(&output).contains("untracked"));

    // A second untrack has nothing to clear.
    let output = run(dir.path(), &["untrack", "uid_t", "uid_a"]);
    assert!(!output.status.success());
}

#[test]
fn cli_history_of_unknown_pair_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["history", "uid_x", "uid_y"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no statements"));
}
