//! CLI Integration Tests
//!
//! These tests drive the `pkv` binary end-to-end against a temporary state
//! file and check its JSON output.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Run pkv and return (parsed stdout, stderr, success)
fn run_pkv(args: &[&str], state: &Path) -> (Value, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_pkv"))
        .arg("-s")
        .arg(state)
        .args(["-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute pkv");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let json = serde_json::from_str(stdout.trim()).unwrap_or(Value::Null);
    (
        json,
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn root_of(json: &Value) -> String {
    json["root"].as_str().unwrap().to_string()
}

// ============================================================================
// State file
// ============================================================================

#[test]
fn test_cli_init_creates_state_file() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");

    let (json, _stderr, success) = run_pkv(&["init"], &state);

    assert!(success, "init should succeed");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["hasher"], "blake3");
    assert!(state.exists(), "state file should be created");
}

#[test]
fn test_cli_default_state_path() {
    let output = Command::new(env!("CARGO_BIN_EXE_pkv"))
        .args(["--help"])
        .output()
        .expect("Failed to execute pkv");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("[default: state.pkv]"),
        "Default state path should be state.pkv, got: {}",
        stdout
    );
}

#[test]
fn test_cli_data_persists_across_invocations() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");

    let (put, _, success) = run_pkv(&["put", "0xA", "100"], &state);
    assert!(success);

    let (get, _, success) = run_pkv(&["get", "0xA"], &state);
    assert!(success);
    assert_eq!(get["value"], "100");
    assert_eq!(root_of(&get), root_of(&put));
}

// ============================================================================
// Key-value commands
// ============================================================================

#[test]
fn test_cli_get_missing_key_fails() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");
    run_pkv(&["init"], &state);

    let (json, _, success) = run_pkv(&["get", "nope"], &state);
    assert!(!success, "missing key should exit non-zero");
    assert_eq!(json["status"], "error");
}

#[test]
fn test_cli_delete_restores_root() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");

    run_pkv(&["put", "0xA", "100"], &state);
    let (before, _, _) = run_pkv(&["root"], &state);

    run_pkv(&["put", "0xB", "200"], &state);
    let (deleted, _, success) = run_pkv(&["delete", "0xB"], &state);
    assert!(success);
    assert_eq!(deleted["deleted"], true);
    assert_eq!(deleted["previous"], "200");
    assert_eq!(root_of(&deleted), root_of(&before));

    let (again, _, success) = run_pkv(&["delete", "0xB"], &state);
    assert!(success, "deleting an absent key is not an error");
    assert_eq!(again["deleted"], false);
}

#[test]
fn test_cli_list_with_prefix() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");

    run_pkv(&["put", "acct:alice", "10"], &state);
    run_pkv(&["put", "acct:bob", "20"], &state);
    run_pkv(&["put", "meta:version", "1"], &state);

    let (all, _, _) = run_pkv(&["list"], &state);
    assert_eq!(all["count"], 3);

    let (accounts, _, _) = run_pkv(&["list", "--prefix", "acct:"], &state);
    assert_eq!(accounts["count"], 2);
    assert_eq!(accounts["entries"][0]["key"], "acct:alice");
    assert_eq!(accounts["entries"][1]["value"], "20");
}

#[test]
fn test_cli_hex_keys() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");

    let (_, _, success) = run_pkv(&["--hex", "put", "0xdead", "beef"], &state);
    assert!(success);

    let (json, _, _) = run_pkv(&["--hex", "get", "dead"], &state);
    assert_eq!(json["value"], "beef");

    let (_, stderr, success) = run_pkv(&["--hex", "put", "xyz", "00"], &state);
    assert!(!success, "invalid hex should be rejected");
    assert!(stderr.contains("Invalid hex"));
}

#[test]
fn test_cli_insertion_order_does_not_matter() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.pkv");
    let second = dir.path().join("second.pkv");

    for (k, v) in [("0xA", "100"), ("0xB", "200"), ("0xC", "300")] {
        run_pkv(&["put", k, v], &first);
    }
    for (k, v) in [("0xC", "300"), ("0xA", "100"), ("0xB", "200")] {
        run_pkv(&["put", k, v], &second);
    }

    let (a, _, _) = run_pkv(&["root"], &first);
    let (b, _, _) = run_pkv(&["root"], &second);
    assert_eq!(root_of(&a), root_of(&b));
}

#[test]
fn test_cli_hasher_mismatch_is_rejected() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");
    run_pkv(&["put", "k", "v"], &state);

    let (_, stderr, success) = run_pkv(&["--hash", "sha256", "get", "k"], &state);
    assert!(!success);
    assert!(stderr.contains("Invalid state file"), "stderr: {}", stderr);
}

// ============================================================================
// Proofs
// ============================================================================

fn verify_args<'a>(proof: &'a Value, key: &'a str, value: Option<&'a str>) -> Vec<&'a str> {
    let mut args = vec!["verify", proof["root"].as_str().unwrap(), key];
    if let Some(v) = value {
        args.push(v);
    }
    for node in proof["nodes"].as_array().unwrap() {
        args.push("--node");
        args.push(node.as_str().unwrap());
    }
    args
}

#[test]
fn test_cli_prove_and_verify() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");
    for i in 0..20 {
        let key = format!("account-{}", i);
        let value = format!("balance {} with enough padding to be stored", i);
        run_pkv(&["put", &key, &value], &state);
    }

    let (proof, _, success) = run_pkv(&["prove", "account-7"], &state);
    assert!(success);
    let value = proof["value"].as_str().unwrap().to_string();

    let (json, _, success) = run_pkv(&verify_args(&proof, "account-7", Some(&value)), &state);
    assert!(success);
    assert_eq!(json["valid"], true);

    let (json, _, success) = run_pkv(&verify_args(&proof, "account-7", Some("forged")), &state);
    assert!(!success);
    assert_eq!(json["valid"], false);
}

#[test]
fn test_cli_exclusion_proof() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");
    run_pkv(&["put", "0xA", "100"], &state);
    run_pkv(&["put", "0xB", "200"], &state);

    let (proof, _, _) = run_pkv(&["prove", "0xZ"], &state);
    assert!(proof["value"].is_null());

    let (json, _, success) = run_pkv(&verify_args(&proof, "0xZ", None), &state);
    assert!(success);
    assert_eq!(json["valid"], true);
}

#[test]
fn test_cli_verify_rejects_malformed_root() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.pkv");
    run_pkv(&["put", "0xA", "100"], &state);

    let (_, stderr, success) = run_pkv(&["verify", "0xabcd", "0xA", "--node", "00"], &state);
    assert!(!success);
    assert!(stderr.contains("Invalid hash"), "stderr: {}", stderr);

    let (_, stderr, success) = run_pkv(&["verify", "not-a-hash", "0xA", "--node", "00"], &state);
    assert!(!success);
    assert!(stderr.contains("Invalid hash"), "stderr: {}", stderr);
}

// ============================================================================
// Demo
// ============================================================================

#[test]
fn test_cli_demo() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("unused.pkv");

    let (json, _, success) = run_pkv(&["demo"], &state);
    assert!(success);

    let steps = json["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["store"]["0xB"], "200");
    assert_eq!(steps[1]["store"]["0xB"], "250");
    assert_eq!(steps[1]["store"]["0xC"], "300");
    assert_ne!(steps[0]["root"], steps[1]["root"]);
    assert!(!state.exists(), "demo runs in memory");
}
