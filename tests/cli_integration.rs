//! CLI Integration Tests
//!
//! These tests run the built `claimtrie` binary against change logs written
//! through the library.

use claimtrie::{ClaimId, ClaimTrie, Config, Hash, OutPoint};
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Run claimtrie against `log` and return (stdout, stderr, success)
fn run_claimtrie(args: &[&str], log: &Path) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_claimtrie"))
        .arg("-l")
        .arg(log)
        .args(["-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute claimtrie");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn op(tag: &str) -> OutPoint {
    OutPoint::new(Hash::digest(tag.as_bytes()), 0)
}

/// Two blocks: "movie" and "music" claimed, then "movie" supported
fn seed(log: &Path) -> (ClaimId, Hash) {
    let mut trie = ClaimTrie::open(&Config::with_path(log)).unwrap();
    let a = trie.add_claim(b"movie", op("a"), 10, b"hello".to_vec()).unwrap();
    trie.add_claim(b"music", op("m"), 3, Vec::new()).unwrap();
    trie.commit(1).unwrap();
    trie.add_support(b"movie", op("s"), 5, a).unwrap();
    let root = trie.commit(2).unwrap();
    (a, root)
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

#[test]
fn test_cli_root() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("changes.log");
    let (_, root) = seed(&log);

    let (stdout, _stderr, success) = run_claimtrie(&["root"], &log);
    assert!(success, "root should succeed");
    let json = parse(&stdout);
    assert_eq!(json["height"], 2);
    assert_eq!(json["root"], root.to_hex());
    assert_eq!(json["names"], 2);
}

#[test]
fn test_cli_resolve() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("changes.log");
    let (a, _) = seed(&log);

    let (stdout, _stderr, success) = run_claimtrie(&["resolve", "movie"], &log);
    assert!(success, "resolve should succeed");
    let json = parse(&stdout);
    assert_eq!(json["state"], "active");
    assert_eq!(json["winner"]["claim_id"], a.to_hex());
    assert_eq!(json["winner"]["effective_amount"], 15);
    assert_eq!(json["winner"]["value"], hex::encode(b"hello"));

    let (stdout, _, _) = run_claimtrie(&["resolve", "movie", "--height", "1"], &log);
    assert_eq!(parse(&stdout)["winner"]["effective_amount"], 10);

    let (stdout, _, success) = run_claimtrie(&["resolve", "nothing"], &log);
    assert!(success);
    assert_eq!(parse(&stdout)["state"], "absent");
}

#[test]
fn test_cli_dump_and_names() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("changes.log");
    seed(&log);

    let (stdout, _, success) = run_claimtrie(&["dump", "movie"], &log);
    assert!(success, "dump should succeed");
    let json = parse(&stdout);
    assert_eq!(json["count"], 2);
    assert_eq!(json["changes"][0]["kind"], "add_claim");
    assert_eq!(json["changes"][1]["kind"], "add_support");

    let (stdout, _, _) = run_claimtrie(&["names", "--prefix", "mu"], &log);
    let json = parse(&stdout);
    assert_eq!(json["names"], serde_json::json!(["music"]));

    let (stdout, _, _) = run_claimtrie(&["names", "--limit", "1"], &log);
    assert_eq!(parse(&stdout)["count"], 1);
    let (stdout, _, success) = run_claimtrie(&["names", "--winners", "--prefix", "mo"], &log);
    assert!(success);
    let json = parse(&stdout);
    assert_eq!(json["count"], 1);
    assert_eq!(json["names"][0]["name"], "movie");
    assert_eq!(json["names"][0]["digest"].as_str().unwrap().len(), 64);
}

#[test]
fn test_cli_rollback() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("changes.log");
    seed(&log);

    let (stdout, _, success) = run_claimtrie(&["rollback", "1"], &log);
    assert!(success, "rollback should succeed");
    let json = parse(&stdout);
    assert_eq!(json["from"], 2);
    assert_eq!(json["height"], 1);

    let (stdout, _, _) = run_claimtrie(&["resolve", "movie"], &log);
    assert_eq!(parse(&stdout)["winner"]["effective_amount"], 10);
}

#[test]
fn test_cli_missing_log_fails() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("nope.log");

    let (_stdout, stderr, success) = run_claimtrie(&["root"], &log);
    assert!(!success, "root on a missing log should fail");
    assert!(stderr.contains("No change log"));
    assert!(!log.exists());
}

#[test]
fn test_cli_config() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("changes.log");

    let (stdout, _, success) = run_claimtrie(&["config"], &log);
    assert!(success);
    let json = parse(&stdout);
    assert_eq!(json["cache_limit"], 100_000);
    assert_eq!(json["activation_factor"], 32);
    assert_eq!(json["path"], log.display().to_string());
}
