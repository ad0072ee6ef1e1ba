//! E2E tests for `arbor sim`, `arbor config` and `arbor completions`.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn arbor_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("arbor"));
    cmd.current_dir(dir);
    cmd.env("ARBOR_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".user-config"));
    cmd.env_remove("FORMAT");
    cmd
}

// ---------------------------------------------------------------------------
// arbor sim
// ---------------------------------------------------------------------------

#[test]
fn sim_campaign_passes() {
    let dir = TempDir::new().unwrap();
    let output = arbor_cmd(dir.path())
        .args(["sim", "--seeds", "0..5", "--nodes", "6", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "sim failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let out: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(out["seeds_run"], 5);
    assert_eq!(out["seeds_passed"], 5);
    assert_eq!(out["all_passed"], true);
    assert!(out["first_failure"].is_null());
}

#[test]
fn sim_replay_lists_matching_fingerprints() {
    let dir = TempDir::new().unwrap();
    let output = arbor_cmd(dir.path())
        .args(["sim", "--replay", "3", "--trees", "2", "--observers", "2", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let out: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(out["seed"], 3);
    assert_eq!(out["oracle_passed"], true);
    let trees = out["fingerprints"].as_array().unwrap();
    assert_eq!(trees.len(), 2);
    for tree in trees {
        let prints = tree["fingerprints"].as_array().unwrap();
        assert_eq!(prints.len(), 2);
        assert_eq!(prints[0], prints[1]);
    }
}

#[test]
fn sim_rejects_empty_seed_range() {
    let dir = TempDir::new().unwrap();
    arbor_cmd(dir.path())
        .args(["sim", "--seeds", "4..4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty seed range"));
}

#[test]
fn sim_rejects_zero_observers() {
    let dir = TempDir::new().unwrap();
    arbor_cmd(dir.path())
        .args(["sim", "--seeds", "0..1", "--observers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("observers must be > 0"));
}

// ---------------------------------------------------------------------------
// arbor config
// ---------------------------------------------------------------------------

#[test]
fn config_defaults_without_file() {
    let dir = TempDir::new().unwrap();
    let output = arbor_cmd(dir.path()).args(["config", "--json"]).output().unwrap();
    assert!(output.status.success());

    let out: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(out["project"]["buffer"]["max_buffered_events"], 256);
    assert_eq!(out["project"]["pull"]["enabled"], false);
    assert_eq!(out["project"]["import"]["ack_timeout_ms"], 30_000);
    assert_eq!(out["resolved_output"], "json");
}

#[test]
fn config_reads_project_file() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".arbor")).unwrap();
    std::fs::write(
        dir.path().join(".arbor/config.toml"),
        "[buffer]\nmax_buffered_events = 8\n\n[pull]\nenabled = true\n",
    )
    .unwrap();

    arbor_cmd(dir.path())
        .args(["config", "--project"])
        .assert()
        .success()
        .stdout(predicate::str::contains("max_buffered_events = 8"))
        .stdout(predicate::str::contains("enabled = true"));
}

#[test]
fn broken_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".arbor")).unwrap();
    std::fs::write(dir.path().join(".arbor/config.toml"), "[buffer\n").unwrap();

    arbor_cmd(dir.path())
        .args(["config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse"));
}

#[test]
fn format_env_selects_json() {
    let dir = TempDir::new().unwrap();
    let output = arbor_cmd(dir.path())
        .env("FORMAT", "json")
        .args(["config"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let out: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(out["resolved_output"], "json");
}

// ---------------------------------------------------------------------------
// arbor completions
// ---------------------------------------------------------------------------

#[test]
fn completions_name_the_binary() {
    let dir = TempDir::new().unwrap();
    arbor_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_arbor"));
}
