//! End-to-end tests for the sheet-facing commands, running against the
//! in-memory transport (`MOCK_SHEETS=true`).

use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn tally_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
    cmd.env("TALLY_HOME", home)
        .env("MOCK_SHEETS", "true")
        .env_remove("SHEET_ID");
    cmd
}

#[test]
fn status_reports_never_synced_then_pending() {
    let home = TempDir::new().expect("home");

    tally_cmd(home.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(contains("NEVER SYNCED"));

    tally_cmd(home.path())
        .args(["receive", "BOLT-M8", "40"])
        .assert()
        .success();

    let assert = tally_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(report["state"], "never_synced");
    assert_eq!(report["ledger_seq"], 1);
}

#[test]
fn sync_commits_checkpoint_and_status_goes_current() {
    let home = TempDir::new().expect("home");

    tally_cmd(home.path())
        .args(["receive", "BOLT-M8", "40"])
        .assert()
        .success();

    tally_cmd(home.path())
        .args(["sync"])
        .assert()
        .success()
        .stdout(contains("Synced: 1 row(s) written"));

    assert!(home.path().join(".tally").join("checkpoint.json").exists());

    let assert = tally_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(report["state"], "current");
    assert_eq!(report["checkpoint_seq"], 1);
}

#[test]
fn dry_run_plans_without_committing() {
    let home = TempDir::new().expect("home");

    tally_cmd(home.path())
        .args(["receive", "BOLT-M8", "40"])
        .assert()
        .success();

    tally_cmd(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]").and(contains("1 row(s) would be written")));

    assert!(!home.path().join(".tally").join("checkpoint.json").exists());
}

#[test]
fn diff_shows_pending_rows_as_additions() {
    let home = TempDir::new().expect("home");

    tally_cmd(home.path())
        .args(["receive", "BOLT-M8", "40", "--name", "Bolt M8"])
        .assert()
        .success();

    let assert = tally_cmd(home.path()).args(["diff"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    assert!(
        stdout
            .lines()
            .any(|line| line.starts_with('+') && line.contains("BOLT-M8")),
        "expected an added diff line for the pending row"
    );
}

#[test]
fn diff_is_quiet_when_nothing_is_pending() {
    let home = TempDir::new().expect("home");

    tally_cmd(home.path())
        .args(["receive", "BOLT-M8", "40"])
        .assert()
        .success();
    tally_cmd(home.path()).args(["sync"]).assert().success();

    tally_cmd(home.path())
        .args(["diff"])
        .assert()
        .success()
        .stdout(contains("No differences."));
}

#[test]
fn sync_without_sheet_id_or_mock_fails_with_config_error() {
    let home = TempDir::new().expect("home");

    tally_cmd(home.path())
        .args(["receive", "BOLT-M8", "40"])
        .assert()
        .success();

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
    cmd.env("TALLY_HOME", home.path())
        .env_remove("MOCK_SHEETS")
        .env_remove("SHEET_ID");
    cmd.arg("sync").assert().failure().stderr(contains("SHEET_ID"));
}
