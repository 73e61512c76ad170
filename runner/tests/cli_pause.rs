//! CLI tests for the pause control surface and basic queue commands.
//!
//! Spawns the runner binary and verifies the exit codes the outer run loop
//! depends on.

use std::process::{Command, Output};

use mission_runner::exit_codes;
use mission_runner::io::init::{InitOptions, init_missions};

fn runner(root: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mission-runner"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn mission-runner")
}

#[test]
fn pause_check_blocks_until_removed() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_missions(temp.path(), &InitOptions::default()).expect("init");

    let check = runner(temp.path(), &["pause", "check"]);
    assert_eq!(check.status.code(), Some(exit_codes::OK));

    let create = runner(
        temp.path(),
        &["pause", "create", "--reason", "manual", "--hours", "2"],
    );
    assert_eq!(create.status.code(), Some(exit_codes::OK));

    let check = runner(temp.path(), &["pause", "check"]);
    assert_eq!(check.status.code(), Some(exit_codes::BLOCKED));

    let status = runner(temp.path(), &["pause", "status"]);
    let json: serde_json::Value =
        serde_json::from_slice(&status.stdout).expect("pause status is json");
    assert_eq!(json["paused"], true);
    assert_eq!(json["reason"], "manual");

    let remove = runner(temp.path(), &["pause", "remove"]);
    assert_eq!(remove.status.code(), Some(exit_codes::OK));
    let check = runner(temp.path(), &["pause", "check"]);
    assert_eq!(check.status.code(), Some(exit_codes::OK));
}

#[test]
fn quota_pause_from_reset_text() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_missions(temp.path(), &InitOptions::default()).expect("init");

    let create = runner(
        temp.path(),
        &["pause", "create", "--reason", "quota", "--text", "try again in 3h"],
    );
    assert_eq!(create.status.code(), Some(exit_codes::OK));

    let status = runner(temp.path(), &["pause", "status"]);
    let json: serde_json::Value = serde_json::from_slice(&status.stdout).expect("json");
    assert_eq!(json["reason"], "quota");
    let remaining = json["remaining_secs"].as_i64().expect("remaining");
    assert!(remaining > 2 * 3600 && remaining <= 3 * 3600);
}

#[test]
fn queue_commands_edit_the_ledger() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(
        runner(temp.path(), &["init"]).status.code(),
        Some(exit_codes::OK)
    );
    assert_eq!(
        runner(temp.path(), &["add", "--project", "web", "fix", "login"])
            .status
            .code(),
        Some(exit_codes::OK)
    );
    assert_eq!(
        runner(temp.path(), &["idea", "try", "caching"]).status.code(),
        Some(exit_codes::OK)
    );
    assert_eq!(
        runner(temp.path(), &["promote", "1"]).status.code(),
        Some(exit_codes::OK)
    );

    let list = runner(temp.path(), &["list"]);
    let stdout = String::from_utf8_lossy(&list.stdout);
    assert!(stdout.contains("Pending (2):"), "{stdout}");
    assert!(stdout.contains("1. [web] fix login"), "{stdout}");
    assert!(stdout.contains("2. try caching"), "{stdout}");

    let status = runner(temp.path(), &["status"]);
    let json: serde_json::Value = serde_json::from_slice(&status.stdout).expect("json");
    assert_eq!(json["ledger"]["pending"], 2);
    assert_eq!(json["next"], "fix login");
}

#[test]
fn recurring_admin_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_missions(temp.path(), &InitOptions::default()).expect("init");

    let add = runner(
        temp.path(),
        &["recurring", "add", "--frequency", "daily", "review", "logs"],
    );
    assert_eq!(add.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&add.stdout).contains("added r1"));

    let disable = runner(temp.path(), &["recurring", "disable", "r1"]);
    assert_eq!(disable.status.code(), Some(exit_codes::OK));
    let list = runner(temp.path(), &["recurring", "list"]);
    assert!(String::from_utf8_lossy(&list.stdout).contains("r1 daily disabled review logs"));

    let missing = runner(temp.path(), &["recurring", "remove", "r9"]);
    assert_eq!(missing.status.code(), Some(exit_codes::ERROR));
}

#[test]
fn uninitialised_root_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = runner(temp.path(), &["list"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&output.stderr).contains("mission-runner init"));
}
