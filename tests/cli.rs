use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command isolated from the user's config, state and log file
fn watchdog(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("token-watchdog").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("config.toml"))
        .arg("--state-file")
        .arg(dir.path().join("state.json"))
        .env("TOKEN_WATCHDOG_LOG_FILE", dir.path().join("watchdog.log"))
        .env_remove("TOKEN_WATCHDOG_STATE_FILE")
        .env_remove("RUST_LOG");
    cmd
}

fn write_state(dir: &TempDir, json: &str) {
    fs::write(dir.path().join("state.json"), json).unwrap();
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("token-watchdog").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("token-watchdog 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("token-watchdog").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Admission gate for tokens-per-minute limited APIs",
        ));
}

#[test]
fn test_cli_no_command_prints_usage() {
    let dir = TempDir::new().unwrap();
    watchdog(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("TPM Threshold: 900000"))
        .stdout(predicate::str::contains("Cooldown: 30s"));
}

#[test]
fn test_cli_check_fresh_state_allows() {
    let dir = TempDir::new().unwrap();
    watchdog(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"allowed\": true"))
        .stdout(predicate::str::contains("\"currentTPM\": 0"));
}

#[test]
fn test_cli_record_default_and_explicit() {
    let dir = TempDir::new().unwrap();
    watchdog(&dir)
        .arg("record")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recorded\": true"))
        .stdout(predicate::str::contains("\"tokens\": 4000"));

    watchdog(&dir)
        .args(["record", "1500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tokens\": 1500"));

    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("state.json")).unwrap()).unwrap();
    assert_eq!(state["history"].as_array().unwrap().len(), 2);

    watchdog(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"currentTPM\": 5500"))
        .stdout(predicate::str::contains("\"recentRequests\": 2"));
}

#[test]
fn test_cli_record_zero_counts_as_default() {
    let dir = TempDir::new().unwrap();
    watchdog(&dir)
        .args(["record", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tokens\": 4000"));

    watchdog(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"currentTPM\": 4000"));
}

#[test]
fn test_cli_verbose_reports_config_source() {
    let dir = TempDir::new().unwrap();
    watchdog(&dir)
        .args(["--verbose", "status"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Config file not found"));

    fs::write(dir.path().join("config.toml"), "[limits]\ncooldown_seconds = 10\n").unwrap();
    watchdog(&dir)
        .args(["--verbose", "status"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded configuration from"));
}

#[test]
fn test_cli_check_threshold_exceeded_then_cooldown() {
    let dir = TempDir::new().unwrap();
    let now = now_millis();
    let history: Vec<String> = (0..230)
        .map(|i| format!(r#"{{"time": {}, "tokens": 4000}}"#, now - 20_000 + i * 50))
        .collect();
    write_state(
        &dir,
        &format!(
            r#"{{"lastCheck": 0, "cooldownUntil": 0, "totalBlocked": 0, "history": [{}]}}"#,
            history.join(",")
        ),
    );

    watchdog(&dir)
        .arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("THRESHOLD_EXCEEDED"))
        .stdout(predicate::str::contains("\"cooldownSeconds\": 30"));

    watchdog(&dir)
        .arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("COOLDOWN_ACTIVE"))
        .stdout(predicate::str::contains("remainingSeconds"));

    watchdog(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"totalBlocked\": 1"))
        .stdout(predicate::str::contains("\"inCooldown\": true"));

    let log = fs::read_to_string(dir.path().join("watchdog.log")).unwrap();
    assert!(log.contains("TPM threshold reached"));
}

#[test]
fn test_cli_corrupt_state_degrades_to_default() {
    let dir = TempDir::new().unwrap();
    write_state(&dir, "{ definitely not json");

    watchdog(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"allowed\": true"))
        .stderr(predicate::str::contains("State load error"));
}

#[test]
fn test_cli_status_prometheus() {
    let dir = TempDir::new().unwrap();
    watchdog(&dir)
        .args(["status", "--format", "prometheus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("watchdog_estimated_tpm"));
}

#[test]
fn test_cli_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[limits]\ntpm_threshold = 2000000\n",
    )
    .unwrap();

    watchdog(&dir)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not exceed"));
}
