use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("valid json output")
}

#[test]
fn test_resolve_relative_offset() {
    let mut cmd = cargo_bin_cmd!("remind");
    let output = cmd
        .args([
            "resolve",
            "remind me in 2 hours",
            "--zone",
            "Asia/Kolkata",
            "--now",
            "2024-01-01T10:00:00Z",
            "--offline",
        ])
        .assert()
        .success()
        .get_output()
        .clone();

    let task = stdout_json(&output);
    assert_eq!(task["due_at_utc"], "2024-01-01T12:00:00Z");
    assert_eq!(task["source"], "rule");
    assert_eq!(task["timezone_name"], "Asia/Kolkata");
    assert_eq!(task["title"], "remind me in 2 hours");
}

#[test]
fn test_resolve_local_time_in_zone() {
    // 2024-01-15 10:00 EST; "today at 5am" is 05:00 EST = 10:00Z.
    let mut cmd = cargo_bin_cmd!("remind");
    let output = cmd
        .args([
            "resolve",
            "today at 5am",
            "--zone",
            "America/New_York",
            "--now",
            "2024-01-15T15:00:00Z",
            "--offline",
        ])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(stdout_json(&output)["due_at_utc"], "2024-01-15T10:00:00Z");
}

#[test]
fn test_resolve_without_time_exits_2() {
    let mut cmd = cargo_bin_cmd!("remind");
    let output = cmd
        .args([
            "resolve",
            "sometime next week when I'm free",
            "--zone",
            "UTC",
            "--now",
            "2024-01-01T10:00:00Z",
            "--offline",
        ])
        .assert()
        .code(2)
        .get_output()
        .clone();
    assert_eq!(stdout_json(&output)["kind"], "no_time_expression_found");
}

#[test]
fn test_resolve_unknown_zone_exits_2() {
    let mut cmd = cargo_bin_cmd!("remind");
    cmd.args(["resolve", "in 5 minutes", "--zone", "Moon/Tranquility", "--offline"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("timezone_resolution"));
}

#[test]
fn test_convert() {
    let mut cmd = cargo_bin_cmd!("remind");
    let output = cmd
        .args(["convert", "2024-07-01T12:00:00Z", "--zone", "Europe/Berlin"])
        .assert()
        .success()
        .get_output()
        .clone();
    let converted = stdout_json(&output);
    // CEST, UTC+2
    assert_eq!(converted["utc_offset"], "+02:00");
    assert_eq!(converted["dst_active"], true);
    assert_eq!(converted["local"], "2024-07-01T14:00:00+02:00");
}

#[test]
fn test_to_utc_spring_forward_gap() {
    // 02:30 does not exist on 2024-03-10 in New York; it reads as 03:30 EDT.
    let mut cmd = cargo_bin_cmd!("remind");
    cmd.args(["to-utc", "2024-03-10T02:30", "--zone", "America/New_York"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03-10T07:30:00Z"));
}

#[test]
fn test_to_utc_rejects_bad_input() {
    let mut cmd = cargo_bin_cmd!("remind");
    cmd.args(["to-utc", "tomorrow", "--zone", "UTC"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}

#[test]
fn test_listen_threads_stdin_lines() {
    let mut cmd = cargo_bin_cmd!("remind");
    cmd.args(["listen", "--zone", "UTC", "--offline"])
        .write_stdin("water the plants\ncaption: in 3 days\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\":\"water the plants in 3 days\""));
}

#[test]
fn test_bad_config_is_reported() {
    let dir = std::env::temp_dir().join(format!("remind-cli-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.toml");
    std::fs::write(&path, "[thread]\nwindow_ms = 0\n").unwrap();

    let mut cmd = cargo_bin_cmd!("remind");
    cmd.args(["resolve", "in 1 hour", "--zone", "UTC", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("window_ms"));
}
