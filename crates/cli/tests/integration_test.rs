use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn foehn(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_foehn"))
        .args(args)
        .env_remove("FOEHN_MASTER_ADDR")
        .env_remove("FOEHN_TIMEOUT_SECONDS")
        .output()
        .expect("Failed to run foehn")
}

#[test]
fn test_launch_two_workers() {
    let output = foehn(&["launch", "-n", "2", "--timeout-seconds", "30"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("WORKER_SUCCESS_RANK_0"));
    assert!(stdout.contains("WORKER_SUCCESS_RANK_1"));
    assert_eq!(stdout.matches("WORKER_CLEAN_EXIT").count(), 2);
}

#[test]
fn test_launch_single_worker() {
    let output = foehn(&["launch", "-n", "1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("WORKER_SUCCESS_RANK_0"));
}

#[test]
fn test_launch_reports_failing_child() {
    let output = foehn(&["launch", "-n", "2", "--", "false"]);

    assert!(!output.status.success());
}

#[test]
fn test_worker_without_launcher_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_foehn"))
        .arg("worker")
        .env_clear()
        .output()
        .expect("Failed to run foehn");

    assert_eq!(output.status.code(), Some(1));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("WORKER_SUCCESS"));
}

#[test]
fn test_wait_for_missing_key_times_out() {
    let start = Instant::now();
    let output = foehn(&["wait", "--key", "missing", "--timeout-seconds", "1"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_wait_for_present_key() {
    let output = foehn(&["wait", "--set", "x=A", "--key", "x", "--timeout-seconds", "1"]);

    assert!(output.status.success());
}
