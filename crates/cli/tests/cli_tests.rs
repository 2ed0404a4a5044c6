//! CLI integration tests

use std::process::Command;

fn mlserve(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_mlserve"))
        .args(args)
        .env_remove("MLSERVE_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = mlserve(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Model Serving API"), "Should show app name");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("info"), "Should show info command");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("metrics"), "Should show metrics command");
    assert!(stdout.contains("smoke"), "Should show smoke command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = mlserve(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("mlserve"), "Should show binary name");
}

/// Test predict subcommand help
#[test]
fn test_predict_help() {
    let output = mlserve(&["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "predict help should succeed");
    assert!(stdout.contains("--feature"), "Should show feature option");
    assert!(stdout.contains("--input"), "Should show input option");
    assert!(stdout.contains("--model"), "Should show model option");
}

/// Test smoke subcommand help
#[test]
fn test_smoke_help() {
    let output = mlserve(&["smoke", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "smoke help should succeed");
    assert!(stdout.contains("--retries"), "Should show retries option");
    assert!(stdout.contains("--retry-delay"), "Should show retry delay option");
}

/// Test that an invalid output format is rejected
#[test]
fn test_invalid_format_rejected() {
    let output = mlserve(&["--format", "xml", "health"]);
    assert!(!output.status.success(), "Invalid format should fail");
}

/// Test that an unreachable server makes the command fail
#[test]
fn test_unreachable_server_fails() {
    let output = mlserve(&["--api-url", "http://127.0.0.1:9", "--timeout", "2", "health"]);
    assert!(!output.status.success(), "Unreachable server should fail");
}
