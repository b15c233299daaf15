//! CLI Command Tests
//!
//! Runs the `tubetorrent` binary against a mocked backend.
//! Covers JSON output format, exit codes, and input validation.

use std::path::Path;
use std::process::{Command, Output};

use mockito::Server;
use serde_json::Value;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Run the binary with an isolated config file and no inherited credentials
fn run(config: &Path, args: &[&str], backend: Option<&str>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tubetorrent"));
    cmd.arg("--json")
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("TUBETORRENT_API_URL")
        .env_remove("TUBETORRENT_API_KEY")
        .env_remove("RUST_LOG");
    if let Some(url) = backend {
        cmd.env("TUBETORRENT_API_URL", url)
            .env("TUBETORRENT_API_KEY", "test-key-1234");
    }
    cmd.output().expect("failed to run tubetorrent")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

/// The JSON error object from stderr (log lines may precede it)
fn stderr_json(output: &Output) -> Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let start = stderr.find('{').expect("no JSON on stderr");
    serde_json::from_str(&stderr[start..]).expect("stderr is not JSON")
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn test_config_set_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    let set = run(
        &config,
        &[
            "config",
            "set",
            "--api-url",
            "https://torrents.example.com/",
            "--api-key",
            "abcdefgh",
            "--transport",
            "streaming",
        ],
        None,
    );
    assert!(set.status.success());
    assert!(config.exists());

    let show = run(&config, &["config", "show"], None);
    assert_eq!(show.status.code(), Some(0));
    let json = stdout_json(&show);
    assert_eq!(json["data"]["api_url"], "https://torrents.example.com");
    assert_eq!(json["data"]["api_key"], "****efgh");
    assert_eq!(json["data"]["transport"], "streaming");
    assert_eq!(json["data"]["retry_budget"], 3);
}

#[test]
fn test_config_set_rejects_bad_url() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    let output = run(
        &config,
        &["config", "set", "--api-url", "ftp://nope", "--api-key", "k"],
        None,
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(!config.exists());
}

// =============================================================================
// Submit
// =============================================================================

#[test]
fn test_submit_invalid_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(
        &dir.path().join("config.toml"),
        &["submit", "https://example.com/video"],
        None,
    );

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["exit_code"], 2);
}

#[test]
fn test_submit_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&dir.path().join("config.toml"), &["submit", WATCH_URL], None);

    assert_eq!(output.status.code(), Some(4));
    let error = stderr_json(&output)["error"].as_str().unwrap_or_default().to_string();
    assert!(error.contains("config set"));
}

#[test]
fn test_submit_prints_job() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/api/add")
        .match_header("x-api-key", "test-key-1234")
        .with_status(200)
        .with_body(r#"{"success": true, "job_id": "j-42"}"#)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let output = run(
        &dir.path().join("config.toml"),
        &["submit", WATCH_URL],
        Some(&server.url()),
    );

    assert_eq!(output.status.code(), Some(0));
    let json = stdout_json(&output);
    assert_eq!(json["data"]["id"], "j-42");
    assert_eq!(json["data"]["source_url"], WATCH_URL);
    mock.assert();
}

#[test]
fn test_submit_auth_failure_is_network_error() {
    let mut server = Server::new();
    server.mock("POST", "/api/add").with_status(401).create();

    let dir = tempfile::tempdir().unwrap();
    let output = run(
        &dir.path().join("config.toml"),
        &["submit", WATCH_URL],
        Some(&server.url()),
    );

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(
        stderr_json(&output)["error"],
        "Authentication failed: Invalid API Key"
    );
}

// =============================================================================
// Track
// =============================================================================

#[test]
fn test_track_completed_job() {
    let mut server = Server::new();
    server
        .mock("GET", "/api/progress/j-7")
        .with_status(200)
        .with_body(r#"{"status": "complete", "torrent_url": "https://t.example/j7.torrent", "video_title": "Seven"}"#)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let output = run(
        &dir.path().join("config.toml"),
        &["track", "j-7"],
        Some(&server.url()),
    );

    assert_eq!(output.status.code(), Some(0));
    let json = stdout_json(&output);
    assert_eq!(json["data"]["url"], "https://t.example/j7.torrent");
    assert_eq!(json["data"]["title"], "Seven");
    assert_eq!(json["data"]["filename"], "Seven.torrent");
}

#[test]
fn test_track_failed_job() {
    let mut server = Server::new();
    server
        .mock("GET", "/api/progress/j-8")
        .with_status(200)
        .with_body(r#"{"status": "error", "error": "Video is private"}"#)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let output = run(
        &dir.path().join("config.toml"),
        &["track", "j-8"],
        Some(&server.url()),
    );

    assert_eq!(output.status.code(), Some(5));
    assert_eq!(stderr_json(&output)["error"], "Job failed: Video is private");
}

#[test]
fn test_track_with_deadline_times_out() {
    let mut server = Server::new();
    server
        .mock("GET", "/api/progress/j-9")
        .with_status(200)
        .with_body(r#"{"status": "queued"}"#)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let output = run(
        &dir.path().join("config.toml"),
        &["track", "j-9", "--deadline", "1"],
        Some(&server.url()),
    );

    assert_eq!(output.status.code(), Some(6));
}
