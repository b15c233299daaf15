//! CLI Command Handlers
//!
//! Implements all CLI commands by calling the backend client and tracker.
//! Each handler takes CLI args and Output, returns ExitCode.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;

use tubetorrent::tracker::{JobProgressTracker, ProgressObserver, TrackOutcome};
use tubetorrent::{ApiClient, Artifact, Config, ProgressSnapshot, TrackerError};

use crate::cli::{
    validate_watch_url, ConfigAction, ConfigCmd, ConfigSetCmd, ConfigView, CookiesCmd, ExitCode,
    GrabCmd, GrabResponse, Output, StatusOk, SubmitCmd, TrackCmd, TrackOptions,
};

// =============================================================================
// Progress Reporting
// =============================================================================

/// Prints progress lines to stderr
struct ConsoleObserver {
    output: Output,
}

impl ProgressObserver for ConsoleObserver {
    fn on_update(&mut self, snapshot: &ProgressSnapshot) {
        self.output.info(snapshot);
    }

    fn on_done(&mut self, artifact: &Artifact) {
        self.output.info(format!("Torrent URL: {}", artifact.url));
    }

    fn on_error(&mut self, error: &TrackerError) {
        tracing::debug!(kind = error.kind(), "Tracker reported failure");
    }
}

/// Build a client from config, reporting a config error on failure
fn client_or_exit(config: &Config, output: &Output) -> Result<ApiClient, ExitCode> {
    config
        .client()
        .map_err(|e| output.error(e.to_string(), ExitCode::ConfigError))
}

/// Track `job_id` until it finishes, fails, or the user hits Ctrl-C
async fn follow_job(
    client: ApiClient,
    job_id: &str,
    options: &TrackOptions,
    config: &Config,
    output: &Output,
) -> Result<Artifact, ExitCode> {
    let mode = options.transport_mode().unwrap_or_else(|| config.transport());
    let mut tracker_config = config.tracker_config();
    if let Some(secs) = options.deadline {
        tracker_config.deadline = Duration::from_secs(secs);
    }

    let tracker = JobProgressTracker::for_mode(client, mode, tracker_config);
    let mut handle = tracker
        .start(job_id, ConsoleObserver { output: *output })
        .map_err(|e| output.error(e.to_string(), ExitCode::for_error(&e)))?;

    output.info(format!("Tracking job {} ({})", job_id, mode));

    let finished = tokio::select! {
        outcome = handle.wait() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            handle.cancel();
            handle.wait().await
        }
    };

    match outcome {
        TrackOutcome::Completed(artifact) => Ok(artifact),
        TrackOutcome::Failed(e) => Err(output.error(e.to_string(), ExitCode::for_error(&e))),
        TrackOutcome::Cancelled => Err(output.error("Cancelled", ExitCode::Cancelled)),
    }
}

// =============================================================================
// Submit Command
// =============================================================================

pub async fn submit_cmd(cmd: SubmitCmd, config: &Config, output: &Output) -> ExitCode {
    if let Err(e) = validate_watch_url(&cmd.url) {
        return output.error(e, ExitCode::InvalidArgs);
    }
    let client = match client_or_exit(config, output) {
        Ok(client) => client,
        Err(code) => return code,
    };

    output.info(format!("Submitting: {}", cmd.url));

    match client.submit(cmd.url.trim()).await {
        Ok(job) => {
            if let Err(e) = output.print(&job) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(e.to_string(), ExitCode::for_error(&e)),
    }
}

// =============================================================================
// Track Command
// =============================================================================

pub async fn track_cmd(cmd: TrackCmd, config: &Config, output: &Output) -> ExitCode {
    let client = match client_or_exit(config, output) {
        Ok(client) => client,
        Err(code) => return code,
    };

    match follow_job(client, &cmd.job_id, &cmd.options, config, output).await {
        Ok(artifact) => {
            if let Err(e) = output.print(&artifact) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(code) => code,
    }
}

// =============================================================================
// Grab Command
// =============================================================================

pub async fn grab_cmd(cmd: GrabCmd, config: &Config, output: &Output) -> ExitCode {
    if let Err(e) = validate_watch_url(&cmd.url) {
        return output.error(e, ExitCode::InvalidArgs);
    }
    let client = match client_or_exit(config, output) {
        Ok(client) => client,
        Err(code) => return code,
    };

    output.info(format!("Submitting: {}", cmd.url));
    let job = match client.submit(cmd.url.trim()).await {
        Ok(job) => job,
        Err(e) => return output.error(e.to_string(), ExitCode::for_error(&e)),
    };

    let artifact = match follow_job(client.clone(), &job.id, &cmd.options, config, output).await {
        Ok(artifact) => artifact,
        Err(code) => return code,
    };

    let dir = cmd.out.unwrap_or_else(|| config.download_dir());
    match client.download_artifact(&artifact, &dir).await {
        Ok(path) => {
            output.info(format!("Saved {}", path.display()));
            let response = GrabResponse {
                job_id: job.id,
                title: artifact.title,
                torrent_url: artifact.url,
                path,
            };
            if let Err(e) = output.print(&response) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(format!("Download failed: {:#}", e), ExitCode::NetworkError),
    }
}

// =============================================================================
// Cookies Command
// =============================================================================

/// Read cookies from a file, or stdin for `-`
async fn read_cookies(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read cookies from stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

pub async fn cookies_cmd(cmd: CookiesCmd, config: &Config, output: &Output) -> ExitCode {
    let cookies = match read_cookies(&cmd.file).await {
        Ok(cookies) => cookies,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
    };
    let cookies = cookies.trim();
    if cookies.is_empty() {
        return output.error("Cookies file is empty", ExitCode::InvalidArgs);
    }

    let client = match client_or_exit(config, output) {
        Ok(client) => client,
        Err(code) => return code,
    };

    match client.upload_cookies(cookies).await {
        Ok(()) => {
            output.info("Cookies uploaded successfully!");
            if let Err(e) = output.print(StatusOk::default()) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(
            format!("Failed to upload cookies: {}", e),
            ExitCode::for_error(&e),
        ),
    }
}

// =============================================================================
// Config Command
// =============================================================================

fn config_view(config: &Config, path: Option<&Path>) -> ConfigView {
    let tracker = config.tracker_config();
    ConfigView {
        path: path.map(Path::to_path_buf).or_else(Config::path),
        api_url: config.api_url(),
        api_key: config.masked_key(),
        transport: config.transport(),
        poll_interval_ms: tracker.poll_interval.as_millis() as u64,
        deadline_secs: tracker.deadline.as_secs(),
        retry_budget: tracker.retry_budget,
        request_timeout_secs: config.request_timeout().as_secs(),
        download_dir: config.download_dir(),
    }
}

/// Apply `config set` flags to `config`
fn apply_settings(config: &mut Config, cmd: ConfigSetCmd) -> Result<(), String> {
    if cmd.api_url.is_some() || cmd.api_key.is_some() {
        let api_url = cmd.api_url.or_else(|| config.api_url.clone()).unwrap_or_default();
        let api_key = cmd.api_key.or_else(|| config.api_key.clone()).unwrap_or_default();
        config.set_credentials(&api_url, &api_key)?;
    }
    if let Some(transport) = cmd.transport {
        config.transport = Some(transport.into());
    }
    if let Some(dir) = cmd.download_dir {
        config.download_dir = Some(dir);
    }
    Ok(())
}

pub fn config_cmd(cmd: ConfigCmd, config: Config, path: Option<&Path>, output: &Output) -> ExitCode {
    let config = match cmd.action {
        ConfigAction::Show => config,
        ConfigAction::Set(set) => {
            let mut config = config;
            if let Err(e) = apply_settings(&mut config, set) {
                return output.error(e, ExitCode::InvalidArgs);
            }
            let saved = match path {
                Some(path) => config.save_to(path),
                None => config.save(),
            };
            if let Err(e) = saved {
                return output.error(format!("Failed to save config: {:#}", e), ExitCode::ConfigError);
            }
            output.info("Settings saved successfully!");
            config
        }
    };

    if let Err(e) = output.print(config_view(&config, path)) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubetorrent::TransportMode;

    fn set_cmd(api_url: Option<&str>, api_key: Option<&str>) -> ConfigSetCmd {
        ConfigSetCmd {
            api_url: api_url.map(str::to_string),
            api_key: api_key.map(str::to_string),
            transport: None,
            download_dir: None,
        }
    }

    #[test]
    fn test_apply_settings_merges_with_stored_key() {
        let mut config = Config {
            api_url: Some("https://old.example.com".into()),
            api_key: Some("stored-key".into()),
            ..Default::default()
        };
        apply_settings(&mut config, set_cmd(Some("https://new.example.com/"), None)).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("https://new.example.com"));
        assert_eq!(config.api_key.as_deref(), Some("stored-key"));
    }

    #[test]
    fn test_apply_settings_requires_key() {
        let mut config = Config::default();
        let err = apply_settings(&mut config, set_cmd(Some("https://t.example.com"), None));
        assert_eq!(err, Err("Please enter your API key".to_string()));
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_apply_settings_transport_only() {
        let mut config = Config::default();
        let mut cmd = set_cmd(None, None);
        cmd.transport = Some(crate::cli::TransportArg::Streaming);
        apply_settings(&mut config, cmd).unwrap();
        assert_eq!(config.transport(), TransportMode::Streaming);
        assert!(config.api_key.is_none());
    }

    #[tokio::test]
    async fn test_read_cookies_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "# Netscape HTTP Cookie File\n").unwrap();
        let cookies = read_cookies(&path).await.unwrap();
        assert!(cookies.starts_with("# Netscape"));

        assert!(read_cookies(&dir.path().join("missing.txt")).await.is_err());
    }
}
