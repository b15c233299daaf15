//! Configuration management for TubeTorrent
//!
//! Handles config file loading/saving and backend credentials.
//! Config is stored at ~/.config/tubetorrent/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_REQUEST_TIMEOUT;
use crate::api::ApiClient;
use crate::tracker::{TrackerConfig, TransportMode, DEFAULT_RETRY_BUDGET};

/// Environment variable overriding the backend URL
pub const API_URL_ENV: &str = "TUBETORRENT_API_URL";
/// Environment variable overriding the API key
pub const API_KEY_ENV: &str = "TUBETORRENT_API_KEY";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL, e.g. https://torrents.example.com
    pub api_url: Option<String>,
    /// Key sent in the X-API-Key header
    pub api_key: Option<String>,
    /// Polling or streaming progress updates
    pub transport: Option<TransportMode>,
    /// Polling period in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Give up on a job after this many seconds
    pub deadline_secs: Option<u64>,
    /// Consecutive polling failures tolerated
    pub retry_budget: Option<u32>,
    /// Timeout for one-shot backend requests, in seconds
    pub request_timeout_secs: Option<u64>,
    /// Where downloaded torrents go
    pub download_dir: Option<PathBuf>,
}

impl Config {
    /// Get config file path (~/.config/tubetorrent/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tubetorrent").join("config.toml"))
    }

    /// Load config from the default location, or defaults if not found
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    /// Load config from `path`, or defaults if missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| match toml::from_str(&s) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Backend URL: environment variable first, then config file
    pub fn api_url(&self) -> Option<String> {
        resolve(std::env::var(API_URL_ENV).ok(), self.api_url.as_deref())
    }

    /// API key: environment variable first, then config file
    pub fn api_key(&self) -> Option<String> {
        resolve(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }

    /// Both credentials, or an error telling the user to configure them
    pub fn credentials(&self) -> Result<(String, String)> {
        match (self.api_url(), self.api_key()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => anyhow::bail!(
                "Please configure the API URL and API key (tubetorrent config set --api-url <URL> --api-key <KEY>)"
            ),
        }
    }

    /// Client for the configured backend
    pub fn client(&self) -> Result<ApiClient> {
        let (url, key) = self.credentials()?;
        Ok(ApiClient::new(url, key).with_request_timeout(self.request_timeout()))
    }

    /// Store new credentials after validating them
    pub fn set_credentials(&mut self, api_url: &str, api_key: &str) -> Result<(), String> {
        let (api_url, api_key) = validate_credentials(api_url, api_key)?;
        self.api_url = Some(api_url);
        self.api_key = Some(api_key);
        Ok(())
    }

    pub fn transport(&self) -> TransportMode {
        self.transport.unwrap_or_default()
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        let defaults = TrackerConfig::default();
        TrackerConfig {
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            deadline: self
                .deadline_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.deadline),
            retry_budget: self.retry_budget.unwrap_or(DEFAULT_RETRY_BUDGET),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Download directory, defaulting to the user's downloads folder
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// API key with all but the last four characters hidden
    pub fn masked_key(&self) -> Option<String> {
        self.api_key().map(|key| mask(&key))
    }
}

fn resolve(env: Option<String>, stored: Option<&str>) -> Option<String> {
    let clean = |v: &str| Some(v.trim().to_string()).filter(|v| !v.is_empty());
    env.as_deref().and_then(clean).or_else(|| stored.and_then(clean))
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

/// Trim and check a URL/key pair; returns the cleaned values
pub fn validate_credentials(api_url: &str, api_key: &str) -> Result<(String, String), String> {
    let api_url = api_url.trim();
    let api_key = api_key.trim();

    if api_url.is_empty() {
        return Err("Please enter the API URL".to_string());
    }
    if api_key.is_empty() {
        return Err("Please enter your API key".to_string());
    }

    let parsed = url::Url::parse(api_url).map_err(|e| format!("Invalid API URL: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("API URL must start with http:// or https://".to_string());
    }

    Ok((api_url.trim_end_matches('/').to_string(), api_key.to_string()))
}
