//! Torrent backend client
//!
//! Submits watch pages, queries job progress (single request or event
//! stream), uploads cookies and fetches finished torrents. Every request
//! carries the `X-API-Key` header.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use reqwest::{header, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::models::{Artifact, Job, ProgressSnapshot};
use crate::tracker::sse;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Default timeout for one-shot requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(default)]
    success: bool,
    job_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CookiesRequest<'a> {
    cookies: &'a str,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    #[serde(default)]
    success: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Client for the torrent backend API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl ApiClient {
    /// Create a client for `base_url` (a trailing `/` is ignored)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the timeout used for one-shot requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn progress_url(&self, job_id: &str) -> String {
        format!(
            "{}/api/progress/{}",
            self.base_url,
            urlencoding::encode(job_id)
        )
    }

    /// Submit a watch page; returns the job the backend created
    pub async fn submit(&self, source_url: &str) -> Result<Job, TrackerError> {
        let response = self
            .client
            .post(format!("{}/api/add", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout)
            .json(&AddRequest { url: source_url })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: AddResponse = response
            .json()
            .await
            .map_err(|e| TrackerError::Protocol(format!("Malformed response from /api/add: {}", e)))?;

        if !body.success {
            return Err(TrackerError::Protocol(
                body.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        let job_id = body
            .job_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TrackerError::Protocol("Response is missing job_id".to_string()))?;

        tracing::info!(job_id = %job_id, url = %source_url, "Job submitted");
        Ok(Job::new(job_id, source_url))
    }

    /// Fetch the current progress of a job
    pub async fn progress(&self, job_id: &str) -> Result<ProgressSnapshot, TrackerError> {
        let response = self
            .client
            .get(self.progress_url(job_id))
            .header(API_KEY_HEADER, &self.api_key)
            .header(header::ACCEPT, "application/json")
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.text().await?;
        ProgressSnapshot::from_json(&sse::event_body(&body))
    }

    /// Open the long-lived progress event stream for a job
    pub async fn open_progress_stream(&self, job_id: &str) -> Result<Response, TrackerError> {
        let response = self
            .client
            .get(self.progress_url(job_id))
            .header(API_KEY_HEADER, &self.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        tracing::debug!(job_id = %job_id, status = %response.status(), "Progress stream opened");
        check_status(response).await
    }

    /// Upload browser cookies so the backend can fetch restricted videos
    pub async fn upload_cookies(&self, cookies: &str) -> Result<(), TrackerError> {
        let response = self
            .client
            .post(format!("{}/api/upload-cookies", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout)
            .json(&CookiesRequest { cookies })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: AckResponse = response.json().await?;
        if body.success {
            Ok(())
        } else {
            Err(TrackerError::Protocol(
                body.error.unwrap_or_else(|| "Upload failed".to_string()),
            ))
        }
    }

    /// Download a finished torrent into `dir`, returning the written path
    pub async fn download_artifact(&self, artifact: &Artifact, dir: &Path) -> anyhow::Result<PathBuf> {
        let response = self
            .client
            .get(&artifact.url)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("Failed to fetch torrent file")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Torrent download returned HTTP {}", status);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read torrent file")?;

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(&artifact.filename);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Torrent saved");
        Ok(path)
    }
}

/// Turn a non-success response into a protocol error
async fn check_status(response: Response) -> Result<Response, TrackerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error);
    Err(TrackerError::Protocol(status_message(status, detail.as_deref())))
}

/// Human-readable message for a failed HTTP status
pub fn status_message(status: StatusCode, detail: Option<&str>) -> String {
    let message = match status {
        StatusCode::UNAUTHORIZED => "Authentication failed: Invalid API Key".to_string(),
        StatusCode::NOT_FOUND => {
            "API endpoint not found. Please check the API URL configuration".to_string()
        }
        s if s.is_server_error() => "Server error: The API server encountered an error".to_string(),
        s => format!("Request failed with status: {}", s.as_u16()),
    };

    match detail.map(str::trim) {
        Some(detail) if !detail.is_empty() => format!("{} ({})", message, detail),
        _ => message,
    }
}
