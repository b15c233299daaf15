//! Data models for torrent jobs
//!
//! - `Job`: a submitted watch page
//! - `JobStatus`: lifecycle of a job on the backend
//! - `ProgressSnapshot`: one normalized progress report
//! - `Artifact`: the finished torrent

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

// =============================================================================
// Job
// =============================================================================

/// A job accepted by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque id assigned by the backend
    pub id: String,
    /// Watch page that was submitted
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job {} ({})", self.id, self.source_url)
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Backend job lifecycle
///
/// Ordered `Queued → Downloading → CreatingTorrent → Seeding → Complete`;
/// `Error` can follow any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Downloading,
    CreatingTorrent,
    Seeding,
    Complete,
    Error,
}

impl JobStatus {
    /// Position along the happy path
    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 1,
            JobStatus::CreatingTorrent => 2,
            JobStatus::Seeding => 3,
            JobStatus::Complete => 4,
            JobStatus::Error => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    /// Whether a snapshot with status `next` may follow this status.
    ///
    /// Same-status snapshots are allowed (numbers move within a phase).
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Error || next.rank() >= self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "Queued",
            JobStatus::Downloading => "Downloading",
            JobStatus::CreatingTorrent => "Creating torrent",
            JobStatus::Seeding => "Seeding",
            JobStatus::Complete => "Complete",
            JobStatus::Error => "Error",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Artifact
// =============================================================================

/// A finished torrent ready for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the .torrent file can be fetched
    pub url: String,
    /// Video title reported by the backend
    pub title: String,
    /// Filesystem-safe name to save the torrent under
    pub filename: String,
}

impl Artifact {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            url: url.into(),
            filename: suggested_filename(&title),
            title,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.title, self.url)
    }
}

/// `"<title>.torrent"` with characters that are unsafe on any platform removed
pub fn suggested_filename(title: &str) -> String {
    let cleaned = sanitize_filename::sanitize(title.trim());
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "torrent.torrent".to_string()
    } else {
        format!("{}.torrent", cleaned)
    }
}

// =============================================================================
// Progress Snapshot
// =============================================================================

/// One progress report for a job
///
/// `artifact` is only set for `Complete`, `error` only for `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    /// Percent complete, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Transfer rate in MB/s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_mbps: Option<f64>,
    /// Estimated seconds remaining
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot as the backend sends it
#[derive(Debug, Deserialize)]
struct WireSnapshot {
    status: JobStatus,
    #[serde(default, alias = "percent")]
    progress: Option<f64>,
    #[serde(default, alias = "rate")]
    speed: Option<f64>,
    #[serde(default)]
    eta: Option<f64>,
    #[serde(default, alias = "url")]
    torrent_url: Option<String>,
    #[serde(default, alias = "title")]
    video_title: Option<String>,
    #[serde(default, alias = "message")]
    error: Option<String>,
}

impl ProgressSnapshot {
    /// Snapshot with only a status
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            percent: None,
            rate_mbps: None,
            eta_secs: None,
            artifact: None,
            error: None,
        }
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn with_rate(mut self, rate_mbps: f64) -> Self {
        self.rate_mbps = Some(rate_mbps);
        self
    }

    pub fn with_eta(mut self, eta_secs: f64) -> Self {
        self.eta_secs = Some(eta_secs);
        self
    }

    /// Terminal `Complete` snapshot
    pub fn complete(artifact: Artifact) -> Self {
        Self {
            percent: Some(100.0),
            artifact: Some(artifact),
            ..Self::new(JobStatus::Complete)
        }
    }

    /// Terminal `Error` snapshot
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(JobStatus::Error)
        }
    }

    /// Parse a backend JSON snapshot
    pub fn from_json(payload: &str) -> Result<Self, TrackerError> {
        let wire: WireSnapshot = serde_json::from_str(payload.trim())
            .map_err(|e| TrackerError::Protocol(format!("Malformed progress payload: {}", e)))?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: WireSnapshot) -> Result<Self, TrackerError> {
        let mut snapshot = ProgressSnapshot::new(wire.status);
        snapshot.percent = finite(wire.progress).map(|p| p.clamp(0.0, 100.0));
        snapshot.rate_mbps = finite(wire.speed);
        snapshot.eta_secs = finite(wire.eta);

        match wire.status {
            JobStatus::Complete => {
                let url = wire
                    .torrent_url
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        TrackerError::Protocol("Complete snapshot is missing torrent_url".into())
                    })?;
                let title = wire.video_title.unwrap_or_default();
                snapshot.artifact = Some(Artifact::new(url, title));
            }
            JobStatus::Error => {
                let message = wire
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                snapshot.error = Some(message);
            }
            _ => {}
        }

        Ok(snapshot)
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Downloading => write!(
                f,
                "Downloading {} ({}, ETA {})",
                format_percent(self.percent),
                format_rate(self.rate_mbps),
                format_eta(self.eta_secs)
            ),
            JobStatus::CreatingTorrent => write!(f, "Creating torrent..."),
            JobStatus::Seeding => write!(f, "Seeding"),
            JobStatus::Complete => match &self.artifact {
                Some(artifact) => write!(f, "Torrent ready: {}", artifact.title),
                None => write!(f, "Torrent ready"),
            },
            JobStatus::Error => write!(
                f,
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            ),
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Missing, negative and non-finite values all count as zero
fn positive_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(0.0)
}

/// Seconds remaining as `"2m 5s"`, or `"45s"` under a minute
pub fn format_eta(secs: Option<f64>) -> String {
    let total = positive_or_zero(secs).round() as u64;
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Transfer rate with one decimal, e.g. `"1.5 MB/s"`
pub fn format_rate(mbps: Option<f64>) -> String {
    format!("{:.1} MB/s", positive_or_zero(mbps))
}

/// Percent with one decimal, capped at 100
pub fn format_percent(percent: Option<f64>) -> String {
    format!("{:.1}%", positive_or_zero(percent).min(100.0))
}
