//! Error taxonomy for talking to the torrent backend
//!
//! Every failure the tracker can observe falls in one of four buckets:
//! the connection itself, the HTTP/payload layer, the remote job, or the
//! local deadline. Only the first two are worth retrying.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the API client and the progress tracker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Network or connection failure
    #[error("Cannot connect to server: {0}")]
    Transport(String),

    /// Non-success HTTP status, rejected request, or malformed payload
    #[error("{0}")]
    Protocol(String),

    /// The job reached `error` on the backend
    #[error("Job failed: {0}")]
    RemoteJob(String),

    /// The local deadline passed before the job finished
    #[error("Timed out after {}s waiting for the torrent", .0.as_secs())]
    Timeout(Duration),

    /// `start` was called without a job id
    #[error("Job id must not be empty")]
    EmptyJobId,
}

impl TrackerError {
    /// Whether a polling loop may try again on its next cycle
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Transport(_) | TrackerError::Protocol(_))
    }

    /// Short machine-readable classification, used in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::Transport(_) => "transport",
            TrackerError::Protocol(_) => "protocol",
            TrackerError::RemoteJob(_) => "remote_job",
            TrackerError::Timeout(_) => "timeout",
            TrackerError::EmptyJobId => "invalid_input",
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TrackerError::Protocol(format!("Malformed response: {}", err))
        } else if err.is_timeout() {
            TrackerError::Transport("Request timeout: the server is not responding".to_string())
        } else {
            TrackerError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TrackerError::Transport("reset".into()).is_retryable());
        assert!(TrackerError::Protocol("HTTP 502".into()).is_retryable());
        assert!(!TrackerError::RemoteJob("yt-dlp failed".into()).is_retryable());
        assert!(!TrackerError::Timeout(Duration::from_secs(1800)).is_retryable());
        assert!(!TrackerError::EmptyJobId.is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        let err = TrackerError::Timeout(Duration::from_secs(1800));
        assert_eq!(err.to_string(), "Timed out after 1800s waiting for the torrent");
        assert_eq!(err.kind(), "timeout");
    }
}
