//! Progress transports
//!
//! Both transports hand the tracker one normalized `ProgressSnapshot` at a
//! time; they differ only in how they get it and in whether a failure may
//! be retried.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tokio::time::{Interval, MissedTickBehavior};

use crate::api::ApiClient;
use crate::error::TrackerError;
use crate::models::ProgressSnapshot;
use crate::tracker::sse::SseDecoder;

/// Shortest polling period accepted
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Longest polling period accepted
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// How progress is obtained from the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// One request per period
    #[default]
    Polling,
    /// One long-lived event stream
    Streaming,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Polling => f.write_str("polling"),
            TransportMode::Streaming => f.write_str("streaming"),
        }
    }
}

/// A source of progress snapshots for a single job
#[async_trait]
pub trait ProgressSource: Send {
    /// Wait for and return the next snapshot for `job_id`
    async fn next_snapshot(&mut self, job_id: &str) -> Result<ProgressSnapshot, TrackerError>;

    /// Whether a failed call may be followed by another attempt
    fn tolerates_failures(&self) -> bool;
}

#[async_trait]
impl<S: ProgressSource + ?Sized> ProgressSource for Box<S> {
    async fn next_snapshot(&mut self, job_id: &str) -> Result<ProgressSnapshot, TrackerError> {
        (**self).next_snapshot(job_id).await
    }

    fn tolerates_failures(&self) -> bool {
        (**self).tolerates_failures()
    }
}

/// Build the source for `mode`
pub fn source_for(mode: TransportMode, client: ApiClient, poll_interval: Duration) -> Box<dyn ProgressSource> {
    match mode {
        TransportMode::Polling => Box::new(PollingSource::new(client, poll_interval)),
        TransportMode::Streaming => Box::new(StreamingSource::new(client)),
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Asks the backend for a snapshot once per period.
///
/// The first request goes out immediately.
pub struct PollingSource {
    client: ApiClient,
    period: Duration,
    interval: Option<Interval>,
}

impl PollingSource {
    pub fn new(client: ApiClient, period: Duration) -> Self {
        Self {
            client,
            period: period.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL),
            interval: None,
        }
    }
}

#[async_trait]
impl ProgressSource for PollingSource {
    async fn next_snapshot(&mut self, job_id: &str) -> Result<ProgressSnapshot, TrackerError> {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;

        self.client.progress(job_id).await
    }

    fn tolerates_failures(&self) -> bool {
        true
    }
}

// =============================================================================
// Streaming
// =============================================================================

/// Reads snapshots from a server-pushed event stream.
///
/// The connection is opened on the first call and never re-established.
pub struct StreamingSource {
    client: ApiClient,
    response: Option<Response>,
    opened: bool,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

impl StreamingSource {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            response: None,
            opened: false,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl ProgressSource for StreamingSource {
    async fn next_snapshot(&mut self, job_id: &str) -> Result<ProgressSnapshot, TrackerError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return ProgressSnapshot::from_json(&payload);
            }

            if self.response.is_none() {
                if self.opened {
                    return Err(TrackerError::Transport(
                        "Progress stream closed before the job finished".to_string(),
                    ));
                }
                self.opened = true;
                self.response = Some(self.client.open_progress_stream(job_id).await?);
            }
            let Some(response) = self.response.as_mut() else {
                continue;
            };

            let next = response.chunk().await;
            match next {
                Ok(Some(chunk)) => self.pending.extend(self.decoder.feed(&chunk)),
                Ok(None) => {
                    self.response = None;
                    self.pending.extend(self.decoder.finish());
                }
                Err(e) => {
                    self.response = None;
                    return Err(e.into());
                }
            }
        }
    }

    fn tolerates_failures(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mode_serde() {
        assert_eq!(
            serde_json::to_string(&TransportMode::Streaming).unwrap(),
            "\"streaming\""
        );
        assert_eq!(TransportMode::default(), TransportMode::Polling);
        assert_eq!(TransportMode::Streaming.to_string(), "streaming");
    }

    #[test]
    fn test_failure_policy_per_mode() {
        let client = ApiClient::new("http://localhost:1", "key");
        let polling = source_for(TransportMode::Polling, client.clone(), Duration::from_secs(1));
        let streaming = source_for(TransportMode::Streaming, client, Duration::from_secs(1));
        assert!(polling.tolerates_failures());
        assert!(!streaming.tolerates_failures());
    }

    #[test]
    fn test_poll_interval_bounds() {
        let client = ApiClient::new("http://localhost:1", "key");
        let source = PollingSource::new(client.clone(), Duration::ZERO);
        assert_eq!(source.period, MIN_POLL_INTERVAL);

        let source = PollingSource::new(client, Duration::MAX);
        assert_eq!(source.period, MAX_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_huge_poll_interval_first_tick_is_immediate() {
        let mut source = PollingSource::new(ApiClient::new("http://127.0.0.1:1", "key"), Duration::MAX);
        let err = source.next_snapshot("job").await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
