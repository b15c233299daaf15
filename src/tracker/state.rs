//! Tracker state machine
//!
//! Decides what a freshly received snapshot means for the job: a new
//! update, a repeat, a stale report, or one of the two terminal states.

use tokio::time::{Duration, Instant};

use crate::models::{Artifact, JobStatus, ProgressSnapshot};

/// Result of applying a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Identical to the last snapshot; nothing to report
    Unchanged,
    /// Older than the current status, or arrived after a terminal state
    Ignored,
    /// New non-terminal snapshot
    Progressed,
    /// Job finished with a torrent
    Completed(Artifact),
    /// Job failed on the backend
    Failed(String),
}

/// State owned by one tracker
#[derive(Debug)]
pub struct TrackerState {
    status: JobStatus,
    last: Option<ProgressSnapshot>,
    started: Instant,
    consecutive_failures: u32,
}

impl TrackerState {
    /// Fresh state: implicitly `Queued`, clock started now
    pub fn new() -> Self {
        Self {
            status: JobStatus::Queued,
            last: None,
            started: Instant::now(),
            consecutive_failures: 0,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn last(&self) -> Option<&ProgressSnapshot> {
        self.last.as_ref()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Apply a snapshot received from the transport
    pub fn apply(&mut self, snapshot: ProgressSnapshot) -> Transition {
        self.consecutive_failures = 0;

        if !self.status.can_transition_to(snapshot.status) {
            tracing::debug!(
                current = %self.status,
                received = %snapshot.status,
                "Ignoring out-of-order snapshot"
            );
            return Transition::Ignored;
        }

        if self.last.as_ref() == Some(&snapshot) {
            return Transition::Unchanged;
        }

        self.status = snapshot.status;
        let transition = match snapshot.status {
            JobStatus::Complete => match &snapshot.artifact {
                Some(artifact) => Transition::Completed(artifact.clone()),
                None => {
                    self.status = JobStatus::Error;
                    Transition::Failed("Job completed without a torrent URL".to_string())
                }
            },
            JobStatus::Error => Transition::Failed(
                snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            _ => Transition::Progressed,
        };
        self.last = Some(snapshot);
        transition
    }

    /// Count a failed fetch; returns the current streak
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// Force the terminal `Error` state after a local escalation
    pub fn abort(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Error;
        self.last = Some(ProgressSnapshot::failed(message));
    }
}

impl Default for TrackerState {
    fn default() -> Self {
        Self::new()
    }
}
