//! Job progress tracking
//!
//! `JobProgressTracker` follows one backend job from submission to a
//! finished torrent (or a failure), reporting through a `ProgressObserver`.
//!
//! - `transport`: polling and streaming snapshot sources
//! - `state`: transition rules for incoming snapshots
//! - `sse`: event-stream decoding
//!
//! Observer calls are serialized and never happen after
//! [`TrackerHandle::cancel`] returns. Calling `cancel` from inside a
//! callback is allowed; the current callback finishes and no other follows.

pub mod sse;
pub mod state;
pub mod transport;

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::error::TrackerError;
use crate::models::{Artifact, ProgressSnapshot};

pub use state::{TrackerState, Transition};
pub use transport::{source_for, PollingSource, ProgressSource, StreamingSource, TransportMode};

/// Default polling period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default time allowed for a job to finish
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30 * 60);
/// Default number of consecutive polling failures tolerated
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Receives progress for one job
pub trait ProgressObserver: Send + 'static {
    /// A snapshot that differs from the previous one
    fn on_update(&mut self, snapshot: &ProgressSnapshot);
    /// The job finished; called at most once
    fn on_done(&mut self, artifact: &Artifact);
    /// The job failed, the transport gave up, or the deadline passed; called at most once
    fn on_error(&mut self, error: &TrackerError);
}

/// Tracker tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub deadline: Duration,
    pub retry_budget: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// How tracking ended
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Completed(Artifact),
    Failed(TrackerError),
    Cancelled,
}

/// Serializes observer calls against cancellation
#[derive(Clone)]
struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    emitting: Mutex<()>,
    closed: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

thread_local! {
    /// Address of the gate whose callback is running on this thread, or 0
    static IN_CALLBACK: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a gate's callback until dropped
struct CallbackScope {
    previous: usize,
}

impl CallbackScope {
    fn enter(gate: &Gate) -> Self {
        let previous = IN_CALLBACK.with(|c| c.replace(gate.id()));
        Self { previous }
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|c| c.set(self.previous));
    }
}

impl Gate {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let gate = Self {
            inner: Arc::new(GateInner {
                emitting: Mutex::new(()),
                closed: AtomicBool::new(false),
                cancel_tx,
            }),
        };
        (gate, cancel_rx)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner
            .emitting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` if the gate is still open
    fn emit(&self, f: impl FnOnce()) -> bool {
        let _guard = self.lock();
        if self.is_closed() {
            return false;
        }
        let _scope = CallbackScope::enter(self);
        f();
        true
    }

    /// Close the gate and run `f`, if it is still open
    fn finish(&self, f: impl FnOnce()) -> bool {
        let _guard = self.lock();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _scope = CallbackScope::enter(self);
        f();
        true
    }

    fn close(&self) {
        // Inside our own callback the lock is already held by this thread
        if IN_CALLBACK.with(Cell::get) == self.id() {
            self.inner.closed.store(true, Ordering::SeqCst);
        } else {
            let _guard = self.lock();
            self.inner.closed.store(true, Ordering::SeqCst);
        }
        self.inner.cancel_tx.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Control over a running tracker.
///
/// Dropping the handle cancels tracking.
pub struct TrackerHandle {
    gate: Gate,
    task: JoinHandle<TrackOutcome>,
}

impl TrackerHandle {
    /// Stop tracking. Idempotent; no observer call happens after this returns.
    pub fn cancel(&self) {
        self.gate.close();
    }

    /// Whether `cancel` was called or a terminal state was reported
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the tracking task to end.
    ///
    /// Must not be awaited again once it has returned.
    pub async fn wait(&mut self) -> TrackOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => TrackOutcome::Cancelled,
        }
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.gate.close();
    }
}

/// Tracks a single job through a `ProgressSource`
pub struct JobProgressTracker<S> {
    source: S,
    config: TrackerConfig,
}

impl JobProgressTracker<Box<dyn ProgressSource>> {
    /// Tracker using the transport selected by `mode`
    pub fn for_mode(client: ApiClient, mode: TransportMode, config: TrackerConfig) -> Self {
        let source = source_for(mode, client, config.poll_interval);
        Self::new(source, config)
    }
}

impl<S: ProgressSource + 'static> JobProgressTracker<S> {
    pub fn new(source: S, config: TrackerConfig) -> Self {
        Self { source, config }
    }

    /// Begin tracking `job_id` on a background task
    pub fn start<O: ProgressObserver>(
        self,
        job_id: &str,
        observer: O,
    ) -> Result<TrackerHandle, TrackerError> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(TrackerError::EmptyJobId);
        }

        let (gate, cancel_rx) = Gate::new();
        let task = tokio::spawn(self.drive(job_id.to_string(), observer, gate.clone(), cancel_rx));
        Ok(TrackerHandle { gate, task })
    }

    async fn drive<O: ProgressObserver>(
        mut self,
        job_id: String,
        mut observer: O,
        gate: Gate,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> TrackOutcome {
        let mut state = TrackerState::new();
        // `sleep` saturates instead of overflowing on huge deadlines
        let deadline = tokio::time::sleep(self.config.deadline);
        tokio::pin!(deadline);

        tracing::debug!(job_id = %job_id, "Tracking started");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel_rx.changed() => {
                    tracing::debug!(job_id = %job_id, "Tracking cancelled");
                    return TrackOutcome::Cancelled;
                }
                _ = &mut deadline => {
                    let error = TrackerError::Timeout(self.config.deadline);
                    tracing::error!(job_id = %job_id, elapsed = ?state.elapsed(), "Deadline exceeded");
                    state.abort(error.to_string());
                    return fail(&gate, &mut observer, error);
                }
                next = self.source.next_snapshot(&job_id) => next,
            };

            let snapshot = match next {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    let failures = state.record_failure();
                    if self.source.tolerates_failures()
                        && error.is_retryable()
                        && failures <= self.config.retry_budget
                    {
                        tracing::warn!(
                            job_id = %job_id,
                            attempt = failures,
                            budget = self.config.retry_budget,
                            error = %error,
                            "Progress check failed, will retry"
                        );
                        continue;
                    }

                    tracing::error!(job_id = %job_id, error = %error, "Giving up on job");
                    state.abort(error.to_string());
                    return fail(&gate, &mut observer, error);
                }
            };

            match state.apply(snapshot.clone()) {
                Transition::Unchanged | Transition::Ignored => {}
                Transition::Progressed => {
                    tracing::debug!(job_id = %job_id, status = %snapshot.status, "Progress");
                    if !gate.emit(|| observer.on_update(&snapshot)) {
                        return TrackOutcome::Cancelled;
                    }
                }
                Transition::Completed(artifact) => {
                    tracing::info!(job_id = %job_id, url = %artifact.url, "Torrent ready");
                    let delivered = gate.finish(|| {
                        observer.on_update(&snapshot);
                        observer.on_done(&artifact);
                    });
                    return if delivered {
                        TrackOutcome::Completed(artifact)
                    } else {
                        TrackOutcome::Cancelled
                    };
                }
                Transition::Failed(message) => {
                    tracing::error!(job_id = %job_id, error = %message, "Job failed on the backend");
                    let error = TrackerError::RemoteJob(message);
                    let delivered = gate.finish(|| {
                        observer.on_update(&snapshot);
                        observer.on_error(&error);
                    });
                    return if delivered {
                        TrackOutcome::Failed(error)
                    } else {
                        TrackOutcome::Cancelled
                    };
                }
            }
        }
    }
}

/// Report a local escalation and close the gate
fn fail<O: ProgressObserver>(gate: &Gate, observer: &mut O, error: TrackerError) -> TrackOutcome {
    if gate.finish(|| observer.on_error(&error)) {
        TrackOutcome::Failed(error)
    } else {
        TrackOutcome::Cancelled
    }
}
