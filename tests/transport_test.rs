//! Transport Tests
//!
//! Runs the tracker end to end over the real polling and streaming sources
//! against a mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockito::Server;

use tubetorrent::tracker::{ProgressSource, StreamingSource, TrackOutcome};
use tubetorrent::{
    ApiClient, Artifact, JobProgressTracker, JobStatus, ProgressObserver, ProgressSnapshot,
    TrackerConfig, TrackerError, TransportMode,
};

#[derive(Clone, Default)]
struct Recorder {
    updates: Arc<Mutex<Vec<ProgressSnapshot>>>,
    done: Arc<Mutex<Vec<Artifact>>>,
    errors: Arc<Mutex<Vec<TrackerError>>>,
}

impl ProgressObserver for Recorder {
    fn on_update(&mut self, snapshot: &ProgressSnapshot) {
        self.updates.lock().unwrap().push(snapshot.clone());
    }

    fn on_done(&mut self, artifact: &Artifact) {
        self.done.lock().unwrap().push(artifact.clone());
    }

    fn on_error(&mut self, error: &TrackerError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

impl Recorder {
    fn statuses(&self) -> Vec<JobStatus> {
        self.updates.lock().unwrap().iter().map(|s| s.status).collect()
    }
}

fn fast_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(10),
        deadline: Duration::from_secs(10),
        ..Default::default()
    }
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test]
async fn test_polling_follows_job_to_completion() {
    let bodies = [
        r#"{"status": "queued"}"#,
        r#"{"status": "downloading", "progress": 50, "speed": 2.0, "eta": 61}"#,
        "not json",
        r#"{"status": "downloading", "progress": 50, "speed": 2.0, "eta": 61}"#,
        r#"{"status": "creating_torrent"}"#,
        r#"{"status": "complete", "url": "https://t.example/x.torrent", "title": "X"}"#,
    ];
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/progress/job-p")
        .with_status(200)
        .with_body_from_request(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            bodies[n.min(bodies.len() - 1)].as_bytes().to_vec()
        })
        .create_async()
        .await;

    let recorder = Recorder::default();
    let client = ApiClient::new(server.url(), "k");
    let mut handle = JobProgressTracker::for_mode(client, TransportMode::Polling, fast_config())
        .start("job-p", recorder.clone())
        .unwrap();

    let outcome = handle.wait().await;
    let TrackOutcome::Completed(artifact) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(artifact.title, "X");
    assert_eq!(artifact.url, "https://t.example/x.torrent");

    assert_eq!(
        recorder.statuses(),
        vec![
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::CreatingTorrent,
            JobStatus::Complete,
        ]
    );
    assert_eq!(recorder.done.lock().unwrap().len(), 1);
    assert!(recorder.errors.lock().unwrap().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_polling_gives_up_on_unreachable_backend() {
    let recorder = Recorder::default();
    let client = ApiClient::new("http://127.0.0.1:1", "k");
    let mut handle = JobProgressTracker::for_mode(client, TransportMode::Polling, fast_config())
        .start("job-x", recorder.clone())
        .unwrap();

    let outcome = handle.wait().await;
    assert!(matches!(outcome, TrackOutcome::Failed(TrackerError::Transport(_))));
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    assert!(recorder.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_polling_reports_remote_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/progress/job-e")
        .with_status(200)
        .with_body(r#"{"status": "error", "message": "Video unavailable"}"#)
        .create_async()
        .await;

    let recorder = Recorder::default();
    let client = ApiClient::new(server.url(), "k");
    let mut handle = JobProgressTracker::for_mode(client, TransportMode::Polling, fast_config())
        .start("job-e", recorder.clone())
        .unwrap();

    let expected = TrackerError::RemoteJob("Video unavailable".into());
    assert_eq!(handle.wait().await, TrackOutcome::Failed(expected.clone()));
    assert_eq!(*recorder.errors.lock().unwrap(), vec![expected]);
    assert_eq!(recorder.statuses(), vec![JobStatus::Error]);
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_streaming_follows_job_to_completion() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/progress/job-s")
        .match_header("accept", "text/event-stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            ": keep-alive\n\n",
            "data: {\"status\": \"queued\"}\n\n",
            "data: {\"status\": \"downloading\", \"percent\": 10, \"rate\": 1.5}\n\n",
            "data: {\"status\": \"downloading\", \"percent\": 10, \"rate\": 1.5}\n\n",
            "data: {\"status\": \"seeding\"}\n\n",
            "data: {\"status\": \"complete\", \"torrent_url\": \"https://t.example/s.torrent\", \"video_title\": \"S\"}\n\n",
        ))
        .expect(1)
        .create_async()
        .await;

    let recorder = Recorder::default();
    let client = ApiClient::new(server.url(), "k");
    let mut handle = JobProgressTracker::for_mode(client, TransportMode::Streaming, fast_config())
        .start("job-s", recorder.clone())
        .unwrap();

    assert!(matches!(handle.wait().await, TrackOutcome::Completed(ref a) if a.title == "S"));
    assert_eq!(
        recorder.statuses(),
        vec![
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::Seeding,
            JobStatus::Complete,
        ]
    );
    assert_eq!(recorder.done.lock().unwrap().len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_streaming_early_close_is_fatal() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/progress/job-c")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"status\": \"queued\"}\n\n",
            "data: {\"status\": \"downloading\", \"progress\": 5}\n\n",
        ))
        .expect(1)
        .create_async()
        .await;

    let recorder = Recorder::default();
    let client = ApiClient::new(server.url(), "k");
    let mut handle = JobProgressTracker::for_mode(client, TransportMode::Streaming, fast_config())
        .start("job-c", recorder.clone())
        .unwrap();

    let outcome = handle.wait().await;
    assert!(matches!(outcome, TrackOutcome::Failed(TrackerError::Transport(_))));
    assert_eq!(recorder.statuses(), vec![JobStatus::Queued, JobStatus::Downloading]);
    assert_eq!(recorder.errors.lock().unwrap().len(), 1);

    // No reconnect
    mock.assert_async().await;
}

#[tokio::test]
async fn test_streaming_source_rejects_bad_status() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/progress/job-401")
        .with_status(401)
        .create_async()
        .await;

    let mut source = StreamingSource::new(ApiClient::new(server.url(), "wrong"));
    let err = source.next_snapshot("job-401").await.unwrap_err();
    assert_eq!(
        err,
        TrackerError::Protocol("Authentication failed: Invalid API Key".into())
    );

    // The stream is never reopened
    let err = source.next_snapshot("job-401").await.unwrap_err();
    assert_eq!(err.kind(), "transport");
}
