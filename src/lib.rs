//! TubeTorrent - turn video watch pages into torrents
//!
//! Submits a watch page to a remote seeding backend, follows the job until
//! the torrent is ready, and fetches the `.torrent` file.
//!
//! # Modules
//!
//! - `models` - Jobs, progress snapshots, artifacts, formatting
//! - `error` - Failure taxonomy shared by client and tracker
//! - `api` - Backend HTTP client
//! - `tracker` - Job progress tracking over polling or streaming
//! - `config` - Settings file and environment overrides

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod tracker;

// Re-export commonly used types
pub use models::{Artifact, Job, JobStatus, ProgressSnapshot};
pub use error::TrackerError;

pub use api::ApiClient;
pub use config::Config;
pub use tracker::{
    JobProgressTracker, ProgressObserver, ProgressSource, TrackOutcome, TrackerConfig,
    TrackerHandle, TransportMode,
};
