//! Client for the torrent backend
//!
//! - `client`: job submission, progress queries, cookie upload, torrent download

pub mod client;

pub use client::ApiClient;
