//! Primitive service client library.
//!
//! Submits image-processing jobs over HTTP, listens to each job's progress
//! stream over WebSocket, polls its output listing, and reconciles both
//! channels into one snapshot via [`tracker::JobTracker`].

pub mod api;
pub mod config;
pub mod messages;
pub mod poller;
pub mod processor;
pub mod reconnect;
pub mod sink;
pub mod stream;
pub mod tracker;

pub use api::{ApiError, PrimitiveApi};
pub use config::ClientConfig;
pub use tracker::{JobTracker, TrackerError};
