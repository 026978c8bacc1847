//! Domain types and job-state reconciliation for the primitive job client.
//!
//! Nothing in this crate performs I/O. The async client crate drives the
//! [`reconciler::Reconciler`] from its stream listener and output poller.

pub mod artifacts;
pub mod error;
pub mod job;
pub mod log_buffer;
pub mod params;
pub mod progress;
pub mod reconciler;
