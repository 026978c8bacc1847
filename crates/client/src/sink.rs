//! Destination for updates produced by the stream listener and the
//! output poller.
//!
//! [`JobTracker`](crate::tracker::JobTracker) implements the trait on top of
//! the reconciler; [`ChannelSink`] forwards raw updates to an mpsc channel
//! for callers that want to consume them directly.

use async_trait::async_trait;
use primitive_core::artifacts::OutputArtifact;
use primitive_core::job::JobId;
use primitive_core::progress::ProgressEvent;
use tokio::sync::mpsc;

/// Receives decoded updates for one job.
#[async_trait]
pub trait JobUpdateSink: Send + Sync {
    /// A push-channel message was decoded.
    async fn on_progress(&self, event: ProgressEvent);

    /// A listing pull succeeded; `files` is the complete current set.
    async fn on_artifacts(&self, files: Vec<OutputArtifact>);
}

/// An update as forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Progress {
        job_id: JobId,
        event: ProgressEvent,
    },
    Artifacts {
        job_id: JobId,
        files: Vec<OutputArtifact>,
    },
}

/// Forwards every update, tagged with the job id, to an unbounded channel.
///
/// Updates sent after the receiver was dropped are discarded.
pub struct ChannelSink {
    job_id: JobId,
    tx: mpsc::UnboundedSender<JobUpdate>,
}

impl ChannelSink {
    /// Sink for `job_id` and the receiving end of its channel.
    pub fn new(job_id: impl Into<JobId>) -> (Self, mpsc::UnboundedReceiver<JobUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                job_id: job_id.into(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl JobUpdateSink for ChannelSink {
    async fn on_progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(JobUpdate::Progress {
            job_id: self.job_id.clone(),
            event,
        });
    }

    async fn on_artifacts(&self, files: Vec<OutputArtifact>) {
        let _ = self.tx.send(JobUpdate::Artifacts {
            job_id: self.job_id.clone(),
            files,
        });
    }
}
