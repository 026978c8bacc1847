//! Job identity and status as reported by the service.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Server-assigned job identifier.
pub type JobId = String;

/// Lifecycle status of a job.
///
/// The service reports freshly created jobs as `pending`; that value is
/// accepted as an alias of [`JobStatus::Queued`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "pending")]
    Queued,
    Running,
    Succeeded,
    Failed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl JobStatus {
    /// Whether the service will send no further updates for this job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record a client holds for one submitted job.
///
/// Decoded from the submission response; `progress` defaults to 0 when the
/// service omits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub status: JobStatus,
    /// Completion percentage (0-100).
    #[serde(default)]
    pub progress: u8,
}

impl JobHandle {
    /// Handle with zero progress.
    pub fn new(id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            status,
            progress: 0,
        }
    }
}

/// Full job record returned by `GET /api/jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDetail {
    pub id: JobId,
    pub status: JobStatus,
    /// Last line the service recorded for the job.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub progress: u8,
    /// Creation time in UTC (the service sends it without an offset).
    pub created_at: NaiveDateTime,
    /// Parameters echoed back as the service stored them.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One row of the admin job listing.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub message: Option<String>,
}

/// Envelope of `GET /api/admin/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobList {
    pub items: Vec<JobSummary>,
    pub count: usize,
}
