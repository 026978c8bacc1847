//! Decoded updates from the push channel.

use crate::job::JobStatus;

/// One decoded push-channel message.
///
/// Every field is independent: a message that only carries a log line must
/// not touch progress, and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Completion percentage (0-100).
    pub progress: Option<u8>,
    /// Free-text log line.
    pub message: Option<String>,
    /// Status announced by the service, typically on completion.
    pub status: Option<JobStatus>,
}

impl ProgressEvent {
    /// Event carrying only a progress value.
    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            ..Default::default()
        }
    }

    /// Event carrying only a log line.
    pub fn message(line: impl Into<String>) -> Self {
        Self {
            message: Some(line.into()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, line: impl Into<String>) -> Self {
        self.message = Some(line.into());
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True when applying the event would change nothing.
    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.message.is_none() && self.status.is_none()
    }
}

/// Convert a raw numeric progress value to a percentage.
///
/// Non-finite values yield `None`; everything else is rounded and clamped
/// to 0-100.
pub fn to_percent(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}
