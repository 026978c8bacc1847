//! Turns successive job snapshots into terminal lines.
//!
//! The snapshot channel only keeps the latest value, so the renderer diffs
//! each snapshot against the previous one it saw instead of assuming it
//! observed every update.

use primitive_core::artifacts::{frames, rendered_output};
use primitive_core::job::JobStatus;
use primitive_core::reconciler::{JobSnapshot, TrackerPhase};

/// Remembers the last snapshot it rendered so only changes are printed.
#[derive(Debug, Default)]
pub struct SnapshotRenderer {
    last: Option<JobSnapshot>,
}

impl SnapshotRenderer {
    /// A renderer that has not seen any snapshot yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines describing what changed since the previous call.
    pub fn render(&mut self, snapshot: &JobSnapshot) -> Vec<String> {
        let previous = match &self.last {
            Some(prev) if prev.generation == snapshot.generation => Some(prev),
            _ => None,
        };
        let mut lines = Vec::new();

        let prev_phase = previous.map(|p| p.phase);
        if prev_phase != Some(snapshot.phase) {
            match (snapshot.phase, &snapshot.job) {
                (TrackerPhase::Submitting, _) => lines.push("submitting job".to_string()),
                (TrackerPhase::Tracking, Some(job)) => {
                    lines.push(format!("job {} accepted ({})", job.id, job.status));
                }
                _ => {}
            }
        }

        let prev_appended = previous.map_or(0, |p| p.logs_appended);
        for line in new_log_lines(prev_appended, snapshot) {
            lines.push(format!("  | {line}"));
        }

        if let Some(job) = &snapshot.job {
            let prev_job = previous.and_then(|p| p.job.as_ref());
            if prev_job.map(|j| j.progress) != Some(job.progress) && job.progress > 0 {
                lines.push(format!("progress {}%", job.progress));
            }
            if prev_job.is_some_and(|j| j.status != job.status) {
                lines.push(format!("status {}", job.status));
            }
        }

        let prev_artifacts = previous.map(|p| p.artifacts.as_slice()).unwrap_or(&[]);
        if prev_artifacts != snapshot.artifacts.as_slice() && !snapshot.artifacts.is_empty() {
            let frame_count = frames(&snapshot.artifacts).len();
            let rendered = rendered_output(&snapshot.artifacts)
                .map(|a| format!(", rendered {a}"))
                .unwrap_or_default();
            lines.push(format!(
                "outputs: {} file(s), {frame_count} frame(s){rendered}",
                snapshot.artifacts.len()
            ));
        }

        if let Some(error) = &snapshot.last_error {
            if previous.and_then(|p| p.last_error.as_ref()) != Some(error) {
                lines.push(format!("error: {error}"));
            }
        }

        self.last = Some(snapshot.clone());
        lines
    }
}

/// Short label for the summary printed once the job settles.
pub fn outcome_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Succeeded => "finished",
        JobStatus::Failed => "failed",
        JobStatus::Canceled => "was canceled",
        JobStatus::Queued | JobStatus::Running => "is still in progress",
    }
}

/// Lines of `snapshot` appended after `prev_appended` lines had been seen.
///
/// Lines evicted from the tail before they could be seen are skipped.
fn new_log_lines(prev_appended: u64, snapshot: &JobSnapshot) -> &[String] {
    let fresh = snapshot.logs_appended.saturating_sub(prev_appended);
    let fresh = usize::try_from(fresh).unwrap_or(usize::MAX).min(snapshot.logs.len());
    &snapshot.logs[snapshot.logs.len() - fresh..]
}
