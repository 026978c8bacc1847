//! Single source of truth for the tracked job.
//!
//! The [`Reconciler`] merges updates from the push channel and the output
//! poll into one view and hands out immutable [`JobSnapshot`]s. It performs
//! no I/O and knows nothing about tasks or sockets; the async tracker owns it
//! behind a mutex and feeds it.
//!
//! Every tracking session gets a new [`Generation`]. Updates are tagged with
//! the generation they were produced for and are rejected once that session
//! has been torn down, so a late result from a previous job can never leak
//! into the current one.

use serde::Serialize;

use crate::artifacts::OutputArtifact;
use crate::job::JobHandle;
use crate::log_buffer::LogBuffer;
use crate::progress::ProgressEvent;

/// Identifies one tracking session.
pub type Generation = u64;

/// Prefix of the log line recorded when a submission fails.
pub const SUBMISSION_FAILED_PREFIX: &str = "submission failed: ";

// ---------------------------------------------------------------------------
// Phase and snapshot
// ---------------------------------------------------------------------------

/// Where the reconciler is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerPhase {
    /// No job.
    #[default]
    Idle,
    /// A submission request is in flight.
    Submitting,
    /// A job is tracked and its channels are live.
    Tracking,
}

/// Immutable point-in-time view exposed to presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub phase: TrackerPhase,
    pub generation: Generation,
    pub job: Option<JobHandle>,
    /// Retained log tail, oldest first.
    pub logs: Vec<String>,
    /// Lines appended this session, including those evicted from `logs`.
    pub logs_appended: u64,
    pub artifacts: Vec<OutputArtifact>,
    /// Diagnostic text of the most recent failed submission.
    pub last_error: Option<String>,
}

impl JobSnapshot {
    /// The state before any submission.
    pub fn idle() -> Self {
        Self {
            phase: TrackerPhase::Idle,
            generation: 0,
            job: None,
            logs: Vec::new(),
            logs_appended: 0,
            artifacts: Vec::new(),
            last_error: None,
        }
    }

    /// True once the tracked job reported a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.job.as_ref().is_some_and(|j| j.status.is_terminal())
    }

    /// Progress of the tracked job, `None` when nothing is tracked.
    pub fn progress(&self) -> Option<u8> {
        self.job.as_ref().map(|j| j.progress)
    }
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Owns the state of at most one job.
#[derive(Debug, Default)]
pub struct Reconciler {
    phase: TrackerPhase,
    generation: Generation,
    job: Option<JobHandle>,
    logs: LogBuffer,
    artifacts: Vec<OutputArtifact>,
    last_error: Option<String>,
}

impl Reconciler {
    /// Idle reconciler at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    /// Generation of the latest submission. Events tagged with an older one
    /// are dropped.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The job being tracked, if any.
    pub fn job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    /// Whether updates tagged with `generation` would be accepted.
    pub fn is_tracking(&self, generation: Generation) -> bool {
        self.phase == TrackerPhase::Tracking && generation == self.generation
    }

    /// Start a new session: drop everything from the previous job and move
    /// to `Submitting`. Returns the generation the submission belongs to.
    pub fn begin_submission(&mut self) -> Generation {
        self.generation += 1;
        self.phase = TrackerPhase::Submitting;
        self.job = None;
        self.logs.clear();
        self.artifacts.clear();
        self.last_error = None;
        self.generation
    }

    /// Record the job created for `generation` and start tracking it.
    ///
    /// Returns `false` if the session was superseded while the request was
    /// in flight.
    pub fn submission_succeeded(&mut self, generation: Generation, job: JobHandle) -> bool {
        if generation != self.generation || self.phase != TrackerPhase::Submitting {
            return false;
        }
        self.job = Some(job);
        self.phase = TrackerPhase::Tracking;
        true
    }

    /// Return to `Idle` after a failed submission, keeping the diagnostic.
    pub fn submission_failed(&mut self, generation: Generation, diagnostic: &str) -> bool {
        if generation != self.generation || self.phase != TrackerPhase::Submitting {
            return false;
        }
        self.job = None;
        self.phase = TrackerPhase::Idle;
        self.logs.push(format!("{SUBMISSION_FAILED_PREFIX}{diagnostic}"));
        self.last_error = Some(diagnostic.to_string());
        true
    }

    /// Merge one push-channel event.
    ///
    /// Progress is assigned directly, the message is appended to the log
    /// tail and the status is replaced, each only when present. Returns
    /// whether the event was accepted.
    pub fn apply_progress(&mut self, generation: Generation, event: ProgressEvent) -> bool {
        if !self.is_tracking(generation) || event.is_empty() {
            return false;
        }
        let Some(job) = self.job.as_mut() else {
            return false;
        };
        if let Some(progress) = event.progress {
            job.progress = progress;
        }
        if let Some(status) = event.status {
            job.status = status;
        }
        if let Some(message) = event.message {
            self.logs.push(message);
        }
        true
    }

    /// Replace the artifact list wholesale with a fresh listing.
    pub fn replace_artifacts(
        &mut self,
        generation: Generation,
        artifacts: Vec<OutputArtifact>,
    ) -> bool {
        if !self.is_tracking(generation) {
            return false;
        }
        self.artifacts = artifacts;
        true
    }

    /// End the session and forget the job. Outstanding updates for the old
    /// generation are rejected from now on.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase = TrackerPhase::Idle;
        self.job = None;
        self.logs.clear();
        self.artifacts.clear();
        self.last_error = None;
    }

    /// Owned copy of the observable state.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            phase: self.phase,
            generation: self.generation,
            job: self.job.clone(),
            logs: self.logs.to_vec(),
            logs_appended: self.logs.appended(),
            artifacts: self.artifacts.clone(),
            last_error: self.last_error.clone(),
        }
    }
}
