//! Job state tracker.
//!
//! [`JobTracker`] owns at most one job at a time together with its progress
//! stream subscription and output poller. Both channels feed the shared
//! [`Reconciler`]; every accepted update republishes an immutable
//! [`JobSnapshot`] on a [`tokio::sync::watch`] channel.
//!
//! Teardown (re-submit, [`JobTracker::stop_polling`], [`JobTracker::reset`],
//! drop) cancels the affected channel while holding the reconciler lock, and
//! every update checks its channel's token under that same lock. An update
//! that was in flight during teardown is therefore discarded, never applied.

use std::sync::Arc;

use async_trait::async_trait;
use primitive_core::artifacts::OutputArtifact;
use primitive_core::error::CoreError;
use primitive_core::job::{JobHandle, JobId};
use primitive_core::params::{validate_upload_filename, JobParameters};
use primitive_core::progress::ProgressEvent;
use primitive_core::reconciler::{Generation, JobSnapshot, Reconciler};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, PrimitiveApi};
use crate::config::ClientConfig;
use crate::poller::{OutputPoller, PollerHandle};
use crate::sink::JobUpdateSink;
use crate::stream::{ProgressListener, Subscription};

/// Errors surfaced by [`JobTracker::submit`]. Nothing that happens after a
/// successful submission is reported as an error.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The parameters or the filename were rejected before uploading.
    #[error("Invalid submission: {0}")]
    Validation(#[from] CoreError),

    /// The service refused the job or could not be reached.
    #[error("Submission failed: {0}")]
    Submission(#[from] ApiError),
}

/// State shared between the tracker and its channel tasks.
struct Shared {
    reconciler: Mutex<Reconciler>,
    snapshot_tx: watch::Sender<JobSnapshot>,
}

impl Shared {
    fn publish(&self, reconciler: &Reconciler) {
        self.snapshot_tx.send_replace(reconciler.snapshot());
    }
}

/// Channels of the currently tracked job.
struct ActiveJob {
    job_id: JobId,
    generation: Generation,
    /// Parent of both channel tokens.
    session: CancellationToken,
    subscription: Subscription,
    poller: PollerHandle,
}

/// Sink handed to one channel of one session.
///
/// `live` is that channel's own token; once it is cancelled the sink drops
/// whatever it receives.
struct SessionSink {
    shared: Arc<Shared>,
    generation: Generation,
    live: CancellationToken,
}

#[async_trait]
impl JobUpdateSink for SessionSink {
    async fn on_progress(&self, event: ProgressEvent) {
        let mut reconciler = self.shared.reconciler.lock().await;
        if self.live.is_cancelled() {
            return;
        }
        if reconciler.apply_progress(self.generation, event) {
            self.shared.publish(&reconciler);
        }
    }

    async fn on_artifacts(&self, files: Vec<OutputArtifact>) {
        let mut reconciler = self.shared.reconciler.lock().await;
        if self.live.is_cancelled() {
            return;
        }
        if reconciler.replace_artifacts(self.generation, files) {
            self.shared.publish(&reconciler);
        }
    }
}

/// Submits jobs and keeps one consistent view of the current one.
pub struct JobTracker {
    api: PrimitiveApi,
    listener: ProgressListener,
    poller: OutputPoller,
    shared: Arc<Shared>,
    active: Option<ActiveJob>,
    /// Master token, cancelled when the tracker is dropped.
    cancel: CancellationToken,
}

impl JobTracker {
    /// Idle tracker with its own HTTP client.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_api(PrimitiveApi::new(config), config)
    }

    /// Build a tracker around an existing API client (shared connection
    /// pool, custom timeouts).
    pub fn with_api(api: PrimitiveApi, config: &ClientConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(JobSnapshot::idle());
        Self {
            listener: ProgressListener::new(config),
            poller: OutputPoller::new(api.clone(), config),
            api,
            shared: Arc::new(Shared {
                reconciler: Mutex::new(Reconciler::new()),
                snapshot_tx,
            }),
            active: None,
            cancel: CancellationToken::new(),
        }
    }

    /// The API client used for submissions and listings.
    pub fn api(&self) -> &PrimitiveApi {
        &self.api
    }

    /// Id of the job whose channels are live, if any.
    pub fn active_job_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.job_id.as_str())
    }

    /// Latest published snapshot.
    pub fn current_state(&self) -> JobSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Wait until a published snapshot satisfies `predicate` and return it.
    pub async fn wait_until<F>(&self, mut predicate: F) -> JobSnapshot
    where
        F: FnMut(&JobSnapshot) -> bool,
    {
        let mut rx = self.subscribe();
        let snapshot = match rx.wait_for(|snapshot| predicate(snapshot)).await {
            Ok(snapshot) => snapshot.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.current_state(),
        };
        snapshot
    }

    /// Whether the current job's progress stream is still delivering.
    /// False once it was detached, closed by the service, or never attached.
    pub fn stream_attached(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.subscription.is_finished())
    }

    /// Fetch the current job's record and apply its status and progress.
    ///
    /// Covers a `done` frame that was never received, for example because
    /// the job settled before the stream attached. Returns `Ok(None)` when
    /// no job is tracked.
    pub async fn refresh_status(&self) -> Result<Option<JobSnapshot>, ApiError> {
        let Some((job_id, generation)) = self
            .active
            .as_ref()
            .map(|a| (a.job_id.clone(), a.generation))
        else {
            return Ok(None);
        };

        let detail = self.api.get_job(&job_id).await?;
        let event = ProgressEvent {
            progress: Some(detail.progress.min(100)),
            message: None,
            status: Some(detail.status),
        };

        let mut reconciler = self.shared.reconciler.lock().await;
        if reconciler.apply_progress(generation, event) {
            tracing::debug!(job_id = %job_id, status = %detail.status, "Job status refreshed");
            self.shared.publish(&reconciler);
        }
        Ok(Some(reconciler.snapshot()))
    }

    /// Submit a new job and start tracking it.
    ///
    /// Any previously tracked job's stream is detached and its poller
    /// stopped before the request is sent. On failure the tracker is left
    /// idle with the diagnostic recorded in the snapshot. No retry is
    /// attempted.
    pub async fn submit(
        &mut self,
        file_bytes: Vec<u8>,
        filename: &str,
        params: &JobParameters,
    ) -> Result<JobHandle, TrackerError> {
        let shared = Arc::clone(&self.shared);
        let generation = {
            let mut reconciler = shared.reconciler.lock().await;
            self.teardown_locked();
            let generation = reconciler.begin_submission();
            self.shared.publish(&reconciler);
            generation
        };

        if let Err(e) = validate_upload_filename(filename).and_then(|()| params.validate()) {
            self.fail_submission(generation, &e.to_string()).await;
            return Err(TrackerError::Validation(e));
        }

        let job = match self.api.submit_job(file_bytes, filename, params).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(generation, error = %e, "Job submission failed");
                self.fail_submission(generation, &e.diagnostic()).await;
                return Err(TrackerError::Submission(e));
            }
        };

        let mut reconciler = shared.reconciler.lock().await;
        if !reconciler.submission_succeeded(generation, job.clone()) {
            tracing::warn!(job_id = %job.id, generation, "Submission superseded, not tracking");
            return Ok(job);
        }
        self.shared.publish(&reconciler);

        let session = self.cancel.child_token();
        let stream_cancel = session.child_token();
        let poll_cancel = session.child_token();

        let subscription = self.listener.attach(
            &job,
            self.session_sink(generation, &stream_cancel),
            stream_cancel,
        );
        let poller = self
            .poller
            .start(&job, self.session_sink(generation, &poll_cancel), poll_cancel);

        tracing::info!(job_id = %job.id, generation, "Tracking job");
        self.active = Some(ActiveJob {
            job_id: job.id.clone(),
            generation,
            session,
            subscription,
            poller,
        });
        drop(reconciler);

        Ok(job)
    }

    /// Stop pulling the output listing for the current job. The progress
    /// stream stays attached. Idempotent.
    pub async fn stop_polling(&self) {
        let _reconciler = self.shared.reconciler.lock().await;
        if let Some(active) = &self.active {
            if !active.poller.is_stopped() {
                tracing::info!(job_id = %active.job_id, "Stopping output poller");
            }
            active.poller.stop();
        }
    }

    /// Detach the progress stream for the current job. The poller keeps
    /// running. Idempotent.
    pub async fn detach_stream(&self) {
        let _reconciler = self.shared.reconciler.lock().await;
        if let Some(active) = &self.active {
            active.subscription.detach();
        }
    }

    /// Tear down both channels and forget the job.
    pub async fn reset(&mut self) {
        let shared = Arc::clone(&self.shared);
        let mut reconciler = shared.reconciler.lock().await;
        self.teardown_locked();
        reconciler.reset();
        self.shared.publish(&reconciler);
    }

    // ---- private helpers ----

    fn session_sink(
        &self,
        generation: Generation,
        live: &CancellationToken,
    ) -> Arc<dyn JobUpdateSink> {
        Arc::new(SessionSink {
            shared: Arc::clone(&self.shared),
            generation,
            live: live.clone(),
        })
    }

    /// Cancel the active job's channels. Callers hold the reconciler lock.
    fn teardown_locked(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!(
                job_id = %active.job_id,
                generation = active.generation,
                "Detaching progress stream and stopping output poller",
            );
            active.session.cancel();
        }
    }

    async fn fail_submission(&self, generation: Generation, diagnostic: &str) {
        let mut reconciler = self.shared.reconciler.lock().await;
        if reconciler.submission_failed(generation, diagnostic) {
            self.shared.publish(&reconciler);
        }
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
