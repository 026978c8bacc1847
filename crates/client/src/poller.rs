//! Periodic pull of a job's output listing.
//!
//! The poller has no notion of a finished job; it runs until its owner
//! stops it. Pulls never overlap: the next one is scheduled `interval` after
//! the previous one settled. A failed pull is skipped silently and the
//! schedule carries on unchanged.

use std::sync::Arc;
use std::time::Duration;

use primitive_core::job::JobHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::PrimitiveApi;
use crate::config::ClientConfig;
use crate::sink::JobUpdateSink;

/// Schedules listing pulls against one service.
#[derive(Clone)]
pub struct OutputPoller {
    api: PrimitiveApi,
    interval: Duration,
}

impl OutputPoller {
    /// Poller using the interval from `config`.
    pub fn new(api: PrimitiveApi, config: &ClientConfig) -> Self {
        Self {
            api,
            interval: config.poll_interval,
        }
    }

    /// Override the pause between pulls. A zero interval pulls back to back.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Pause between the end of one pull and the start of the next.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start pulling `job`'s listing. The first pull fires immediately.
    ///
    /// Cancelling `cancel` (or any parent of it) stops the poller; the
    /// returned handle stops it on drop.
    pub fn start(
        &self,
        job: &JobHandle,
        sink: Arc<dyn JobUpdateSink>,
        cancel: CancellationToken,
    ) -> PollerHandle {
        let api = self.api.clone();
        let interval = self.interval;
        let job_id = job.id.clone();
        let task_cancel = cancel.clone();

        tracing::info!(
            job_id = %job_id,
            interval_ms = interval.as_millis() as u64,
            "Output poller started",
        );

        let task = tokio::spawn(async move {
            let mut ticks: u64 = 0;
            loop {
                ticks += 1;
                // Dropping the request future on cancel discards an in-flight pull.
                let pulled = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    pulled = api.list_outputs(&job_id) => pulled,
                };

                match pulled {
                    Ok(files) => {
                        if task_cancel.is_cancelled() {
                            break;
                        }
                        tracing::debug!(
                            job_id = %job_id,
                            tick = ticks,
                            files = files.len(),
                            "Output listing pulled",
                        );
                        sink.on_artifacts(files).await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            job_id = %job_id,
                            tick = ticks,
                            error = %e,
                            "Output listing pull failed",
                        );
                    }
                }

                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::info!(job_id = %job_id, ticks, "Output poller stopped");
        });

        PollerHandle { cancel, task }
    }
}

/// Handle to one running poller.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancel the pending pull and every future one. Safe to call any number
    /// of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// `true` once [`stop`](Self::stop) was called or the parent token was
    /// cancelled.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the polling task to exit. Only returns after [`stop`](Self::stop).
    pub async fn stopped(&mut self) {
        if self.task.is_finished() {
            return;
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
