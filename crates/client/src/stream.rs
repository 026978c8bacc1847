//! Progress stream listener.
//!
//! [`ProgressListener::attach`] opens the job-scoped WebSocket
//! (`/ws/jobs/{id}`) on a background task and feeds decoded events to a
//! [`JobUpdateSink`] until the subscription is detached or the service
//! closes the channel. Closure is not a job failure: the subscription just
//! ends.

use std::sync::Arc;

use primitive_core::job::JobHandle;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::api::join_segments;
use crate::config::ClientConfig;
use crate::processor::{process_messages, StreamEnd};
use crate::reconnect::{connect_with_retry, ReconnectConfig};
use crate::sink::JobUpdateSink;

/// A client-side WebSocket connection.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors raised while opening a stream. Logged by the listener, never
/// surfaced to the tracker's callers.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Perform a single WebSocket handshake against `url`.
pub async fn open_stream(url: &str) -> Result<WsStream, StreamError> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| StreamError::Connection(format!("Failed to connect to {url}: {e}")))?;
    Ok(ws_stream)
}

/// Opens progress streams against one service.
#[derive(Debug, Clone)]
pub struct ProgressListener {
    ws_url: String,
    reconnect: ReconnectConfig,
}

impl ProgressListener {
    /// Listener for the stream endpoint and backoff in `config`.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            reconnect: config.reconnect.clone(),
        }
    }

    /// URL of the progress stream for `job_id`.
    pub fn stream_url(&self, job_id: &str) -> Result<String, StreamError> {
        join_segments(&self.ws_url, &["ws", "jobs", job_id])
            .map_err(|e| StreamError::Connection(e.to_string()))
    }

    /// Start listening for `job`'s progress events.
    ///
    /// Cancelling `cancel` (or any parent of it) detaches the subscription.
    /// The returned handle detaches on drop.
    pub fn attach(
        &self,
        job: &JobHandle,
        sink: Arc<dyn JobUpdateSink>,
        cancel: CancellationToken,
    ) -> Subscription {
        let job_id = job.id.clone();
        let url = self.stream_url(&job_id);
        let reconnect = self.reconnect.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let url = match url {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Cannot build progress stream URL");
                    return;
                }
            };

            let Some(mut ws_stream) = connect_with_retry(&url, &reconnect, &task_cancel).await
            else {
                tracing::info!(job_id = %job_id, "Progress stream not established");
                return;
            };
            tracing::info!(job_id = %job_id, url = %url, "Progress stream attached");

            let end = process_messages(&mut ws_stream, &job_id, sink.as_ref(), &task_cancel).await;
            if end == StreamEnd::Detached {
                let _ = ws_stream.close(None).await;
            }
            tracing::info!(job_id = %job_id, ?end, "Progress stream subscription ended");
        });

        Subscription { cancel, task }
    }
}

/// Handle to one attached progress stream.
pub struct Subscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering events. Idempotent; a no-op if the channel already
    /// closed on its own.
    pub fn detach(&self) {
        self.cancel.cancel();
    }

    /// Whether the subscription was detached by its owner.
    pub fn is_detached(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the background task has exited, for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the background task to exit.
    pub async fn closed(&mut self) {
        if self.task.is_finished() {
            return;
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
