//! WebSocket message processing loop.
//!
//! Reads raw frames from a job's progress stream, decodes text frames via
//! [`parse_progress_message`] and hands each resulting event to the sink.
//! Frames that fail to decode are dropped without ending the loop.

use futures::StreamExt;
use primitive_core::job::JobId;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::messages::parse_progress_message;
use crate::sink::JobUpdateSink;
use crate::stream::WsStream;

/// Why the processing loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The subscription was detached.
    Detached,
    /// The service sent a close frame or the stream ran out.
    Closed,
    /// The socket failed mid-session.
    Failed,
}

/// Process frames until the stream closes, fails, or `cancel` fires.
///
/// Events are delivered one at a time, in arrival order, with no batching.
/// Binary, ping and pong frames are ignored.
pub async fn process_messages(
    ws_stream: &mut WsStream,
    job_id: &JobId,
    sink: &dyn JobUpdateSink,
    cancel: &CancellationToken,
) -> StreamEnd {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Detached,
            next = ws_stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(&text, job_id, sink, cancel).await;
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(job_id = %job_id, "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(job_id = %job_id, ?frame, "Progress stream closed by service");
                return StreamEnd::Closed;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::info!(job_id = %job_id, error = %e, "Progress stream receive error");
                return StreamEnd::Failed;
            }
            None => {
                tracing::info!(job_id = %job_id, "Progress stream ended");
                return StreamEnd::Closed;
            }
        }
    }
}

/// Decode a single text frame and forward it.
async fn handle_text_message(
    text: &str,
    job_id: &JobId,
    sink: &dyn JobUpdateSink,
    cancel: &CancellationToken,
) {
    match parse_progress_message(text) {
        Ok(event) if event.is_empty() => {
            tracing::trace!(job_id = %job_id, "Progress frame carried no known fields");
        }
        Ok(event) => {
            if cancel.is_cancelled() {
                return;
            }
            tracing::debug!(
                job_id = %job_id,
                progress = ?event.progress,
                status = ?event.status,
                has_message = event.message.is_some(),
                "Progress event",
            );
            sink.on_progress(event).await;
        }
        Err(e) => {
            tracing::debug!(
                job_id = %job_id,
                error = %e,
                raw_message = %text,
                "Dropping undecodable progress frame",
            );
        }
    }
}
