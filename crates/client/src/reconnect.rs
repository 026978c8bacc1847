//! Exponential-backoff handshake retries for the progress stream.
//!
//! The listener is attached right after the submission response arrives,
//! which can race the service registering the job's channel. The handshake
//! is therefore retried a bounded number of times. Once a session has been
//! established its closure is final; nothing here reconnects it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::stream::{open_stream, WsStream};

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Total handshake attempts, including the first (at least one).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl ReconnectConfig {
    /// A single attempt with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Open the stream at `url`, retrying with exponential backoff.
///
/// Returns `Some(stream)` once a handshake succeeds, or `None` when every
/// attempt failed or `cancel` was triggered first.
pub async fn connect_with_retry(
    url: &str,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<WsStream> {
    let attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;

    for attempt in 1..=attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(url, "Stream handshake cancelled");
                return None;
            }
            result = open_stream(url) => {
                match result {
                    Ok(stream) => {
                        if attempt > 1 {
                            tracing::info!(url, attempt, "Progress stream connected after retry");
                        }
                        return Some(stream);
                    }
                    Err(e) => {
                        tracing::warn!(
                            url,
                            attempt,
                            max_attempts = attempts,
                            error = %e,
                            "Progress stream handshake failed",
                        );
                    }
                }
            }
        }

        if attempt == attempts {
            break;
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }

    None
}
