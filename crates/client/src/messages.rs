//! Progress-channel message parser.
//!
//! The service sends JSON text frames such as
//! `{"type": "log", "message": "...", "progress": 12}` or
//! `{"type": "done", "status": "succeeded", "progress": 100}`. Only
//! `progress`, `message` and `status` matter here; the `type` tag and any
//! other field are ignored.

use primitive_core::job::JobStatus;
use primitive_core::progress::{to_percent, ProgressEvent};
use serde::Deserialize;
use serde_json::Value;

/// Why a frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,
}

/// Parse one text frame into a [`ProgressEvent`].
///
/// Each field is picked independently: a `progress` that is not a number,
/// a `message` that is not a non-empty string or a `status` that is not a
/// known status is treated as absent without affecting the others. Only
/// malformed JSON and non-object payloads are errors; callers drop those
/// frames and keep reading.
pub fn parse_progress_message(text: &str) -> Result<ProgressEvent, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let progress = fields
        .get("progress")
        .and_then(Value::as_f64)
        .and_then(to_percent);

    let message = fields
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    let status = fields
        .get("status")
        .and_then(|raw| JobStatus::deserialize(raw).ok());

    Ok(ProgressEvent {
        progress,
        message,
        status,
    })
}
