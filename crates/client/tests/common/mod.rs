//! In-process mock of the primitive service for integration tests.
//!
//! Binds an axum router to `127.0.0.1:0` and exposes knobs to script
//! submission replies, output listings and progress frames.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use primitive_client::ClientConfig;
use primitive_core::reconciler::JobSnapshot;
use serde_json::json;
use tokio::sync::{mpsc, watch};

/// Generous upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Short poll interval so tests run quickly.
pub const FAST_POLL: Duration = Duration::from_millis(20);

/// What the mock does with the next `POST /api/jobs`.
#[derive(Debug, Clone)]
pub enum SubmitReply {
    Created { id: String, status: String },
    Rejected { status: u16, body: String },
}

/// What the mock returns for a listing pull.
#[derive(Debug, Clone)]
pub enum ListingReply {
    Files(Vec<String>),
    Error(u16),
}

/// One recorded submission.
#[derive(Debug, Clone, Default)]
pub struct RecordedSubmission {
    pub filename: Option<String>,
    pub file_len: usize,
    pub fields: HashMap<String, String>,
}

#[derive(Default)]
struct Inner {
    submit_replies: Mutex<VecDeque<SubmitReply>>,
    submissions: Mutex<Vec<RecordedSubmission>>,
    listings: Mutex<HashMap<String, ListingReply>>,
    job_states: Mutex<HashMap<String, (String, u8)>>,
    listing_delay: Mutex<Duration>,
    pulls: Mutex<HashMap<String, usize>>,
    streams: Mutex<HashMap<String, mpsc::UnboundedSender<Option<String>>>>,
    stream_connects: Mutex<HashMap<String, usize>>,
    stream_disconnects: Mutex<HashMap<String, usize>>,
    next_id: AtomicUsize,
}

/// Handle to a running mock service.
#[derive(Clone)]
pub struct MockService {
    inner: Arc<Inner>,
    pub base_url: String,
}

impl MockService {
    pub async fn start() -> Self {
        let inner = Arc::new(Inner::default());
        let app = Router::new()
            .route("/healthz", get(healthz))
            .route("/api/jobs", post(create_job))
            .route("/api/jobs/{id}", get(get_job))
            .route("/api/jobs/{id}/outputs", get(list_outputs))
            .route("/api/jobs/{id}/outputs/{filename}", get(download_output))
            .route("/api/admin/jobs", get(admin_jobs))
            .route("/ws/jobs/{id}", get(ws_job))
            .with_state(Arc::clone(&inner));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            inner,
            base_url: format!("http://{addr}"),
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url)
            .unwrap()
            .with_poll_interval(FAST_POLL)
    }

    // ---- scripting ----

    pub fn reply_to_next_submit(&self, reply: SubmitReply) {
        self.inner.submit_replies.lock().unwrap().push_back(reply);
    }

    pub fn set_listing(&self, job_id: &str, reply: ListingReply) {
        self.inner
            .listings
            .lock()
            .unwrap()
            .insert(job_id.to_string(), reply);
    }

    pub fn set_files(&self, job_id: &str, files: &[&str]) {
        self.set_listing(
            job_id,
            ListingReply::Files(files.iter().map(|f| f.to_string()).collect()),
        );
    }

    /// Status and progress reported by `GET /api/jobs/{id}`.
    pub fn set_job_state(&self, job_id: &str, status: &str, progress: u8) {
        self.inner
            .job_states
            .lock()
            .unwrap()
            .insert(job_id.to_string(), (status.to_string(), progress));
    }

    pub fn set_listing_delay(&self, delay: Duration) {
        *self.inner.listing_delay.lock().unwrap() = delay;
    }

    /// Send a text frame on the job's open stream.
    pub fn push(&self, job_id: &str, text: &str) {
        let streams = self.inner.streams.lock().unwrap();
        let tx = streams.get(job_id).expect("no open stream for job");
        tx.send(Some(text.to_string())).unwrap();
    }

    /// Close the job's stream from the service side.
    pub fn close_stream(&self, job_id: &str) {
        let streams = self.inner.streams.lock().unwrap();
        if let Some(tx) = streams.get(job_id) {
            let _ = tx.send(None);
        }
    }

    // ---- observations ----

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.inner.submissions.lock().unwrap().clone()
    }

    pub fn pulls(&self, job_id: &str) -> usize {
        *self.inner.pulls.lock().unwrap().get(job_id).unwrap_or(&0)
    }

    pub fn stream_connects(&self, job_id: &str) -> usize {
        *self.inner.stream_connects.lock().unwrap().get(job_id).unwrap_or(&0)
    }

    pub fn stream_disconnects(&self, job_id: &str) -> usize {
        *self
            .inner
            .stream_disconnects
            .lock()
            .unwrap()
            .get(job_id)
            .unwrap_or(&0)
    }

    /// Wait until the job's stream is open on the service side.
    pub async fn wait_for_stream(&self, job_id: &str) {
        self.wait_for(|s| s.stream_connects(job_id) > 0).await;
    }

    /// Wait until the job's stream was closed on the service side.
    pub async fn wait_for_stream_end(&self, job_id: &str) {
        self.wait_for(|s| s.stream_disconnects(job_id) > 0).await;
    }

    /// Wait until the service served at least `n` pulls for the job.
    pub async fn wait_for_pulls(&self, job_id: &str, n: usize) {
        self.wait_for(|s| s.pulls(job_id) >= n).await;
    }

    async fn wait_for(&self, mut done: impl FnMut(&Self) -> bool) {
        tokio::time::timeout(WAIT, async {
            while !done(self) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting on mock service");
    }
}

/// Wait for a snapshot matching `predicate` on `rx`, with a timeout.
pub async fn wait_snapshot(
    rx: &mut watch::Receiver<JobSnapshot>,
    predicate: impl FnMut(&JobSnapshot) -> bool,
) -> JobSnapshot {
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed")
        .clone();
    snapshot
}

/// Minimal bytes standing in for an upload.
pub fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn create_job(State(inner): State<Arc<Inner>>, mut multipart: Multipart) -> Response {
    let mut recorded = RecordedSubmission::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            recorded.filename = field.file_name().map(str::to_string);
            recorded.file_len = field.bytes().await.unwrap().len();
        } else {
            recorded.fields.insert(name, field.text().await.unwrap());
        }
    }
    inner.submissions.lock().unwrap().push(recorded);

    let reply = inner.submit_replies.lock().unwrap().pop_front();
    match reply {
        Some(SubmitReply::Rejected { status, body }) => {
            (StatusCode::from_u16(status).unwrap(), body).into_response()
        }
        Some(SubmitReply::Created { id, status }) => {
            Json(json!({"id": id, "status": status, "progress": 0})).into_response()
        }
        None => {
            let n = inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            Json(json!({"id": format!("job-{n}"), "status": "pending"})).into_response()
        }
    }
}

async fn get_job(State(inner): State<Arc<Inner>>, Path(id): Path<String>) -> Json<serde_json::Value> {
    let (status, progress) = inner
        .job_states
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_else(|| ("running".to_string(), 12));
    Json(json!({
        "id": id,
        "status": status,
        "message": "iteration 12",
        "progress": progress,
        "created_at": "2024-05-01T12:30:00.123456",
        "params": {"n": 100, "m": 1},
    }))
}

async fn list_outputs(State(inner): State<Arc<Inner>>, Path(id): Path<String>) -> Response {
    *inner.pulls.lock().unwrap().entry(id.clone()).or_default() += 1;

    let delay = *inner.listing_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reply = inner.listings.lock().unwrap().get(&id).cloned();
    match reply {
        Some(ListingReply::Files(files)) => Json(json!({ "files": files })).into_response(),
        Some(ListingReply::Error(status)) => {
            (StatusCode::from_u16(status).unwrap(), "listing failed").into_response()
        }
        None => Json(json!({ "files": [] })).into_response(),
    }
}

async fn download_output(Path((id, filename)): Path<(String, String)>) -> Response {
    if filename == "missing.png" {
        return (StatusCode::NOT_FOUND, "file not found").into_response();
    }
    format!("{id}/{filename}").into_response()
}

async fn admin_jobs() -> Json<serde_json::Value> {
    Json(json!({
        "items": [
            {"id": "job-2", "status": "running", "progress": 40, "created_at": "2024-05-01T12:31:00", "message": "iteration 40"},
            {"id": "job-1", "status": "succeeded", "progress": 100, "created_at": "2024-05-01T12:30:00", "message": null},
        ],
        "count": 2,
    }))
}

async fn ws_job(
    ws: WebSocketUpgrade,
    State(inner): State<Arc<Inner>>,
    Path(id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, inner, id))
}

async fn handle_socket(socket: WebSocket, inner: Arc<Inner>, job_id: String) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Option<String>>();
    inner.streams.lock().unwrap().insert(job_id.clone(), tx);
    *inner
        .stream_connects
        .lock()
        .unwrap()
        .entry(job_id.clone())
        .or_default() += 1;

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Some(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(None) | None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    *inner
        .stream_disconnects
        .lock()
        .unwrap()
        .entry(job_id)
        .or_default() += 1;
}
