//! REST client tests against the in-process mock service.

mod common;

use assert_matches::assert_matches;
use common::{png_bytes, MockService, SubmitReply};
use primitive_client::{ApiError, PrimitiveApi};
use primitive_core::job::JobStatus;
use primitive_core::params::{Background, JobParameters, ShapeMode};

// ---------------------------------------------------------------------------
// Test: submission sends the file and every parameter field
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_job_sends_multipart_form() {
    let mock = MockService::start().await;
    let api = PrimitiveApi::new(&mock.config());

    let params = JobParameters {
        shape_count: 250,
        shape_mode: ShapeMode::Ellipse,
        background: Background::Color("#ffffff".into()),
        frame_interval: Some(10),
        ..JobParameters::default()
    };
    let job = api
        .submit_job(png_bytes(), "photo.png", &params)
        .await
        .unwrap();

    assert_eq!(job.id, "job-1");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress, 0);

    let submissions = mock.submissions();
    assert_eq!(submissions.len(), 1);
    let sent = &submissions[0];
    assert_eq!(sent.filename.as_deref(), Some("photo.png"));
    assert_eq!(sent.file_len, png_bytes().len());
    assert_eq!(sent.fields["n"], "250");
    assert_eq!(sent.fields["m"], "3");
    assert_eq!(sent.fields["s"], "1024");
    assert_eq!(sent.fields["r"], "256");
    assert_eq!(sent.fields["a"], "128");
    assert_eq!(sent.fields["bg"], "#ffffff");
    assert_eq!(sent.fields["rep"], "0");
    assert_eq!(sent.fields["nth"], "10");
    assert_eq!(sent.fields["j"], "0");
    assert_eq!(sent.fields["v"], "0");
}

#[tokio::test]
async fn submit_job_omits_frame_interval_when_unset() {
    let mock = MockService::start().await;
    let api = PrimitiveApi::new(&mock.config());

    api.submit_job(png_bytes(), "photo.jpg", &JobParameters::default())
        .await
        .unwrap();

    let sent = &mock.submissions()[0];
    assert!(!sent.fields.contains_key("nth"));
    assert_eq!(sent.fields["bg"], "avg");
}

// ---------------------------------------------------------------------------
// Test: a rejected submission surfaces status and body
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_job_rejection_carries_body() {
    let mock = MockService::start().await;
    mock.reply_to_next_submit(SubmitReply::Rejected {
        status: 400,
        body: "Only .png, .jpg, .jpeg files are allowed".into(),
    });
    let api = PrimitiveApi::new(&mock.config());

    let err = api
        .submit_job(png_bytes(), "photo.png", &JobParameters::default())
        .await
        .unwrap_err();

    assert_matches!(&err, ApiError::Api { status: 400, body } if body.contains(".jpeg"));
    assert_eq!(err.diagnostic(), "Only .png, .jpg, .jpeg files are allowed");
}

#[tokio::test]
async fn submit_job_unreachable_service_is_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = primitive_client::ClientConfig::new(format!("http://127.0.0.1:{port}")).unwrap();
    let api = PrimitiveApi::new(&config);

    let err = api
        .submit_job(png_bytes(), "photo.png", &JobParameters::default())
        .await
        .unwrap_err();
    assert_matches!(err, ApiError::Request(_));
}

// ---------------------------------------------------------------------------
// Test: read endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_outputs_returns_current_listing() {
    let mock = MockService::start().await;
    mock.set_files("job-9", &["frame-00001.png", "output.png"]);
    let api = PrimitiveApi::new(&mock.config());

    let files = api.list_outputs("job-9").await.unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["frame-00001.png", "output.png"]);
    assert_eq!(mock.pulls("job-9"), 1);
}

#[tokio::test]
async fn list_outputs_failure_is_api_error() {
    let mock = MockService::start().await;
    mock.set_listing("job-9", common::ListingReply::Error(500));
    let api = PrimitiveApi::new(&mock.config());

    let err = api.list_outputs("job-9").await.unwrap_err();
    assert_matches!(err, ApiError::Api { status: 500, .. });
}

#[tokio::test]
async fn get_job_decodes_naive_timestamp() {
    let mock = MockService::start().await;
    let api = PrimitiveApi::new(&mock.config());

    let detail = api.get_job("job-3").await.unwrap();
    assert_eq!(detail.id, "job-3");
    assert_eq!(detail.status, JobStatus::Running);
    assert_eq!(detail.progress, 12);
    assert_eq!(detail.message.as_deref(), Some("iteration 12"));
    assert_eq!(detail.created_at.to_string(), "2024-05-01 12:30:00.123456");
    assert_eq!(detail.params["n"], 100);
}

#[tokio::test]
async fn download_output_returns_bytes() {
    let mock = MockService::start().await;
    let api = PrimitiveApi::new(&mock.config());

    let bytes = api.download_output("job-3", "output.png").await.unwrap();
    assert_eq!(bytes, b"job-3/output.png");

    let err = api.download_output("job-3", "missing.png").await.unwrap_err();
    assert_matches!(err, ApiError::Api { status: 404, .. });
}

#[tokio::test]
async fn output_url_is_built_from_base() {
    let mock = MockService::start().await;
    let api = PrimitiveApi::new(&mock.config());

    let url = api.output_url("job-3", "frame-00002.png").unwrap();
    assert_eq!(
        url,
        format!("{}/api/jobs/job-3/outputs/frame-00002.png", mock.base_url)
    );
}

#[tokio::test]
async fn list_jobs_and_health() {
    let mock = MockService::start().await;
    let api = PrimitiveApi::new(&mock.config());

    api.health().await.unwrap();

    let list = api.list_jobs(50, 0).await.unwrap();
    assert_eq!(list.count, 2);
    assert_eq!(list.items[0].id, "job-2");
    assert_eq!(list.items[1].status, JobStatus::Succeeded);
    assert_eq!(list.items[1].message, None);
}
