//! REST API client for the primitive service HTTP endpoints.
//!
//! Wraps job submission, job lookup, output listing and output download
//! using [`reqwest`]. No call is retried here; retrying a submission is the
//! caller's decision.

use primitive_core::artifacts::{OutputArtifact, OutputListing};
use primitive_core::job::{JobDetail, JobHandle, JobList};
use primitive_core::params::JobParameters;
use reqwest::multipart::{Form, Part};

use crate::config::ClientConfig;

/// HTTP client for a single primitive service.
#[derive(Clone)]
pub struct PrimitiveApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decode, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// An endpoint URL could not be built from the configured base.
    #[error("Invalid endpoint URL: {0}")]
    Url(String),
}

impl ApiError {
    /// Text worth showing to a user: the response body for service errors,
    /// the error message otherwise.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Api { body, .. } if !body.trim().is_empty() => body.clone(),
            other => other.to_string(),
        }
    }
}

impl PrimitiveApi {
    /// Client with a default [`reqwest::Client`] for `config.api_url`.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pool, timeouts).
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
        }
    }

    /// Base URL every request is resolved against, without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit an image for processing.
    ///
    /// Sends one `POST /api/jobs` multipart request carrying the file and
    /// the stringified parameters. Returns the initial job handle.
    pub async fn submit_job(
        &self,
        file_bytes: Vec<u8>,
        filename: &str,
        params: &JobParameters,
    ) -> Result<JobHandle, ApiError> {
        let file_part = Part::bytes(file_bytes)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))?;

        let form = params
            .form_fields()
            .into_iter()
            .fold(Form::new().part("file", file_part), |form, (name, value)| {
                form.text(name, value)
            });

        let response = self
            .client
            .post(self.endpoint(&["api", "jobs"])?)
            .multipart(form)
            .send()
            .await?;

        let job: JobHandle = Self::parse_response(response).await?;
        tracing::info!(job_id = %job.id, status = %job.status, "Job submitted");
        Ok(job)
    }

    /// Fetch the full record of one job (`GET /api/jobs/{id}`).
    pub async fn get_job(&self, job_id: &str) -> Result<JobDetail, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "jobs", job_id])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// List the files a job has produced so far
    /// (`GET /api/jobs/{id}/outputs`).
    pub async fn list_outputs(&self, job_id: &str) -> Result<Vec<OutputArtifact>, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "jobs", job_id, "outputs"])?)
            .send()
            .await?;

        let listing: OutputListing = Self::parse_response(response).await?;
        Ok(listing.files)
    }

    /// Download URL of one output file.
    pub fn output_url(&self, job_id: &str, filename: &str) -> Result<String, ApiError> {
        self.endpoint(&["api", "jobs", job_id, "outputs", filename])
    }

    /// Download one output file into memory.
    pub async fn download_output(&self, job_id: &str, filename: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(self.output_url(job_id, filename)?)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Page through all jobs known to the service, newest first
    /// (`GET /api/admin/jobs`).
    pub async fn list_jobs(&self, limit: u32, offset: u32) -> Result<JobList, ApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "admin", "jobs"])?)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Liveness check (`GET /healthz`).
    pub async fn health(&self) -> Result<(), ApiError> {
        let response = self.client.get(self.endpoint(&["healthz"])?).send().await?;
        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<String, ApiError> {
        join_segments(&self.api_url, segments)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] containing
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Append `segments` to `base`, percent-encoding each one.
pub(crate) fn join_segments(base: &str, segments: &[&str]) -> Result<String, ApiError> {
    let mut url = url::Url::parse(base).map_err(|e| ApiError::Url(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::Url(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

fn mime_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}
