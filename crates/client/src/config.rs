//! Connection settings for one primitive service.

use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Default pause between two output-listing pulls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Where the service lives and how the client talks to it.
///
/// Built once by the embedding application; the library itself never reads
/// the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base HTTP URL without trailing slash, e.g. `http://host:8000`.
    pub api_url: String,
    /// Base WebSocket URL, derived from `api_url` unless overridden.
    pub ws_url: String,
    /// Pause between the end of one listing pull and the start of the next.
    pub poll_interval: Duration,
    /// Handshake retry policy for the progress stream.
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Configure a client for the service at `api_url`.
    ///
    /// The URL must be absolute `http` or `https`; the progress stream URL
    /// uses the matching `ws`/`wss` scheme on the same host.
    pub fn new(api_url: impl AsRef<str>) -> Result<Self, ConfigError> {
        let api_url = normalize_base(api_url.as_ref())?;
        let ws_url = derive_ws_url(&api_url)?;
        Ok(Self {
            api_url,
            ws_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectConfig::default(),
        })
    }

    /// Pause between output listing pulls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Point the progress stream somewhere other than the API host.
    pub fn with_ws_url(mut self, ws_url: impl AsRef<str>) -> Result<Self, ConfigError> {
        let url = parse(ws_url.as_ref())?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl(format!(
                "'{}' must use ws or wss",
                ws_url.as_ref()
            )));
        }
        self.ws_url = ws_url.as_ref().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Backoff used when the progress stream drops.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

fn parse(raw: &str) -> Result<url::Url, ConfigError> {
    url::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("'{raw}': {e}")))
}

fn normalize_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = parse(trimmed)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "'{raw}' must use http or https"
        )));
    }
    Ok(trimmed.to_string())
}

fn derive_ws_url(api_url: &str) -> Result<String, ConfigError> {
    let mut url = parse(api_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| ConfigError::InvalidUrl(format!("cannot derive {scheme} URL from '{api_url}'")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Errors from building a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid service URL {0}")]
    InvalidUrl(String),
}
