use std::path::PathBuf;
use std::time::Duration;

/// Settings the watcher reads from the environment.
///
/// All fields have defaults suitable for a service running locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Base URL of the service (default: `http://localhost:8000`).
    pub api_url: String,
    /// Pause between output listing pulls (default: 2000 ms).
    pub poll_interval: Duration,
    /// Directory the rendered output is written to (default: `.`).
    pub output_dir: PathBuf,
    /// Per-request HTTP timeout (default: 30 s).
    pub http_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

impl WatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `PRIMITIVE_API_URL`          | `http://localhost:8000` |
    /// | `PRIMITIVE_POLL_INTERVAL_MS` | `2000`                  |
    /// | `PRIMITIVE_OUTPUT_DIR`       | `.`                     |
    /// | `PRIMITIVE_HTTP_TIMEOUT_SECS`| `30`                    |
    pub fn from_env() -> Result<Self, WatchConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WatchConfigError> {
        let api_url = lookup("PRIMITIVE_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "http://localhost:8000".into());

        let poll_ms = parse_u64(&lookup, "PRIMITIVE_POLL_INTERVAL_MS", 2000)?;

        let output_dir = lookup("PRIMITIVE_OUTPUT_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let timeout_secs = parse_u64(&lookup, "PRIMITIVE_HTTP_TIMEOUT_SECS", 30)?;

        Ok(Self {
            api_url,
            poll_interval: Duration::from_millis(poll_ms),
            output_dir,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, WatchConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WatchConfigError::InvalidNumber { name, value: raw }),
    }
}
