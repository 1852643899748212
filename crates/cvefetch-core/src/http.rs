//! HTTP client construction and response classification.
//!
//! Requests are issued from a sequential pipeline, so the async reqwest client
//! is driven by a current-thread tokio runtime owned by the caller. Nothing
//! here is process-global.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::FetchError;

/// Connect / total request timeouts and identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            user_agent: concat!("cvefetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Build a pooled async client with the configured timeouts.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.as_str())
        .pool_max_idle_per_host(1)
        .build()
        .map_err(|e| FetchError::Network {
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Current-thread runtime for blocking on single requests.
pub fn build_runtime() -> Result<tokio::runtime::Runtime, FetchError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| FetchError::Network {
            message: format!("failed to build tokio runtime: {e}"),
        })
}

/// Classify a reqwest error: status-bearing errors are HTTP, the rest network.
pub fn error_from_reqwest(e: &reqwest::Error) -> FetchError {
    match e.status() {
        Some(status) => FetchError::Http {
            status: status.as_u16(),
            retry_after: None,
            message: e.to_string(),
        },
        None if e.is_timeout() => FetchError::Network {
            message: format!("timed out: {e}"),
        },
        None => FetchError::Network {
            message: e.to_string(),
        },
    }
}

/// Parse `Retry-After` as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
