//! Error taxonomy for the fetch-and-persist pipeline
//!
//! [`FetchError`] classifies every failure a run can hit. Only network errors
//! and a fixed set of HTTP statuses are transient; everything else is fatal.
//! [`RunError`] adds the window/offset at which the pipeline stopped.

use std::path::PathBuf;
use std::time::Duration;

use crate::window::FetchWindow;

/// HTTP statuses that are worth another attempt
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Coarse error category, used for exit codes and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRange,
    InvalidConfig,
    Network,
    Http,
    MalformedResponse,
    Exhausted,
    Write,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRange => "invalid-range",
            Self::InvalidConfig => "invalid-config",
            Self::Network => "network",
            Self::Http => "http",
            Self::MalformedResponse => "malformed-response",
            Self::Exhausted => "fetch-exhausted",
            Self::Write => "write",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from any stage of a fetch run
#[derive(Debug)]
pub enum FetchError {
    /// Requested range cannot be planned (`days_back <= 0`, zero span, overflow)
    InvalidRange { message: String },
    /// Resolved configuration violates an API limit
    InvalidConfig { message: String },
    /// Connection failure, timeout or truncated body
    Network { message: String },
    /// Non-2xx response
    Http {
        status: u16,
        retry_after: Option<Duration>,
        message: String,
    },
    /// Body does not match the expected envelope
    MalformedResponse { message: String },
    /// Transient failures outlasted the retry budget
    Exhausted {
        attempts: u32,
        last_cause: Box<FetchError>,
    },
    /// Local filesystem failure while persisting shards
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Shutdown requested while the run was in progress
    Cancelled,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRange { message } => write!(f, "invalid range: {message}"),
            Self::InvalidConfig { message } => write!(f, "invalid configuration: {message}"),
            Self::Network { message } => write!(f, "network error: {message}"),
            Self::Http {
                status,
                retry_after: Some(after),
                message,
            } => write!(f, "HTTP {status}: {message} (retry after {after:?})"),
            Self::Http {
                status, message, ..
            } => write!(f, "HTTP {status}: {message}"),
            Self::MalformedResponse { message } => write!(f, "malformed response: {message}"),
            Self::Exhausted {
                attempts,
                last_cause,
            } => write!(f, "gave up after {attempts} attempts: {last_cause}"),
            Self::Write { path, source } => write!(f, "cannot write {}: {source}", path.display()),
            Self::Cancelled => f.write_str("cancelled by shutdown request"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted { last_cause, .. } => Some(last_cause.as_ref()),
            Self::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl FetchError {
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::Network { .. } => ErrorKind::Network,
            Self::Http { .. } => ErrorKind::Http,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::Write { .. } => ErrorKind::Write,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Network errors and 429/5xx gateway statuses are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http { status, .. } => RETRYABLE_STATUSES.contains(status),
            _ => false,
        }
    }

    /// Server-requested wait, honored only for 429 responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http {
                status: 429,
                retry_after,
                ..
            } => *retry_after,
            _ => None,
        }
    }
}

/// Where the pipeline was when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPosition {
    /// Zero-based index into the planned windows
    pub window_index: usize,
    pub window_count: usize,
    pub window: FetchWindow,
    pub offset: u64,
}

impl std::fmt::Display for FetchPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "window {}/{} [{}], offset {}",
            self.window_index + 1,
            self.window_count,
            self.window,
            self.offset
        )
    }
}

/// Fatal pipeline failure with the position at which progress stopped.
///
/// `position` is `None` when the run failed before any window was started
/// (planning, output directory setup).
#[derive(Debug)]
pub struct RunError {
    pub error: FetchError,
    pub position: Option<FetchPosition>,
}

impl RunError {
    pub fn unpositioned(error: FetchError) -> Self {
        Self {
            error,
            position: None,
        }
    }

    pub fn at(error: FetchError, position: FetchPosition) -> Self {
        Self {
            error,
            position: Some(position),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{} ({pos})", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<FetchError> for RunError {
    fn from(error: FetchError) -> Self {
        Self::unpositioned(error)
    }
}
