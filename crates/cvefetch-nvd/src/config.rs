//! NVD fetcher configuration

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use cvefetch_core::{FetchError, HttpConfig, RateLimitConfig, RetryConfig, ShardConfig};

use crate::state::DateFilter;

/// CVE API 2.0 endpoint
pub const NVD_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// Largest `resultsPerPage` the API accepts
pub const MAX_PAGE_SIZE: u32 = 2000;

/// Longest date range the API accepts in one query
pub const MAX_SPAN_DAYS: i64 = 120;

/// Published quota without an API key
pub const PUBLIC_QUOTA: RateLimitConfig = RateLimitConfig::new(5, Duration::from_secs(30));

/// Published quota with an API key
pub const KEYED_QUOTA: RateLimitConfig = RateLimitConfig::new(50, Duration::from_secs(30));

/// Resolved runtime configuration for one fetch run
#[derive(Clone)]
pub struct Config {
    /// Trailing range to fetch, in days before now
    pub days_back: i64,
    /// Directory receiving `{file_prefix}_NNNN.json`
    pub output_dir: PathBuf,
    pub api_key: Option<String>,
    pub base_url: String,
    /// `resultsPerPage`, 1..=2000
    pub page_size: u32,
    /// Records per shard
    pub shard_size: usize,
    /// Byte cap per shard file
    pub max_shard_bytes: usize,
    pub file_prefix: String,
    pub date_filter: DateFilter,
    /// Explicit quota; `None` picks [`PUBLIC_QUOTA`] or [`KEYED_QUOTA`]
    pub rate_limit: Option<RateLimitConfig>,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    /// Longest window per query
    pub max_span: TimeDelta,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            days_back: 7,
            output_dir: PathBuf::from("output"),
            api_key: None,
            base_url: NVD_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
            shard_size: 10_000,
            max_shard_bytes: 128 * 1024 * 1024,
            file_prefix: "cve".to_string(),
            date_filter: DateFilter::Published,
            rate_limit: None,
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            max_span: TimeDelta::days(MAX_SPAN_DAYS),
        }
    }
}

// The API key never appears in Debug output
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("days_back", &self.days_back)
            .field("output_dir", &self.output_dir)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("shard_size", &self.shard_size)
            .field("max_shard_bytes", &self.max_shard_bytes)
            .field("file_prefix", &self.file_prefix)
            .field("date_filter", &self.date_filter)
            .field("rate_limit", &self.rate_limit)
            .field("retry", &self.retry)
            .field("http", &self.http)
            .field("max_span", &self.max_span)
            .finish()
    }
}

impl Config {
    /// Effective request quota
    pub fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit.unwrap_or(if self.has_api_key() {
            KEYED_QUOTA
        } else {
            PUBLIC_QUOTA
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            output_dir: self.output_dir.clone(),
            prefix: self.file_prefix.clone(),
            max_records: self.shard_size,
            max_bytes: self.max_shard_bytes,
        }
    }

    /// Check bounds that do not depend on the clock. `days_back` is checked by the planner.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(FetchError::invalid_config(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.shard_size == 0 {
            return Err(FetchError::invalid_config("shard_size must be positive"));
        }
        if self.max_shard_bytes == 0 {
            return Err(FetchError::invalid_config("max_shard_bytes must be positive"));
        }
        if self.file_prefix.is_empty()
            || self.file_prefix.contains(['/', '\\'])
            || self.file_prefix.starts_with('.')
        {
            return Err(FetchError::invalid_config(format!(
                "file_prefix must be a plain file name stem, got {:?}",
                self.file_prefix
            )));
        }
        if let Err(e) = reqwest::Url::parse(&self.base_url) {
            return Err(FetchError::invalid_config(format!(
                "base_url {:?} is not a valid URL: {e}",
                self.base_url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(FetchError::invalid_config("retry max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(FetchError::invalid_config(format!(
                "retry jitter must be within 0.0..=1.0, got {}",
                self.retry.jitter
            )));
        }
        let quota = self.rate_limit();
        if quota.max_requests == 0 || quota.window.is_zero() {
            return Err(FetchError::invalid_config(
                "rate limit needs at least one request per non-empty window",
            ));
        }
        Ok(())
    }
}
