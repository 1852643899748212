//! `cvefetch.toml` loading and conversion into a run configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cvefetch_core::{HttpConfig, RateLimitConfig, RetryConfig};
use cvefetch_nvd::{DateFilter, KEYED_QUOTA, NVD_BASE_URL, PUBLIC_QUOTA};
use serde::Deserialize;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "NVD_API_KEY";

/// Global configuration for cvefetch
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub nvd: NvdConfig,
    pub output: OutputConfig,
    pub rate_limit: RateLimitFileConfig,
    pub retry: RetryFileConfig,
    pub http: HttpFileConfig,
    pub logging: LoggingConfig,
    /// File the configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NvdConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
    pub page_size: u32,
    pub date_filter: DateFilter,
}

impl Default for NvdConfig {
    fn default() -> Self {
        Self {
            base_url: NVD_BASE_URL.to_string(),
            api_key: std::env::var(API_KEY_ENV).ok(),
            page_size: cvefetch_nvd::MAX_PAGE_SIZE,
            date_filter: DateFilter::Published,
        }
    }
}

impl std::fmt::Debug for NvdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvdConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .field("date_filter", &self.date_filter)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub shard_size: usize,
    pub max_shard_bytes: usize,
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./cves"),
            shard_size: 10_000,
            max_shard_bytes: 128 * 1024 * 1024,
            prefix: "cve".to_string(),
        }
    }
}

/// Unset fields fall back to the NVD quota preset for the configured key
#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitFileConfig {
    pub max_requests: Option<u32>,
    pub window_secs: Option<u64>,
    pub min_interval_ms: Option<u64>,
}

impl RateLimitFileConfig {
    /// `None` when nothing is overridden
    pub fn resolve(&self, has_api_key: bool) -> Option<RateLimitConfig> {
        if self.max_requests.is_none() && self.window_secs.is_none() && self.min_interval_ms.is_none()
        {
            return None;
        }
        let preset = if has_api_key { KEYED_QUOTA } else { PUBLIC_QUOTA };
        Some(RateLimitConfig {
            max_requests: self.max_requests.unwrap_or(preset.max_requests),
            window: self
                .window_secs
                .map_or(preset.window, Duration::from_secs),
            min_interval: self
                .min_interval_ms
                .map_or(preset.min_interval, Duration::from_millis),
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryFileConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub jitter: f64,
}

impl Default for RetryFileConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_secs: 60,
            jitter: 0.1,
        }
    }
}

impl From<RetryFileConfig> for RetryConfig {
    fn from(c: RetryFileConfig) -> Self {
        Self {
            max_attempts: c.max_attempts,
            initial_delay: Duration::from_millis(c.initial_delay_ms),
            max_delay: Duration::from_secs(c.max_delay_secs),
            jitter: c.jitter,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpFileConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpFileConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            request_timeout_secs: 120,
        }
    }
}

impl From<HttpFileConfig> for HttpConfig {
    fn from(c: HttpFileConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(c.connect_timeout_secs),
            request_timeout: Duration::from_secs(c.request_timeout_secs),
            ..HttpConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for per-run log files; none when unset
    pub dir: Option<PathBuf>,
}

/// `api_key = "${NVD_API_KEY}"` reads the variable at load time
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// A whole-value `${VAR}` reference resolves to the variable, `None` when unset.
fn expand_env_var(s: &str) -> Option<String> {
    match s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(name) => std::env::var(name).ok(),
        None => Some(s.to_string()),
    }
}

impl Config {
    /// First of `./cvefetch.toml` and `<config dir>/cvefetch/config.toml`,
    /// or built-in defaults when neither exists.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("cvefetch.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "cvefetch") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Configured key, falling back to `NVD_API_KEY` when the file leaves it empty
    pub fn api_key(&self) -> Option<String> {
        self.nvd
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    /// Fetch configuration for one run, before CLI overrides
    pub fn fetch_config(&self, days_back: i64) -> cvefetch_nvd::Config {
        let api_key = self.api_key();
        cvefetch_nvd::Config {
            days_back,
            output_dir: self.output.dir.clone(),
            rate_limit: self.rate_limit.resolve(api_key.is_some()),
            api_key,
            base_url: self.nvd.base_url.clone(),
            page_size: self.nvd.page_size,
            shard_size: self.output.shard_size,
            max_shard_bytes: self.output.max_shard_bytes,
            file_prefix: self.output.prefix.clone(),
            date_filter: self.nvd.date_filter,
            retry: self.retry.into(),
            http: self.http.into(),
            ..Default::default()
        }
    }
}
