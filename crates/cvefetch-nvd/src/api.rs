//! NVD CVE API client

use cvefetch_core::http::error_from_reqwest;
use cvefetch_core::window::format_timestamp;
use cvefetch_core::{
    FetchError, FetchWindow, HttpConfig, build_client, build_runtime, parse_retry_after,
};

use crate::schema::{PageResult, parse_page};
use crate::state::DateFilter;

/// NVD reports error details in this response header
const MESSAGE_HEADER: &str = "message";

/// One page of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub window: FetchWindow,
    pub offset: u64,
    pub limit: u32,
}

impl PageRequest {
    /// Query string pairs in the order the API documents them
    pub fn query_params(&self, filter: DateFilter) -> Vec<(&'static str, String)> {
        let (start_param, end_param) = filter.param_names();
        vec![
            (start_param, format_timestamp(self.window.start())),
            (end_param, format_timestamp(self.window.query_end())),
            ("startIndex", self.offset.to_string()),
            ("resultsPerPage", self.limit.to_string()),
        ]
    }
}

/// Source of pages for the pipeline
pub trait PageSource {
    fn fetch(&mut self, request: &PageRequest) -> Result<PageResult, FetchError>;
}

/// Blocking CVE API client: one GET per call on an owned current-thread runtime
pub struct NvdFetcher {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    base_url: String,
    api_key: Option<String>,
    date_filter: DateFilter,
}

impl std::fmt::Debug for NvdFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvdFetcher")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("date_filter", &self.date_filter)
            .finish_non_exhaustive()
    }
}

impl NvdFetcher {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        date_filter: DateFilter,
        http: &HttpConfig,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(http)?,
            runtime: build_runtime()?,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            date_filter,
        })
    }

    pub fn from_config(config: &crate::Config) -> Result<Self, FetchError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.date_filter,
            &config.http,
        )
    }

    async fn get(&self, request: &PageRequest) -> Result<Vec<u8>, FetchError> {
        let mut builder = self
            .client
            .get(&self.base_url)
            .query(&request.query_params(self.date_filter));
        if let Some(key) = &self.api_key {
            builder = builder.header("apiKey", key);
        }

        let resp = builder.send().await.map_err(|e| error_from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let message = resp
                .headers()
                .get(MESSAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(FetchError::Http {
                status: status.as_u16(),
                retry_after,
                message,
            });
        }

        let body = resp.bytes().await.map_err(|e| error_from_reqwest(&e))?;
        Ok(body.to_vec())
    }
}

impl PageSource for NvdFetcher {
    fn fetch(&mut self, request: &PageRequest) -> Result<PageResult, FetchError> {
        log::debug!(
            "GET {} window={} startIndex={} resultsPerPage={}",
            self.base_url,
            request.window,
            request.offset,
            request.limit
        );
        let body = self.runtime.block_on(self.get(request))?;
        parse_page(&body, request.offset)
    }
}
