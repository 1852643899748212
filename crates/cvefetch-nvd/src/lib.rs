//! cvefetch NVD - CVE API 2.0 source
//!
//! Pages through the NVD CVE API one date window at a time and writes the raw
//! records to sharded JSON files.

pub mod api;
pub mod config;
pub mod runner;
pub mod schema;
pub mod state;

// Re-exports
pub use api::{NvdFetcher, PageRequest, PageSource};
pub use config::{Config, KEYED_QUOTA, MAX_PAGE_SIZE, MAX_SPAN_DAYS, NVD_BASE_URL, PUBLIC_QUOTA};
pub use runner::{FetchPipeline, FetchSummary, run};
pub use schema::{PageResult, parse_page, record_id};
pub use state::{DateFilter, FetchState};
