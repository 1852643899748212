//! cvefetch core - building blocks for rate-limited, paginated record fetching
//!
//! Window planning, request pacing, retry, sharded JSON output and the
//! logging/progress plumbing shared by the source and CLI crates.

pub mod clock;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod shard;
pub mod shutdown;
pub mod window;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use error::{ErrorKind, FetchError, FetchPosition, RunError};
pub use http::{HttpConfig, build_client, build_runtime, parse_retry_after};
pub use logging::{CliLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_duration, fmt_num};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{RetryConfig, RetryPolicy};
pub use shard::{ShardConfig, ShardStats, ShardWriter};
pub use shutdown::ShutdownFlag;
pub use window::{FetchWindow, plan};
