//! Rolling-window request quota with minimum spacing.
//!
//! The limiter is owned by a single pipeline and never shared, so it keeps
//! plain `&mut self` state instead of locks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::clock::SharedClock;

/// Quota: at most `max_requests` in any trailing `window`, and at least
/// `min_interval` between consecutive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub min_interval: Duration,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            min_interval: Duration::ZERO,
        }
    }

    pub const fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }
}

/// Blocks callers until issuing another request stays within the quota
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    /// Acquisition times still inside the trailing window, oldest first
    recent: VecDeque<Instant>,
    last: Option<Instant>,
    total_waited: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("recent", &self.recent.len())
            .field("total_waited", &self.total_waited)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            recent: VecDeque::with_capacity(config.max_requests.max(1) as usize),
            last: None,
            total_waited: Duration::ZERO,
        }
    }

    /// Wait (if needed) until a request is permitted, then record it.
    ///
    /// Returns how long the caller was suspended.
    pub fn acquire(&mut self) -> Duration {
        let wait = self.wait_time(self.clock.now());
        if !wait.is_zero() {
            log::debug!("Rate limit: waiting {:.2}s", wait.as_secs_f64());
            self.clock.sleep(wait);
            self.total_waited += wait;
        }
        let now = self.clock.now();
        self.prune(now);
        self.recent.push_back(now);
        self.last = Some(now);
        wait
    }

    /// Time until a request issued at `now` would respect the quota
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.prune(now);
        let mut wait = Duration::ZERO;

        if let Some(last) = self.last {
            wait = wait.max((last + self.config.min_interval).saturating_duration_since(now));
        }

        let max = self.config.max_requests.max(1) as usize;
        if self.recent.len() >= max {
            // The request `max` positions back must leave the window first
            let blocking = self.recent[self.recent.len() - max];
            wait = wait.max((blocking + self.config.window).saturating_duration_since(now));
        }
        wait
    }

    /// Cumulative time spent waiting in [`acquire`](Self::acquire)
    pub fn total_waited(&self) -> Duration {
        self.total_waited
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}
