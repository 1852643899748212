//! Retry with exponential backoff and jitter for page requests

use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::FetchError;
use crate::shutdown::ShutdownFlag;

/// Backoff schedule: `initial_delay * 2^(n-1)` before retry `n`, capped at
/// `max_delay`, plus up to `jitter` (fraction of the delay) of random slack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

/// Wraps fallible operations with bounded retries on transient errors.
pub struct RetryPolicy {
    config: RetryConfig,
    clock: SharedClock,
    shutdown: Option<ShutdownFlag>,
    retries: u32,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            shutdown: None,
            retries: 0,
        }
    }

    /// Abort with [`FetchError::Cancelled`] instead of sleeping once shutdown is requested
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Capped delay before retry number `retry` (1-based), without jitter
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.config
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Wait before retry `retry` after `err`; `Retry-After` on a 429 wins.
    fn delay_for(&self, err: &FetchError, retry: u32) -> Duration {
        if let Some(after) = err.retry_after() {
            return after;
        }
        let base = self.backoff_duration(retry);
        (base + self.jitter(base)).min(self.config.max_delay)
    }

    fn jitter(&self, base: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return Duration::ZERO;
        }
        let max_ms = (base.as_millis() as f64 * self.config.jitter) as u64;
        Duration::from_millis(fastrand::u64(0..=max_ms))
    }

    /// Run `op` until it succeeds, fails fatally, or exhausts `max_attempts`.
    ///
    /// Non-retryable errors are returned unchanged. Exhaustion is reported as
    /// [`FetchError::Exhausted`] carrying the last transient cause.
    pub fn run<T>(
        &mut self,
        label: &str,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(v) => {
                    if attempt > 1 {
                        log::debug!("{label}: succeeded on attempt {attempt}");
                    }
                    return Ok(v);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    log::error!("{label}: failed permanently after {attempt} attempts: {e}");
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last_cause: Box::new(e),
                    });
                }
                Err(e) => {
                    if self.shutdown.as_ref().is_some_and(ShutdownFlag::is_requested) {
                        return Err(FetchError::Cancelled);
                    }
                    let delay = self.delay_for(&e, attempt);
                    self.retries += 1;
                    log::warn!(
                        "{label}: attempt {attempt}/{max_attempts} failed: {e}, retrying in {:.1}s",
                        delay.as_secs_f64()
                    );
                    self.clock.sleep(delay);
                }
            }
        }
    }

    /// Retries performed across every `run` call so far
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    fn policy(config: RetryConfig) -> (RetryPolicy, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RetryPolicy::new(config, clock.clone()), clock)
    }

    fn network() -> FetchError {
        FetchError::Network {
            message: "connection refused".to_string(),
        }
    }

    fn http(status: u16, retry_after: Option<Duration>) -> FetchError {
        FetchError::Http {
            status,
            retry_after,
            message: "test".to_string(),
        }
    }

    /// Operation that replays a fixed script of outcomes
    fn scripted(
        outcomes: Vec<Result<u32, FetchError>>,
    ) -> (RefCell<VecDeque<Result<u32, FetchError>>>, RefCell<u32>) {
        (RefCell::new(outcomes.into()), RefCell::new(0))
    }

    #[test]
    fn backoff_exponential() {
        let (policy, _) = policy(no_jitter());
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_duration(4), Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped() {
        let (policy, _) = policy(RetryConfig {
            max_delay: Duration::from_secs(5),
            ..no_jitter()
        });
        assert_eq!(policy.backoff_duration(4), Duration::from_secs(5));
        assert_eq!(policy.backoff_duration(40), Duration::from_secs(5));
    }

    #[test]
    fn recovers_after_two_network_errors() {
        let (mut policy, clock) = policy(no_jitter());
        let (script, calls) = scripted(vec![Err(network()), Err(network()), Ok(7)]);
        let result = policy.run("test", || {
            *calls.borrow_mut() += 1;
            script.borrow_mut().pop_front().unwrap()
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(*calls.borrow(), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(policy.retries(), 2);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let (mut policy, clock) = policy(RetryConfig {
            max_attempts: 3,
            ..no_jitter()
        });
        let mut calls = 0;
        let err = policy
            .run("test", || -> Result<(), FetchError> {
                calls += 1;
                Err(http(503, None))
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(clock.sleeps().len(), 2);
        match err {
            FetchError::Exhausted {
                attempts,
                last_cause,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_cause, FetchError::Http { status: 503, .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn single_attempt_budget() {
        let (mut policy, clock) = policy(RetryConfig {
            max_attempts: 1,
            ..no_jitter()
        });
        let err = policy
            .run("test", || -> Result<(), FetchError> { Err(network()) })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exhausted);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn fatal_errors_propagate_immediately() {
        let (mut policy, clock) = policy(no_jitter());
        for fatal in [
            http(404, None),
            http(403, None),
            FetchError::malformed("missing totalResults"),
            FetchError::invalid_range("bad"),
        ] {
            let kind = fatal.kind();
            let mut slot = Some(fatal);
            let mut calls = 0;
            let err = policy
                .run("test", || -> Result<(), FetchError> {
                    calls += 1;
                    Err(slot.take().unwrap())
                })
                .unwrap_err();
            assert_eq!(calls, 1);
            assert_eq!(err.kind(), kind);
        }
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn retry_after_takes_precedence() {
        let (mut policy, clock) = policy(no_jitter());
        let (script, _) = scripted(vec![Err(http(429, Some(Duration::from_secs(7)))), Ok(1)]);
        policy
            .run("test", || script.borrow_mut().pop_front().unwrap())
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
    }

    #[test]
    fn retry_after_may_exceed_max_delay() {
        let (mut policy, clock) = policy(RetryConfig {
            max_delay: Duration::from_secs(2),
            ..no_jitter()
        });
        let (script, _) = scripted(vec![Err(http(429, Some(Duration::from_secs(30)))), Ok(1)]);
        policy
            .run("test", || script.borrow_mut().pop_front().unwrap())
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[test]
    fn throttled_without_header_uses_backoff() {
        let (mut policy, clock) = policy(no_jitter());
        let (script, _) = scripted(vec![Err(http(429, None)), Ok(1)]);
        policy
            .run("test", || script.borrow_mut().pop_front().unwrap())
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let (mut policy, clock) = policy(RetryConfig {
            max_attempts: 4,
            jitter: 0.5,
            ..RetryConfig::default()
        });
        let _ = policy.run("test", || -> Result<(), FetchError> { Err(network()) });
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 3);
        for (i, slept) in sleeps.iter().enumerate() {
            let base = Duration::from_secs(1 << i);
            assert!(*slept >= base, "{slept:?} below {base:?}");
            assert!(*slept <= base + base / 2, "{slept:?} above jitter bound");
        }
    }

    #[test]
    fn shutdown_cancels_before_sleep() {
        let flag = ShutdownFlag::new();
        flag.request();
        let clock = Arc::new(ManualClock::new());
        let mut policy = RetryPolicy::new(no_jitter(), clock.clone()).with_shutdown(flag);
        let err = policy
            .run("test", || -> Result<(), FetchError> { Err(network()) })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(clock.sleeps().is_empty());
    }
}
