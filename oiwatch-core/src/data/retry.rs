//! Bounded retry around the flaky per-expiration chain fetch.
//!
//! The delay between attempts goes through a [`Sleeper`] so tests can count
//! waits without sleeping.

#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, error, warn};

use super::provider::{ContractBatch, DataProvider};

/// Blocking delay between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(any(test, feature = "testing"))]
/// Sleeper that records requested delays and returns immediately. Enabled by
/// the `testing` feature.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "testing"))]
impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Fixed-delay retry policy: at most `max_attempts` calls, `delay` between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Build from a delay in (possibly fractional) seconds. Negative or
    /// non-finite delays become zero.
    pub fn from_secs(max_attempts: u32, delay_secs: f64) -> Self {
        let delay = if delay_secs.is_finite() && delay_secs > 0.0 {
            Duration::from_secs_f64(delay_secs)
        } else {
            Duration::ZERO
        };
        Self::new(max_attempts, delay)
    }

    /// Run `op` until it succeeds or attempts run out. `op` receives the
    /// 1-based attempt number. Returns the last error on exhaustion.
    pub fn retry<T, E, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(_) => {
                    sleeper.sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Fetch one expiration's chain with retries.
///
/// Returns `None` only after every attempt failed; the caller skips that
/// expiration and carries on. A successful batch is returned as-is, even if
/// it is empty.
pub fn fetch_with_retry(
    provider: &dyn DataProvider,
    ticker: &str,
    expiration: NaiveDate,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Option<ContractBatch> {
    let result = policy.retry(sleeper, |attempt| {
        debug!(ticker, %expiration, attempt, "fetching option chain");
        provider
            .fetch_contracts(ticker, expiration)
            .map_err(|e| {
                warn!(
                    ticker,
                    %expiration,
                    attempt,
                    max_attempts = policy.max_attempts,
                    kind = e.kind(),
                    transient = e.is_transient(),
                    error = %e,
                    "option chain fetch failed"
                );
                e
            })
    });

    match result {
        Ok(batch) => Some(batch),
        Err(e) => {
            error!(
                ticker,
                %expiration,
                attempts = policy.max_attempts,
                error = %e,
                "retries exhausted, skipping expiration"
            );
            None
        }
    }
}
