//! Retry/backoff for store writes
//!
//! [`Backoff`] is a plain state machine (attempt counter + next delay) with no
//! knowledge of the store, so the policy can be checked without a network.
//! [`write_with_retry`] drives it against any [`Store`].

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::store::{Store, StoreError};

/// Default number of attempts, the first one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay after the first failed attempt
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            attempt: 1,
            delay: self.initial_delay,
            policy: *self,
        }
    }
}

/// Backoff state for one write
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    delay: Duration,
    policy: RetryPolicy,
}

impl Backoff {
    /// The attempt currently in flight (1-based)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Register a failed attempt
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// every attempt has been used.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.delay;
        self.attempt += 1;
        self.delay = self.delay.saturating_mul(self.policy.multiplier);
        Some(delay)
    }
}

/// Result of a write after retries
#[derive(Debug)]
pub enum WriteOutcome {
    Stored { attempts: u32 },
    Exhausted { attempts: u32 },
    Raised { attempts: u32, error: StoreError },
}

/// Write `value` under `key`, retrying falsy results with backoff
///
/// A raised [`StoreError`] stops immediately. Sleeping suspends only the
/// calling worker.
pub async fn write_with_retry(
    store: &mut dyn Store,
    key: &str,
    value: &[u8],
    policy: &RetryPolicy,
) -> WriteOutcome {
    let mut backoff = policy.backoff();

    loop {
        match store.set(key, value).await {
            Ok(true) => {
                return WriteOutcome::Stored {
                    attempts: backoff.attempt(),
                }
            },
            Ok(false) => {
                let failed = backoff.attempt();
                let Some(delay) = backoff.next_delay() else {
                    return WriteOutcome::Exhausted { attempts: failed };
                };
                debug!(
                    addr = store.addr(),
                    key,
                    attempt = failed,
                    delay_ms = delay.as_millis() as u64,
                    "Store write failed, backing off"
                );
                tokio::time::sleep(delay).await;
            },
            Err(error) => {
                return WriteOutcome::Raised {
                    attempts: backoff.attempt(),
                    error,
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::time::Instant;

    struct FlakyStore {
        failures_left: u32,
        calls: u32,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn set(&mut self, _key: &str, _value: &[u8]) -> Result<bool, StoreError> {
            self.calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Ok(false);
            }
            Ok(true)
        }

        fn addr(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_backoff_delays_double() {
        let mut backoff = RetryPolicy::default().backoff();
        let delays: Vec<Duration> = std::iter::from_fn(|| backoff.next_delay()).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn test_single_attempt_policy_never_waits() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff().next_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let mut store = FlakyStore {
            failures_left: 0,
            calls: 0,
        };
        let start = Instant::now();

        let outcome = write_with_retry(&mut store, "k", b"v", &RetryPolicy::default()).await;

        assert!(matches!(outcome, WriteOutcome::Stored { attempts: 1 }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let mut store = FlakyStore {
            failures_left: u32::MAX,
            calls: 0,
        };
        let start = Instant::now();

        let outcome = write_with_retry(&mut store, "k", b"v", &RetryPolicy::default()).await;

        assert!(matches!(outcome, WriteOutcome::Exhausted { attempts: 5 }));
        assert_eq!(store.calls, 5);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3010), "waited {elapsed:?}");
    }
}
