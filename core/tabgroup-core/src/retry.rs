//! Bounded retry with linear backoff for transient host failures.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::HostError;
use crate::host::{Clock, HostResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Delay before retry `n` (1-based) is `step * n`.
    pub step: Duration,
}

impl RetryPolicy {
    /// Store access: 2 extra attempts after 1s and 2s.
    pub const STORE: RetryPolicy = RetryPolicy {
        retries: 2,
        step: Duration::from_millis(1000),
    };

    /// Tab edits while the strip is locked: 3 extra attempts, 300ms steps.
    pub const TAB_EDIT: RetryPolicy = RetryPolicy {
        retries: 3,
        step: Duration::from_millis(300),
    };

    pub fn delay_before(&self, retry: u32) -> Duration {
        self.step.saturating_mul(retry)
    }

    /// Sum of all backoff delays; the worst-case latency this policy adds.
    pub fn worst_case_delay(&self) -> Duration {
        (1..=self.retries)
            .map(|retry| self.delay_before(retry))
            .fold(Duration::ZERO, |acc, delay| acc.saturating_add(delay))
    }

    /// Runs `op`, retrying only failures accepted by `retryable`.
    pub fn run<T, R, F>(
        &self,
        clock: &dyn Clock,
        label: &str,
        retryable: R,
        mut op: F,
    ) -> HostResult<T>
    where
        R: Fn(&HostError) -> bool,
        F: FnMut() -> HostResult<T>,
    {
        let mut retry = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if retry < self.retries && retryable(&err) => {
                    retry += 1;
                    let delay = self.delay_before(retry);
                    debug!(
                        error = %err,
                        attempt = retry + 1,
                        max_attempts = self.retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying {}",
                        label
                    );
                    clock.sleep(delay);
                }
                Err(err) => {
                    if retry > 0 {
                        warn!(error = %err, attempts = retry + 1, "{} failed after retries", label);
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClock;
    use std::cell::Cell;

    #[test]
    fn store_policy_caps_added_latency_at_three_seconds() {
        assert_eq!(RetryPolicy::STORE.worst_case_delay(), Duration::from_secs(3));
    }

    #[test]
    fn retries_transient_failures_with_linear_backoff() {
        let clock = FakeClock::new(0);
        let calls = Cell::new(0);
        let result = RetryPolicy::STORE.run(&clock, "read", HostError::is_unavailable, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(HostError::Unavailable("No SW".to_string()))
            } else {
                Ok(calls.get())
            }
        });

        assert_eq!(result, Ok(3));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[test]
    fn gives_up_after_configured_retries() {
        let clock = FakeClock::new(0);
        let calls = Cell::new(0);
        let result: HostResult<()> =
            RetryPolicy::STORE.run(&clock, "read", HostError::is_unavailable, || {
                calls.set(calls.get() + 1);
                Err(HostError::Unavailable("No SW".to_string()))
            });

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn non_retryable_failures_return_immediately() {
        let clock = FakeClock::new(0);
        let calls = Cell::new(0);
        let result: HostResult<()> =
            RetryPolicy::TAB_EDIT.run(&clock, "remove tab", HostError::is_busy, || {
                calls.set(calls.get() + 1);
                Err(HostError::Failed("No tab with id: 4".to_string()))
            });

        assert_eq!(result, Err(HostError::Failed("No tab with id: 4".to_string())));
        assert_eq!(calls.get(), 1);
        assert!(clock.sleeps().is_empty());
    }
}
