//! Bounded exponential backoff.

use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// For in-band delivery from a hook the host is blocked on.
    pub fn fast(config: &RetryConfig) -> Self {
        Self::new(
            config.fast_attempts,
            Duration::from_millis(config.fast_initial_delay_millis),
        )
    }

    /// For background and administrative retries.
    #[allow(dead_code)]
    pub fn slow(config: &RetryConfig) -> Self {
        Self::new(
            config.slow_attempts,
            Duration::from_millis(config.slow_initial_delay_millis),
        )
    }

    /// Delay after failed attempt `attempt` (1-based): initial × 2^(attempt-1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds or attempts run out; the last error
    /// is returned unchanged.
    pub fn run<T>(&self, label: &str, operation: impl FnMut() -> Result<T>) -> Result<T> {
        self.run_with_sleeper(label, operation, std::thread::sleep)
    }

    pub fn run_with_sleeper<T>(
        &self,
        label: &str,
        mut operation: impl FnMut() -> Result<T>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retry {attempt}/{} for {label}",
                        self.max_attempts
                    );
                    sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_config() {
        let config = RetryConfig::default();
        let fast = RetryPolicy::fast(&config);
        assert_eq!(fast.max_attempts, 3);
        assert_eq!(fast.initial_delay, Duration::from_secs(2));
        let slow = RetryPolicy::slow(&config);
        assert_eq!(slow.max_attempts, 10);
        assert_eq!(slow.initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(10, Duration::from_secs(5));
        let delays: Vec<u64> = (1..=4).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40]);
    }

    #[test]
    fn third_attempt_result_is_returned_after_two_backoffs() {
        let policy = RetryPolicy::new(3, Duration::from_millis(2000));
        let mut calls = 0;
        let mut slept = Vec::new();

        let value = policy
            .run_with_sleeper(
                "wake",
                || {
                    calls += 1;
                    if calls < 3 {
                        anyhow::bail!("gateway down")
                    }
                    Ok(calls)
                },
                |d| slept.push(d.as_millis()),
            )
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls, 3);
        assert_eq!(slept, vec![2000, 4000]);
    }

    #[test]
    fn final_error_is_rethrown_without_extra_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut calls = 0;
        let mut slept = 0;
        let err = policy
            .run_with_sleeper(
                "wake",
                || -> Result<()> {
                    calls += 1;
                    anyhow::bail!("attempt {calls} failed")
                },
                |_| slept += 1,
            )
            .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(slept, 2);
        assert_eq!(err.to_string(), "attempt 3 failed");
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.run("noop", || Ok(7)).unwrap(), 7);
    }
}
