//! Bounded retry with exponential backoff.
//!
//! The delay before retry number `n` (counting the first attempt as 1) is
//! `min(max_delay, initial_delay * backoff_multiplier^(n - 1))`. No jitter
//! is applied, so the schedule is fully determined by the policy.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Retry policy configuration.
///
/// # Default Values
///
/// - `max_attempts`: 3 (including the first call)
/// - `initial_delay`: 1 second
/// - `max_delay`: 10 seconds
/// - `backoff_multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Values below 1
    /// are treated as 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Cap for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Set the total number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        if capped.is_nan() || capped <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(capped)
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Executes fallible async operations under a [`RetryPolicy`].
///
/// Cheap to clone; build one per protected resource and share it.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    name: &'static str,
    policy: RetryPolicy,
}

impl RetryHandler {
    /// Create a handler. `name` identifies the protected resource in logs.
    pub fn new(name: &'static str, policy: RetryPolicy) -> Self {
        Self { name, policy }
    }

    /// The policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, treating every error as retryable.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation, |_| true).await
    }

    /// Run `operation`, retrying only errors for which `is_retryable` holds.
    ///
    /// A non-retryable error, or the error of the final attempt, is
    /// returned as-is without further delay.
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            resource = self.name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !is_retryable(&err) {
                        tracing::warn!(
                            resource = self.name,
                            attempt,
                            error = %err,
                            "Error is not retryable, failing immediately"
                        );
                        return Err(err);
                    }

                    if attempt >= max_attempts {
                        tracing::error!(
                            resource = self.name,
                            attempt,
                            error = %err,
                            "Operation failed after max attempts"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_after_attempt(attempt);
                    tracing::warn!(
                        resource = self.name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
    }

    #[test]
    fn test_delay_schedule_is_capped() {
        let policy = fast_policy();
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(250));
        assert_eq!(policy.delay_after_attempt(40), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let handler = RetryHandler::new("test", fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let result = handler
            .execute_if(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 { Err(format!("fail {n}")) } else { Ok(n) }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_after_one_call() {
        let handler = RetryHandler::new("test", fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), String> = handler
            .execute_if(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("400 bad request".to_string())
                    }
                },
                |err| !err.starts_with("4"),
            )
            .await;

        assert_eq!(result, Err("400 bad request".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let handler = RetryHandler::new("test", fast_policy());
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), String> = handler
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(format!("fail {n}"))
                }
            })
            .await;

        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let handler = RetryHandler::new("test", fast_policy());
        let start = tokio::time::Instant::now();

        let _: Result<(), &str> = handler.execute(|| async { Err("down") }).await;

        // 100ms after attempt 1, 200ms after attempt 2, none after the last.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let handler = RetryHandler::new("test", RetryPolicy::default().with_max_attempts(0));
        let result = handler.execute(|| async { Ok::<_, String>(1) }).await;
        assert_eq!(result, Ok(1));
    }
}
