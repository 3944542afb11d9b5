//! Waitlist notification resilience configuration.
//!
//! Worst-case latency of one notification trigger is bounded by
//! `retry.max_attempts * (attempt_timeout + retry.max_delay)`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Notification pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Hard timeout for a single delivery attempt, in milliseconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
    /// Retry policy applied around each delivery.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Circuit breaker protecting the mail transport.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

impl NotificationConfig {
    /// Per-attempt timeout as a [`Duration`].
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Upper bound on the time one trigger may spend delivering.
    pub fn worst_case_latency(&self) -> Duration {
        (self.attempt_timeout() + self.retry.max_delay()) * self.retry.max_attempts
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Cap on any single delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetrySettings {
    /// Initial delay as a [`Duration`].
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Maximum delay as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Circuit breaker thresholds and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Failures within the monitoring period that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Window after which a stale failure count decays to zero, in seconds.
    #[serde(default = "default_monitoring_period")]
    pub monitoring_period_secs: u64,
    /// Time the circuit stays open before probing, in seconds.
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
    /// Consecutive half-open successes needed to close the circuit.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl CircuitBreakerSettings {
    /// Monitoring period as a [`Duration`].
    pub fn monitoring_period(&self) -> Duration {
        Duration::from_secs(self.monitoring_period_secs)
    }

    /// Reset timeout as a [`Duration`].
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            monitoring_period_secs: default_monitoring_period(),
            reset_timeout_secs: default_reset_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_attempt_timeout() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_monitoring_period() -> u64 {
    60
}

fn default_reset_timeout() -> u64 {
    30
}

fn default_success_threshold() -> u32 {
    2
}
