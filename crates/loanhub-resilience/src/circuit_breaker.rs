//! Circuit breaker for an unreliable downstream dependency.
//!
//! # States
//!
//! - **Closed**: calls pass through. Each failure increments a counter and
//!   any success resets it. If the previous failure is older than the
//!   monitoring period the counter restarts from zero first. Reaching the
//!   failure threshold opens the circuit.
//! - **Open**: calls fail immediately with [`CircuitBreakerError::Open`]
//!   without running the operation, until the reset timeout has elapsed.
//! - **HalfOpen**: calls pass through. `success_threshold` consecutive
//!   successes close the circuit; any failure reopens it with a fresh
//!   reset timeout.
//!
//! Timing uses [`tokio::time::Instant`], so tests can drive it with a
//! paused clock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures within `monitoring_period` that open the circuit.
    pub failure_threshold: u32,
    /// Gap after which an old failure count is discarded.
    pub monitoring_period: Duration,
    /// How long the circuit stays open before probing.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes needed to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            monitoring_period: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Probing recovery.
    HalfOpen,
}

impl CircuitState {
    /// Upper-case label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the operation was not run.
    #[error("circuit breaker is open")]
    Open,
    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was rejected without running.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

/// Three-state circuit breaker.
///
/// Clones share state; build one per protected resource.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Create a closed breaker. `name` identifies the resource in logs.
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                opened_at: None,
            })),
        }
    }

    /// Current state, applying the open -> half-open timeout if it has elapsed.
    pub async fn state(&self) -> CircuitState {
        let mut state = self.state.lock().await;
        self.maybe_half_open(&mut state);
        state.state
    }

    /// Current consecutive failure count.
    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.failure_count
    }

    /// Run `operation` through the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire().await {
            tracing::warn!(resource = self.name, "Circuit breaker is OPEN, rejecting call");
            return Err(CircuitBreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Force the breaker back to closed.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        tracing::info!(resource = self.name, "Circuit breaker manually reset to CLOSED");
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.last_failure_at = None;
        state.opened_at = None;
    }

    async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.maybe_half_open(&mut state);
        state.state != CircuitState::Open
    }

    fn maybe_half_open(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let elapsed = state
            .opened_at
            .map(|at| at.elapsed() >= self.config.reset_timeout)
            .unwrap_or(true);
        if elapsed {
            tracing::info!(resource = self.name, "Circuit breaker transitioning OPEN -> HALF_OPEN");
            state.state = CircuitState::HalfOpen;
            state.success_count = 0;
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
                state.last_failure_at = None;
            }
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        resource = self.name,
                        successes = state.success_count,
                        "Circuit breaker transitioning HALF_OPEN -> CLOSED"
                    );
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.last_failure_at = None;
                    state.opened_at = None;
                }
            }
            // A call admitted before another caller opened the circuit.
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.state {
            CircuitState::Closed => {
                let stale = state
                    .last_failure_at
                    .map(|at| now.duration_since(at) > self.config.monitoring_period)
                    .unwrap_or(false);
                if stale {
                    state.failure_count = 0;
                }
                state.failure_count += 1;
                state.last_failure_at = Some(now);

                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        resource = self.name,
                        failures = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker transitioning CLOSED -> OPEN"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    resource = self.name,
                    "Circuit breaker transitioning HALF_OPEN -> OPEN (probe failed)"
                );
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.last_failure_at = Some(now);
                state.success_count = 0;
            }
            CircuitState::Open => {
                state.last_failure_at = Some(now);
            }
        }
    }
}
