//! # loanhub-resilience
//!
//! Generic protective wrappers around unreliable async calls:
//! - [`RetryHandler`]: bounded retries with exponential backoff
//! - [`CircuitBreaker`]: three-state fail-fast guard
//! - [`with_timeout`]: hard per-attempt deadline
//!
//! Nothing here knows about reservations or mail. One instance of each
//! wrapper is built per protected resource and shared by handle; there
//! is no global state.

pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use retry::{RetryHandler, RetryPolicy};
pub use timeout::{TimeoutError, with_timeout};
