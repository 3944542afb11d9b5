//! Per-attempt deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The wrapped call did not finish within its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms", .limit.as_millis())]
pub struct TimeoutError {
    /// The deadline that was exceeded.
    pub limit: Duration,
}

/// Run `fut`, failing with `E::from(TimeoutError)` if it exceeds `limit`.
///
/// The inner future is dropped on timeout, cancelling it.
pub async fn with_timeout<F, T, E>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::from(TimeoutError { limit })),
    }
}
