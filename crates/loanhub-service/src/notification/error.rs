//! Mail delivery failure classification.

use std::time::Duration;

use thiserror::Error;

use loanhub_core::error::AppError;
use loanhub_resilience::TimeoutError;

/// Why a notification could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// A single attempt exceeded its deadline.
    #[error("mail delivery timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Network trouble, 5xx or 429 from the gateway.
    #[error("transient mail delivery failure: {0}")]
    Transient(String),
    /// The gateway rejected the message (4xx, bad address).
    #[error("permanent mail delivery failure: {0}")]
    Permanent(String),
    /// The circuit breaker rejected the call without trying.
    #[error("mail gateway circuit is open")]
    CircuitOpen,
}

impl DeliveryError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }
}

impl From<TimeoutError> for DeliveryError {
    fn from(err: TimeoutError) -> Self {
        Self::Timeout(err.limit)
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::CircuitOpen => AppError::service_unavailable(err.to_string()),
            other => AppError::external_service(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(DeliveryError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(DeliveryError::Transient("503".into()).is_retryable());
        assert!(!DeliveryError::Permanent("400".into()).is_retryable());
        assert!(!DeliveryError::CircuitOpen.is_retryable());
    }

    #[test]
    fn test_circuit_open_maps_to_unavailable() {
        let err: AppError = DeliveryError::CircuitOpen.into();
        assert_eq!(err.kind, loanhub_core::ErrorKind::ServiceUnavailable);
    }
}
