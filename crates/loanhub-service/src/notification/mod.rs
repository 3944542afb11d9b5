//! Resilient waitlist notifications.

pub mod dispatcher;
pub mod error;
pub mod transport;

use loanhub_core::config::NotificationConfig;
use loanhub_resilience::{CircuitBreaker, CircuitBreakerConfig, RetryHandler, RetryPolicy};

pub use dispatcher::{NotificationDispatcher, NotifyOutcome, availability_message};
pub use error::DeliveryError;
pub use transport::{HttpMailTransport, LogMailTransport, MailMessage, MailTransport, build_transport};

/// Name of the mail gateway in breaker and retry logs.
pub const MAIL_GATEWAY: &str = "mail-gateway";

/// Build the mail gateway's circuit breaker from configuration.
pub fn mail_breaker(config: &NotificationConfig) -> CircuitBreaker {
    let settings = &config.circuit_breaker;
    CircuitBreaker::new(
        MAIL_GATEWAY,
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            monitoring_period: settings.monitoring_period(),
            reset_timeout: settings.reset_timeout(),
            success_threshold: settings.success_threshold,
        },
    )
}

/// Build the mail gateway's retry handler from configuration.
pub fn mail_retry(config: &NotificationConfig) -> RetryHandler {
    let settings = &config.retry;
    RetryHandler::new(
        MAIL_GATEWAY,
        RetryPolicy::default()
            .with_max_attempts(settings.max_attempts)
            .with_initial_delay(settings.initial_delay())
            .with_max_delay(settings.max_delay())
            .with_backoff_multiplier(settings.backoff_multiplier),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retry_policy_from_defaults() {
        let retry = mail_retry(&NotificationConfig::default());
        assert_eq!(retry.policy().max_attempts, 3);
        assert_eq!(retry.policy().delay_after_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.policy().delay_after_attempt(2), Duration::from_secs(2));
    }
}
