//! Mail transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::info;

use loanhub_core::config::{MailConfig, MailProvider};
use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;

use super::error::DeliveryError;

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Delivers a message or reports a classified failure.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Send one message.
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Mail delivered to log transport"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Posts messages as JSON to an HTTP mail gateway.
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
}

impl HttpMailTransport {
    /// Create a transport. `request_timeout` bounds each HTTP request.
    pub fn new(config: &MailConfig, request_timeout: Duration) -> AppResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(AppError::configuration(
                "mail.endpoint is required for the http mail provider",
            ));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        let payload = GatewayRequest {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                DeliveryError::Permanent(format!("invalid mail request: {e}"))
            } else {
                DeliveryError::Transient(format!("mail gateway unreachable: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            info!(to = %message.to, status = status.as_u16(), "Mail accepted by gateway");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Map a non-success gateway status to a delivery error.
fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let detail = format!("gateway returned {status}: {body}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryError::Transient(detail)
    } else {
        DeliveryError::Permanent(detail)
    }
}

/// Build the transport selected by `mail.provider`.
pub fn build_transport(
    config: &MailConfig,
    request_timeout: Duration,
) -> AppResult<Arc<dyn MailTransport>> {
    Ok(match config.provider {
        MailProvider::Log => Arc::new(LogMailTransport),
        MailProvider::Http => Arc::new(HttpMailTransport::new(config, request_timeout)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad address").is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_retryable());
    }

    #[test]
    fn test_http_transport_requires_endpoint() {
        let config = MailConfig {
            provider: MailProvider::Http,
            endpoint: String::new(),
            ..MailConfig::default()
        };
        assert!(HttpMailTransport::new(&config, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let message = MailMessage {
            to: "ada@example.com".into(),
            subject: "hi".into(),
            body: "body".into(),
        };
        assert_eq!(LogMailTransport.send(&message).await, Ok(()));
    }
}
