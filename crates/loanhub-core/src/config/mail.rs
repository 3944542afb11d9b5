//! Mail transport configuration.

use serde::{Deserialize, Serialize};

/// Which mail transport delivers waitlist notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    /// Write messages to the log only (development).
    #[default]
    Log,
    /// POST messages to an HTTP mail gateway.
    Http,
}

/// Mail transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Transport selection.
    #[serde(default)]
    pub provider: MailProvider,
    /// Gateway endpoint for the `http` provider.
    #[serde(default)]
    pub endpoint: String,
    /// Bearer token sent to the gateway, if any.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: MailProvider::default(),
            endpoint: String::new(),
            api_key: None,
            from_address: default_from_address(),
        }
    }
}

fn default_from_address() -> String {
    "loans@loanhub.local".to_string()
}
