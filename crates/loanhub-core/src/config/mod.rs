//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod database;
pub mod logging;
pub mod mail;
pub mod notification;
pub mod reservation;
pub mod worker;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::mail::{MailConfig, MailProvider};
pub use self::notification::{CircuitBreakerSettings, NotificationConfig, RetrySettings};
pub use self::reservation::ReservationConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Reservation policy settings.
    #[serde(default)]
    pub reservation: ReservationConfig,
    /// Waitlist notification resilience settings.
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Mail transport settings.
    #[serde(default)]
    pub mail: MailConfig,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// How much longer one notification may run than the worker's
    /// shutdown grace period, if at all.
    pub fn shutdown_grace_shortfall(&self) -> Option<Duration> {
        self.notification
            .worst_case_latency()
            .checked_sub(self.worker.shutdown_grace())
            .filter(|gap| !gap.is_zero())
    }

    /// Load configuration from TOML files.
    ///
    /// Merges the base file at `path` with an optional `config/{env}`
    /// overlay (env taken from `LOANHUB_ENV`) and environment variables
    /// prefixed with `LOANHUB__`.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let env = std::env::var("LOANHUB_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LOANHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
