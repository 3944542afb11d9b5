//! Unified application error types for LoanHub.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. Business conflicts carry a
//! [`ConflictReason`] so callers can tell "no inventory left" apart from
//! a generic failure and offer the waitlist instead.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested resource was not found.
    NotFound,
    /// Input validation failed before any transaction was opened.
    Validation,
    /// A business conflict occurred; see [`ConflictReason`].
    Conflict,
    /// A database error occurred.
    Database,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An external service (mail gateway) failed.
    ExternalService,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Database => write!(f, "DATABASE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::ExternalService => write!(f, "EXTERNAL_SERVICE"),
            Self::ServiceUnavailable => write!(f, "SERVICE_UNAVAILABLE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Sub-classification of [`ErrorKind::Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    /// No available unit could be claimed for the device.
    NoInventory,
    /// The user already has a pending waitlist entry for the device.
    AlreadyJoined,
    /// The reservation is not in a state that allows the transition.
    InvalidState,
    /// The caller does not own the reservation.
    Forbidden,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInventory => write!(f, "NO_INVENTORY"),
            Self::AlreadyJoined => write!(f, "ALREADY_JOINED"),
            Self::InvalidState => write!(f, "INVALID_STATE"),
            Self::Forbidden => write!(f, "FORBIDDEN"),
        }
    }
}

/// The unified application error used throughout LoanHub.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Conflict sub-classification, set only for [`ErrorKind::Conflict`].
    pub conflict: Option<ConflictReason>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            conflict: None,
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            conflict: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a conflict error with the given reason.
    pub fn conflict(reason: ConflictReason, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            message: message.into(),
            conflict: Some(reason),
            source: None,
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// No unit of the device is free right now.
    pub fn no_inventory(message: impl Into<String>) -> Self {
        Self::conflict(ConflictReason::NoInventory, message)
    }

    /// The user is already waiting for the device.
    pub fn already_joined(message: impl Into<String>) -> Self {
        Self::conflict(ConflictReason::AlreadyJoined, message)
    }

    /// The requested state transition is not allowed.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::conflict(ConflictReason::InvalidState, message)
    }

    /// The caller does not own the resource.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::conflict(ConflictReason::Forbidden, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an external-service error.
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    /// Create a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Check whether this is a conflict with the given reason.
    pub fn is_conflict(&self, reason: ConflictReason) -> bool {
        self.kind == ErrorKind::Conflict && self.conflict == Some(reason)
    }

    /// Check whether this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Stable machine-readable code, e.g. `CONFLICT/NO_INVENTORY`.
    pub fn code(&self) -> String {
        match self.conflict {
            Some(reason) => format!("{}/{}", self.kind, reason),
            None => self.kind.to_string(),
        }
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            conflict: self.conflict,
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Internal, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
