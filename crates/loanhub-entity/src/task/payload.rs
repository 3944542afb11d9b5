//! Typed payloads for in-process background tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

use loanhub_core::types::id::{DeviceId, ReservationId};

/// Why a unit went back into the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseCause {
    /// A pending reservation was cancelled.
    Cancelled,
    /// A collected unit was returned.
    Returned,
    /// A collected loan was closed.
    Completed,
    /// An operator triggered a sweep by hand.
    Manual,
}

/// Discriminant used to route tasks to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// See [`LoanTask::NotifyWaitlist`].
    NotifyWaitlist,
}

impl TaskKind {
    /// Return the kind as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotifyWaitlist => "notify_waitlist",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work submitted after a transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum LoanTask {
    /// Offer a freed unit to the next user waiting for the device.
    NotifyWaitlist {
        /// Device whose unit was released.
        device_id: DeviceId,
        /// Reservation that released it, if any.
        reservation_id: Option<ReservationId>,
        /// What released it.
        cause: ReleaseCause,
    },
}

impl LoanTask {
    /// Routing key for this task.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::NotifyWaitlist { .. } => TaskKind::NotifyWaitlist,
        }
    }
}
