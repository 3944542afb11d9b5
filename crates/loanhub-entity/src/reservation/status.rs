//! Reservation status enumeration and allowed transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a reservation.
///
/// Allowed edges: `pending -> collected`, `pending -> cancelled`,
/// `collected -> returned`, `collected -> completed`. Every other edge,
/// including self-loops, is rejected, and terminal states have no exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Unit is held, waiting for pickup.
    Pending,
    /// Borrower picked the unit up.
    Collected,
    /// Cancelled before pickup.
    Cancelled,
    /// Loan closed administratively after pickup.
    Completed,
    /// Borrower brought the unit back.
    Returned,
}

impl ReservationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Collected,
        Self::Cancelled,
        Self::Completed,
        Self::Returned,
    ];

    /// Whether the reservation has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Returned)
    }

    /// Whether the reservation still holds its unit.
    pub fn holds_unit(&self) -> bool {
        matches!(self, Self::Pending | Self::Collected)
    }

    /// Whether `self -> next` is an allowed edge.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Collected)
                | (Self::Pending, Self::Cancelled)
                | (Self::Collected, Self::Returned)
                | (Self::Collected, Self::Completed)
        )
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Collected => "collected",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Returned => "returned",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = loanhub_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "collected" => Ok(Self::Collected),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "returned" => Ok(Self::Returned),
            _ => Err(loanhub_core::AppError::validation(format!(
                "Invalid reservation status: '{s}'. Expected one of: \
                 pending, collected, cancelled, completed, returned"
            ))),
        }
    }
}
