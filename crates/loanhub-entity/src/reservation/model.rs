//! Reservation entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, ReservationId, UnitId, UserId};

use super::status::ReservationStatus;

/// Binds one user to one inventory unit for `[reserved_at, due_date]`.
///
/// Reservations are never deleted, only transitioned.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    /// Unique reservation identifier.
    pub id: ReservationId,
    /// Borrower.
    pub user_id: UserId,
    /// Reserved device type.
    pub device_id: DeviceId,
    /// Allocated physical unit.
    pub unit_id: UnitId,
    /// When the unit was allocated.
    pub reserved_at: DateTime<Utc>,
    /// When the unit is due back.
    pub due_date: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: ReservationStatus,
    /// When the reservation last changed.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether `user_id` owns this reservation.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Whether the loan is past due at `now` while the unit is still held.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.holds_unit() && now > self.due_date
    }
}

/// Data required to insert a new reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    /// Identifier assigned by the caller.
    pub id: ReservationId,
    /// Borrower.
    pub user_id: UserId,
    /// Reserved device type.
    pub device_id: DeviceId,
    /// Unit claimed by the allocator in the same transaction.
    pub unit_id: UnitId,
    /// Allocation time.
    pub reserved_at: DateTime<Utc>,
    /// `reserved_at + loan_days`.
    pub due_date: DateTime<Utc>,
}

impl NewReservation {
    /// Build a pending reservation for a freshly claimed unit.
    ///
    /// Fails with a validation error when the due date is not
    /// representable.
    pub fn new(
        user_id: UserId,
        device_id: DeviceId,
        unit_id: UnitId,
        reserved_at: DateTime<Utc>,
        loan_days: u32,
    ) -> AppResult<Self> {
        let due_date = Duration::try_days(i64::from(loan_days))
            .and_then(|loan| reserved_at.checked_add_signed(loan))
            .ok_or_else(|| {
                AppError::validation(format!(
                    "Loan duration of {loan_days} days for device {device_id} is out of range"
                ))
            })?;

        Ok(Self {
            id: ReservationId::new(),
            user_id,
            device_id,
            unit_id,
            reserved_at,
            due_date,
        })
    }

    /// The row as it looks right after insertion.
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            user_id: self.user_id,
            device_id: self.device_id,
            unit_id: self.unit_id,
            reserved_at: self.reserved_at,
            due_date: self.due_date,
            status: ReservationStatus::Pending,
            updated_at: self.reserved_at,
        }
    }
}

/// Sparse update applied to a reservation during a transition.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationUpdate {
    /// New status.
    pub status: Option<ReservationStatus>,
    /// New due date (e.g. adjusted on pickup).
    pub due_date: Option<DateTime<Utc>>,
    /// Modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReservationUpdate {
    /// A plain status change stamped at `at`.
    pub fn status(status: ReservationStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            due_date: None,
            updated_at: Some(at),
        }
    }

    /// Apply the set fields to `reservation`.
    pub fn apply_to(&self, reservation: &mut Reservation) {
        if let Some(status) = self.status {
            reservation.status = status;
        }
        if let Some(due_date) = self.due_date {
            reservation.due_date = due_date;
        }
        if let Some(updated_at) = self.updated_at {
            reservation.updated_at = updated_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_date_from_loan_days() {
        let at = Utc::now();
        let new = NewReservation::new(UserId::new(), DeviceId::new(), UnitId::new(), at, 7).unwrap();
        assert_eq!(new.due_date - new.reserved_at, Duration::days(7));
        let row = new.into_reservation();
        assert_eq!(row.status, ReservationStatus::Pending);
    }

    #[test]
    fn test_sparse_update_leaves_unset_fields() {
        let at = Utc::now();
        let mut row =
            NewReservation::new(UserId::new(), DeviceId::new(), UnitId::new(), at, 14)
                .unwrap()
                .into_reservation();
        let due = row.due_date;
        let later = at + Duration::hours(1);

        ReservationUpdate::status(ReservationStatus::Collected, later).apply_to(&mut row);

        assert_eq!(row.status, ReservationStatus::Collected);
        assert_eq!(row.due_date, due);
        assert_eq!(row.updated_at, later);
    }

    #[test]
    fn test_overdue_only_while_held() {
        let at = Utc::now() - Duration::days(30);
        let mut row =
            NewReservation::new(UserId::new(), DeviceId::new(), UnitId::new(), at, 14)
                .unwrap()
                .into_reservation();
        assert!(row.is_overdue(Utc::now()));
        row.status = ReservationStatus::Returned;
        assert!(!row.is_overdue(Utc::now()));
    }

    #[test]
    fn test_unrepresentable_due_date_is_rejected() {
        let err = NewReservation::new(UserId::new(), DeviceId::new(), UnitId::new(), Utc::now(), 200_000_000)
            .unwrap_err();
        assert_eq!(err.kind, loanhub_core::ErrorKind::Validation);
    }
}
