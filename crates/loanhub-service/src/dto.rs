//! API-facing views of reservations and waitlist entries.
//!
//! Each view lists every field explicitly; adding a column to a row type
//! does not leak it into responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loanhub_core::types::id::{DeviceId, ReservationId, UnitId, UserId, WaitlistEntryId};
use loanhub_entity::reservation::{Reservation, ReservationStatus};
use loanhub_entity::waitlist::WaitlistEntry;

use crate::waitlist::WaitlistJoin;

/// A reservation as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub id: ReservationId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub unit_id: UnitId,
    pub reserved_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub is_overdue: bool,
}

impl ReservationView {
    /// View of `r` with overdue evaluated at `now`.
    pub fn as_of(r: Reservation, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: r.is_overdue(now),
            id: r.id,
            user_id: r.user_id,
            device_id: r.device_id,
            unit_id: r.unit_id,
            reserved_at: r.reserved_at,
            due_date: r.due_date,
            status: r.status,
        }
    }
}

/// A waitlist entry as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntryView {
    pub id: WaitlistEntryId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub added_at: DateTime<Utc>,
    pub is_notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

impl From<WaitlistEntry> for WaitlistEntryView {
    fn from(e: WaitlistEntry) -> Self {
        Self {
            id: e.id,
            user_id: e.user_id,
            device_id: e.device_id,
            added_at: e.added_at,
            is_notified: e.is_notified,
            notified_at: e.notified_at,
        }
    }
}

/// Response to a successful join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistJoinView {
    pub entry: WaitlistEntryView,
    pub position: u64,
}

impl From<WaitlistJoin> for WaitlistJoinView {
    fn from(join: WaitlistJoin) -> Self {
        Self {
            entry: join.entry.into(),
            position: join.position,
        }
    }
}
