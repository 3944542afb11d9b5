//! Waitlist entry entity model.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use loanhub_core::types::id::{DeviceId, UserId, WaitlistEntryId};

/// A user's expressed interest in a device.
///
/// Entries for a device are served in `(added_at, id)` ascending order.
/// Once notified, an entry is kept as a record of who was offered a unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaitlistEntry {
    /// Unique entry identifier (time-ordered).
    pub id: WaitlistEntryId,
    /// Waiting user.
    pub user_id: UserId,
    /// Wanted device.
    pub device_id: DeviceId,
    /// Join time.
    pub added_at: DateTime<Utc>,
    /// Whether the user has been told a unit is available.
    pub is_notified: bool,
    /// When the notification was confirmed.
    pub notified_at: Option<DateTime<Utc>>,
}

impl WaitlistEntry {
    /// The key defining the FIFO total order.
    pub fn queue_key(&self) -> (DateTime<Utc>, WaitlistEntryId) {
        (self.added_at, self.id)
    }

    /// Compare two entries by queue order.
    pub fn queue_cmp(&self, other: &Self) -> Ordering {
        self.queue_key().cmp(&other.queue_key())
    }

    /// Whether the entry is still waiting.
    pub fn is_pending(&self) -> bool {
        !self.is_notified
    }
}

/// Data required to insert a waitlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWaitlistEntry {
    /// Identifier assigned by the caller.
    pub id: WaitlistEntryId,
    /// Waiting user.
    pub user_id: UserId,
    /// Wanted device.
    pub device_id: DeviceId,
    /// Join time.
    pub added_at: DateTime<Utc>,
}

impl NewWaitlistEntry {
    /// Create an entry joining at `added_at`.
    pub fn new(user_id: UserId, device_id: DeviceId, added_at: DateTime<Utc>) -> Self {
        Self {
            id: WaitlistEntryId::now_v7(),
            user_id,
            device_id,
            added_at,
        }
    }

    /// The row as it looks right after insertion.
    pub fn into_entry(self) -> WaitlistEntry {
        WaitlistEntry {
            id: self.id,
            user_id: self.user_id,
            device_id: self.device_id,
            added_at: self.added_at,
            is_notified: false,
            notified_at: None,
        }
    }
}
