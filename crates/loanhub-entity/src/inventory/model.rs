//! Inventory unit entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use loanhub_core::types::id::{DeviceId, UnitId};

/// One physical instance of a [`Device`](crate::device::Device).
///
/// `is_available` is the sole allocation signal: it is `false` exactly
/// while a pending or collected reservation references the unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryUnit {
    /// Unique unit identifier.
    pub id: UnitId,
    /// Owning device.
    pub device_id: DeviceId,
    /// Manufacturer serial number, if recorded.
    pub serial_number: Option<String>,
    /// Whether the unit can be allocated.
    pub is_available: bool,
    /// When the unit was provisioned.
    pub created_at: DateTime<Utc>,
    /// When the unit was last updated.
    pub updated_at: DateTime<Utc>,
}
