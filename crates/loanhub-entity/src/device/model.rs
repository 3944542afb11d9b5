//! Device entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use loanhub_core::types::id::DeviceId;

/// A catalog device type (brand + model). Physical items are [`InventoryUnit`]s.
///
/// [`InventoryUnit`]: crate::inventory::InventoryUnit
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    /// Unique device identifier.
    pub id: DeviceId,
    /// Manufacturer.
    pub brand: String,
    /// Model name.
    pub model: String,
    /// Catalog category (e.g. `"laptop"`, `"camera"`).
    pub category: String,
    /// Loan duration in days; `None` falls back to the configured default.
    pub default_loan_days: Option<i32>,
    /// When the device was created.
    pub created_at: DateTime<Utc>,
    /// When the device was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Human-readable name used in notifications.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }
}

/// Resolve a device's configured loan duration against the fallback.
///
/// Non-positive configured values are treated as unset.
pub fn effective_loan_days(configured: Option<i32>, fallback: u32) -> u32 {
    match configured {
        Some(days) if days > 0 => days as u32,
        _ => fallback,
    }
}
