//! Reservation policy configuration.

use serde::{Deserialize, Serialize};

/// Reservation policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    /// Loan duration in days used when a device has none configured.
    #[serde(default = "default_loan_days")]
    pub default_loan_days: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_loan_days: default_loan_days(),
        }
    }
}

fn default_loan_days() -> u32 {
    14
}
