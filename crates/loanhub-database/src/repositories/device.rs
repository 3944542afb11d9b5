//! Device repository implementation.

use sqlx::{PgConnection, PgPool};

use loanhub_core::error::{AppError, ErrorKind};
use loanhub_core::result::AppResult;
use loanhub_core::types::id::DeviceId;
use loanhub_entity::device::Device;

/// Repository for device catalog reads.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Create a new device repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a device by ID.
    pub async fn find_by_id(&self, id: DeviceId) -> AppResult<Option<Device>> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find device", e))
    }

    /// Read the configured loan duration inside a transaction.
    ///
    /// The outer `Option` is `None` when the device does not exist.
    pub async fn loan_days(conn: &mut PgConnection, id: DeviceId) -> AppResult<Option<Option<i32>>> {
        sqlx::query_scalar::<_, Option<i32>>("SELECT default_loan_days FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to read device loan days", e)
            })
    }
}
