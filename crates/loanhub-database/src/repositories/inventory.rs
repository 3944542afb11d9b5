//! Inventory unit repository implementation.

use sqlx::{PgConnection, PgPool};

use loanhub_core::error::{AppError, ErrorKind};
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, UnitId};
use loanhub_entity::inventory::InventoryUnit;

/// Repository for inventory units and the skip-locked claim.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    /// Create a new inventory repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a unit by ID.
    pub async fn find_by_id(&self, id: UnitId) -> AppResult<Option<InventoryUnit>> {
        sqlx::query_as::<_, InventoryUnit>("SELECT * FROM inventory_units WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find unit", e))
    }

    /// Count committed available units for a device.
    pub async fn count_available(&self, device_id: DeviceId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_units WHERE device_id = $1 AND is_available = TRUE",
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count available units", e)
        })?;
        Ok(count.max(0) as u64)
    }

    /// Claim one available unit of a device (SKIP LOCKED for concurrency).
    ///
    /// Rows locked by another in-flight transaction are skipped, never
    /// awaited. The flag flip happens under the same row lock, so the unit
    /// stays invisible to other claimers until this transaction ends.
    pub async fn claim_available(
        conn: &mut PgConnection,
        device_id: DeviceId,
    ) -> AppResult<Option<UnitId>> {
        sqlx::query_scalar::<_, UnitId>(
            "UPDATE inventory_units SET is_available = FALSE, updated_at = NOW() \
             WHERE id = ( \
                SELECT id FROM inventory_units \
                WHERE device_id = $1 AND is_available = TRUE \
                ORDER BY created_at ASC, id ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) AND is_available = TRUE \
             RETURNING id",
        )
        .bind(device_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim unit", e))
    }

    /// Mark a unit available again inside a transaction.
    pub async fn mark_available(conn: &mut PgConnection, unit_id: UnitId) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE inventory_units SET is_available = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(unit_id)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to release unit", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Inventory unit {unit_id} not found")));
        }
        Ok(())
    }
}
