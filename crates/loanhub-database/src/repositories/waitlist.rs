//! Waitlist repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use loanhub_core::error::{AppError, ErrorKind};
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, UserId, WaitlistEntryId};
use loanhub_entity::waitlist::{NewWaitlistEntry, WaitlistEntry};

/// Repository for waitlist entries.
///
/// Queue order is `(added_at, id)` ascending over pending entries.
#[derive(Debug, Clone)]
pub struct WaitlistRepository {
    pool: PgPool,
}

impl WaitlistRepository {
    /// Create a new waitlist repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending entry.
    ///
    /// A unique violation on the pending `(user_id, device_id)` index is
    /// reported as `AlreadyJoined`.
    pub async fn insert(&self, data: &NewWaitlistEntry) -> AppResult<WaitlistEntry> {
        sqlx::query_as::<_, WaitlistEntry>(
            "INSERT INTO waitlist_entries (id, user_id, device_id, added_at, is_notified) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING *",
        )
        .bind(data.id)
        .bind(data.user_id)
        .bind(data.device_id)
        .bind(data.added_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::already_joined(
                format!(
                    "User {} is already on the waitlist for device {}",
                    data.user_id, data.device_id
                ),
            ),
            _ => AppError::with_source(ErrorKind::Database, "Failed to join waitlist", e),
        })
    }

    /// Find the pending entry for a user and device.
    pub async fn find_pending(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<Option<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist_entries \
             WHERE user_id = $1 AND device_id = $2 AND is_notified = FALSE",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find waitlist entry", e)
        })
    }

    /// Delete the pending entry for a user and device. Notified entries are kept.
    pub async fn delete_pending(&self, user_id: UserId, device_id: DeviceId) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM waitlist_entries \
             WHERE user_id = $1 AND device_id = $2 AND is_notified = FALSE",
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to remove waitlist entry", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    /// Count pending entries of the entry's device that sort strictly before it.
    pub async fn count_ahead(&self, entry: &WaitlistEntry) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM waitlist_entries \
             WHERE device_id = $1 AND is_notified = FALSE \
             AND (added_at, id) < ($2, $3)",
        )
        .bind(entry.device_id)
        .bind(entry.added_at)
        .bind(entry.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to compute waitlist position", e)
        })?;
        Ok(count.max(0) as u64)
    }

    /// Earliest pending entry for a device.
    pub async fn next_pending(&self, device_id: DeviceId) -> AppResult<Option<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist_entries \
             WHERE device_id = $1 AND is_notified = FALSE \
             ORDER BY added_at ASC, id ASC \
             LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find next waitlist entry", e)
        })
    }

    /// All pending entries for a device in queue order.
    pub async fn list_pending(&self, device_id: DeviceId) -> AppResult<Vec<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist_entries \
             WHERE device_id = $1 AND is_notified = FALSE \
             ORDER BY added_at ASC, id ASC",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list waitlist", e))
    }

    /// Mark a pending entry notified. Returns `None` if it was not pending.
    pub async fn mark_notified(
        &self,
        id: WaitlistEntryId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<WaitlistEntry>> {
        sqlx::query_as::<_, WaitlistEntry>(
            "UPDATE waitlist_entries SET is_notified = TRUE, notified_at = $2 \
             WHERE id = $1 AND is_notified = FALSE RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark waitlist entry notified", e)
        })
    }
}
