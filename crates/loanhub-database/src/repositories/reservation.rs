//! Reservation repository implementation.

use sqlx::{PgConnection, PgPool};

use loanhub_core::error::{AppError, ErrorKind};
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{ReservationId, UserId};
use loanhub_entity::reservation::{NewReservation, Reservation, ReservationUpdate};

/// Repository for reservation rows.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: PgPool,
}

impl ReservationRepository {
    /// Create a new reservation repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a reservation by ID.
    pub async fn find_by_id(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find reservation", e)
            })
    }

    /// List a user's reservations, newest first.
    pub async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE user_id = $1 ORDER BY reserved_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list reservations", e))
    }

    /// Insert a pending reservation inside a transaction.
    pub async fn insert(conn: &mut PgConnection, data: &NewReservation) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            "INSERT INTO reservations (id, user_id, device_id, unit_id, reserved_at, due_date, status, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', $5) RETURNING *",
        )
        .bind(data.id)
        .bind(data.user_id)
        .bind(data.device_id)
        .bind(data.unit_id)
        .bind(data.reserved_at)
        .bind(data.due_date)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create reservation", e))
    }

    /// Lock a reservation row for update inside a transaction.
    ///
    /// Blocks while another transaction holds the row, bounded by the
    /// session `lock_timeout`.
    pub async fn lock(conn: &mut PgConnection, id: ReservationId) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to lock reservation", e)
            })
    }

    /// Apply a sparse update inside a transaction. Unset fields keep their value.
    pub async fn update(
        conn: &mut PgConnection,
        id: ReservationId,
        data: &ReservationUpdate,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            "UPDATE reservations SET \
                status = COALESCE($2, status), \
                due_date = COALESCE($3, due_date), \
                updated_at = COALESCE($4, NOW()) \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(data.status)
        .bind(data.due_date)
        .bind(data.updated_at)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update reservation", e))?
        .ok_or_else(|| AppError::not_found(format!("Reservation {id} not found")))
    }
}
