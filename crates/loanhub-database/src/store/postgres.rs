//! PostgreSQL-backed loan store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use loanhub_core::error::{AppError, ErrorKind};
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, ReservationId, UnitId, UserId, WaitlistEntryId};
use loanhub_entity::device::Device;
use loanhub_entity::inventory::InventoryUnit;
use loanhub_entity::reservation::{NewReservation, Reservation, ReservationUpdate};
use loanhub_entity::user::User;
use loanhub_entity::waitlist::{NewWaitlistEntry, WaitlistEntry};

use super::{LoanStore, LoanTransaction, UnitAllocator};
use crate::repositories::{
    DeviceRepository, InventoryRepository, ReservationRepository, UserRepository,
    WaitlistRepository,
};

/// [`LoanStore`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgLoanStore {
    pool: PgPool,
    devices: DeviceRepository,
    users: UserRepository,
    inventory: InventoryRepository,
    reservations: ReservationRepository,
    waitlist: WaitlistRepository,
}

impl PgLoanStore {
    /// Create a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            devices: DeviceRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            inventory: InventoryRepository::new(pool.clone()),
            reservations: ReservationRepository::new(pool.clone()),
            waitlist: WaitlistRepository::new(pool.clone()),
            pool,
        }
    }
}

/// An open PostgreSQL transaction.
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
#[derive(Debug)]
pub struct PgLoanTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitAllocator for PgLoanTransaction {
    async fn acquire(&mut self, device_id: DeviceId) -> AppResult<Option<UnitId>> {
        let unit = InventoryRepository::claim_available(&mut self.tx, device_id).await?;
        debug!(device_id = %device_id, unit_id = ?unit, "Unit claim attempted");
        Ok(unit)
    }

    async fn release(&mut self, unit_id: UnitId) -> AppResult<()> {
        InventoryRepository::mark_available(&mut self.tx, unit_id).await
    }
}

#[async_trait]
impl LoanTransaction for PgLoanTransaction {
    async fn device_loan_days(&mut self, device_id: DeviceId) -> AppResult<Option<Option<i32>>> {
        DeviceRepository::loan_days(&mut self.tx, device_id).await
    }

    async fn insert_reservation(&mut self, data: &NewReservation) -> AppResult<Reservation> {
        ReservationRepository::insert(&mut self.tx, data).await
    }

    async fn lock_reservation(&mut self, id: ReservationId) -> AppResult<Option<Reservation>> {
        ReservationRepository::lock(&mut self.tx, id).await
    }

    async fn transition_reservation(
        &mut self,
        id: ReservationId,
        update: &ReservationUpdate,
    ) -> AppResult<Reservation> {
        ReservationRepository::update(&mut self.tx, id, update).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e)
        })
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.rollback().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to roll back transaction", e)
        })
    }
}

#[async_trait]
impl LoanStore for PgLoanStore {
    async fn begin(&self) -> AppResult<Box<dyn LoanTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        Ok(Box::new(PgLoanTransaction { tx }))
    }

    async fn find_device(&self, id: DeviceId) -> AppResult<Option<Device>> {
        self.devices.find_by_id(id).await
    }

    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        self.users.find_by_id(id).await
    }

    async fn find_reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        self.reservations.find_by_id(id).await
    }

    async fn find_unit(&self, id: UnitId) -> AppResult<Option<InventoryUnit>> {
        self.inventory.find_by_id(id).await
    }

    async fn list_user_reservations(&self, user_id: UserId) -> AppResult<Vec<Reservation>> {
        self.reservations.find_by_user(user_id).await
    }

    async fn count_available_units(&self, device_id: DeviceId) -> AppResult<u64> {
        self.inventory.count_available(device_id).await
    }

    async fn insert_waitlist_entry(&self, data: &NewWaitlistEntry) -> AppResult<WaitlistEntry> {
        self.waitlist.insert(data).await
    }

    async fn find_pending_waitlist_entry(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<Option<WaitlistEntry>> {
        self.waitlist.find_pending(user_id, device_id).await
    }

    async fn delete_pending_waitlist_entry(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<bool> {
        self.waitlist.delete_pending(user_id, device_id).await
    }

    async fn waitlist_position(&self, entry: &WaitlistEntry) -> AppResult<u64> {
        Ok(self.waitlist.count_ahead(entry).await? + 1)
    }

    async fn next_waitlist_entry(&self, device_id: DeviceId) -> AppResult<Option<WaitlistEntry>> {
        self.waitlist.next_pending(device_id).await
    }

    async fn list_pending_waitlist(&self, device_id: DeviceId) -> AppResult<Vec<WaitlistEntry>> {
        self.waitlist.list_pending(device_id).await
    }

    async fn mark_waitlist_notified(
        &self,
        id: WaitlistEntryId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<WaitlistEntry>> {
        self.waitlist.mark_notified(id, at).await
    }
}
