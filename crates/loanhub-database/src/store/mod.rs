//! Storage seams used by the reservation and waitlist services.
//!
//! A [`LoanStore`] hands out [`LoanTransaction`]s for the allocate/release
//! flows and serves the read and waitlist operations that need no
//! multi-statement atomicity.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, ReservationId, UnitId, UserId, WaitlistEntryId};
use loanhub_entity::device::Device;
use loanhub_entity::inventory::InventoryUnit;
use loanhub_entity::reservation::{NewReservation, Reservation, ReservationUpdate};
use loanhub_entity::user::User;
use loanhub_entity::waitlist::{NewWaitlistEntry, WaitlistEntry};

pub use memory::MemoryLoanStore;
pub use postgres::PgLoanStore;

/// Transaction-scoped claim and release of inventory units.
///
/// `acquire` must never wait on a row held by another transaction: it
/// skips it and tries the next free unit, or returns `None` when every
/// candidate is taken or locked.
#[async_trait]
pub trait UnitAllocator: Send {
    /// Claim one available unit of the device, flipping it unavailable.
    async fn acquire(&mut self, device_id: DeviceId) -> AppResult<Option<UnitId>>;

    /// Flip a unit back to available.
    async fn release(&mut self, unit_id: UnitId) -> AppResult<()>;
}

/// One open storage transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls
/// it back.
#[async_trait]
pub trait LoanTransaction: UnitAllocator {
    /// The device's configured loan days. `None` if the device does not
    /// exist, `Some(None)` if it has no configured duration.
    async fn device_loan_days(&mut self, device_id: DeviceId) -> AppResult<Option<Option<i32>>>;

    /// Insert a pending reservation.
    async fn insert_reservation(&mut self, data: &NewReservation) -> AppResult<Reservation>;

    /// Read a reservation under an exclusive row lock.
    async fn lock_reservation(&mut self, id: ReservationId) -> AppResult<Option<Reservation>>;

    /// Apply a sparse update to a reservation locked by this transaction.
    async fn transition_reservation(
        &mut self,
        id: ReservationId,
        update: &ReservationUpdate,
    ) -> AppResult<Reservation>;

    /// Make all writes visible and release row locks.
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Discard all writes and release row locks.
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Storage backend for reservations, inventory and the waitlist.
#[async_trait]
pub trait LoanStore: Send + Sync + 'static {
    /// Open a transaction.
    async fn begin(&self) -> AppResult<Box<dyn LoanTransaction>>;

    /// Find a device by ID.
    async fn find_device(&self, id: DeviceId) -> AppResult<Option<Device>>;

    /// Find a user by ID.
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>>;

    /// Find a reservation by ID (committed state).
    async fn find_reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>>;

    /// Find an inventory unit by ID (committed state).
    async fn find_unit(&self, id: UnitId) -> AppResult<Option<InventoryUnit>>;

    /// A user's reservations, newest first.
    async fn list_user_reservations(&self, user_id: UserId) -> AppResult<Vec<Reservation>>;

    /// Number of committed available units for a device.
    async fn count_available_units(&self, device_id: DeviceId) -> AppResult<u64>;

    /// Insert a pending waitlist entry; `AlreadyJoined` if one exists for the pair.
    async fn insert_waitlist_entry(&self, data: &NewWaitlistEntry) -> AppResult<WaitlistEntry>;

    /// The pending entry for a user and device.
    async fn find_pending_waitlist_entry(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<Option<WaitlistEntry>>;

    /// Delete the pending entry for a user and device; `false` if none existed.
    async fn delete_pending_waitlist_entry(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<bool>;

    /// 1-based queue position of a pending entry.
    async fn waitlist_position(&self, entry: &WaitlistEntry) -> AppResult<u64>;

    /// Earliest pending entry for a device.
    async fn next_waitlist_entry(&self, device_id: DeviceId) -> AppResult<Option<WaitlistEntry>>;

    /// All pending entries for a device in queue order.
    async fn list_pending_waitlist(&self, device_id: DeviceId) -> AppResult<Vec<WaitlistEntry>>;

    /// Mark a pending entry notified; `None` if it was not pending.
    async fn mark_waitlist_notified(
        &self,
        id: WaitlistEntryId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<WaitlistEntry>>;
}
