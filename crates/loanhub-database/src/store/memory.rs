//! In-memory loan store for tests and single-process development.
//!
//! Rows carry a `locked_by` marker naming the transaction that holds their
//! row lock. Writes are staged per transaction and applied on commit, so
//! other callers only ever see committed state. Claiming a unit skips rows
//! locked by someone else; locking a reservation or releasing a unit waits
//! for the holder to finish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::debug;

use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_core::types::id::{DeviceId, ReservationId, UnitId, UserId, WaitlistEntryId};
use loanhub_entity::device::Device;
use loanhub_entity::inventory::InventoryUnit;
use loanhub_entity::reservation::{NewReservation, Reservation, ReservationUpdate};
use loanhub_entity::user::User;
use loanhub_entity::waitlist::{NewWaitlistEntry, WaitlistEntry};

use super::{LoanStore, LoanTransaction, UnitAllocator};

type TxId = u64;

#[derive(Debug)]
struct Row<T> {
    value: T,
    locked_by: Option<TxId>,
}

impl<T> Row<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            locked_by: None,
        }
    }

    fn lockable_by(&self, tx: TxId) -> bool {
        self.locked_by.is_none_or(|holder| holder == tx)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    devices: HashMap<DeviceId, Device>,
    units: HashMap<UnitId, Row<InventoryUnit>>,
    reservations: HashMap<ReservationId, Row<Reservation>>,
    waitlist: HashMap<WaitlistEntryId, WaitlistEntry>,
    next_tx: TxId,
}

impl MemoryState {
    fn unlock_all(&mut self, tx: TxId) {
        for row in self.units.values_mut() {
            if row.locked_by == Some(tx) {
                row.locked_by = None;
            }
        }
        for row in self.reservations.values_mut() {
            if row.locked_by == Some(tx) {
                row.locked_by = None;
            }
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    /// Signalled whenever a transaction ends and its row locks are freed.
    unlocked: Notify,
    fail_next_insert: AtomicBool,
}

impl Shared {
    fn lock(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::internal("In-memory store state is poisoned"))
    }
}

/// [`LoanStore`] kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoanStore {
    shared: Arc<Shared>,
}

impl MemoryLoanStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub fn insert_user(&self, user: User) -> AppResult<()> {
        self.shared.lock()?.users.insert(user.id, user);
        Ok(())
    }

    /// Add or replace a device.
    pub fn insert_device(&self, device: Device) -> AppResult<()> {
        self.shared.lock()?.devices.insert(device.id, device);
        Ok(())
    }

    /// Add an inventory unit. The device must exist.
    pub fn insert_unit(&self, unit: InventoryUnit) -> AppResult<()> {
        let mut state = self.shared.lock()?;
        if !state.devices.contains_key(&unit.device_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: device {} does not exist",
                unit.device_id
            )));
        }
        state.units.insert(unit.id, Row::new(unit));
        Ok(())
    }

    /// Make the next reservation insert fail with a database error.
    pub fn fail_next_insert(&self) {
        self.shared.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct StagedWrites {
    unit_availability: HashMap<UnitId, bool>,
    reservations: HashMap<ReservationId, Reservation>,
    inserted: Vec<ReservationId>,
}

/// An open in-memory transaction.
#[derive(Debug)]
pub struct MemoryLoanTransaction {
    id: TxId,
    shared: Arc<Shared>,
    staged: StagedWrites,
    finished: bool,
}

impl MemoryLoanTransaction {
    fn unit_available(&self, row: &Row<InventoryUnit>) -> bool {
        self.staged
            .unit_availability
            .get(&row.value.id)
            .copied()
            .unwrap_or(row.value.is_available)
    }

    /// Wait until this transaction holds the row lock on `unit_id`.
    async fn lock_unit(&mut self, unit_id: UnitId) -> AppResult<()> {
        loop {
            let unlocked = self.shared.unlocked.notified();
            {
                let mut state = self.shared.lock()?;
                let row = state.units.get_mut(&unit_id).ok_or_else(|| {
                    AppError::not_found(format!("Inventory unit {unit_id} not found"))
                })?;
                if row.lockable_by(self.id) {
                    row.locked_by = Some(self.id);
                    return Ok(());
                }
            }
            unlocked.await;
        }
    }

    fn finish(&mut self) -> AppResult<()> {
        self.finished = true;
        let result = self.shared.lock().map(|mut state| state.unlock_all(self.id));
        self.shared.unlocked.notify_waiters();
        result
    }
}

impl Drop for MemoryLoanTransaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!(tx = self.id, "Dropping uncommitted in-memory transaction");
            let _ = self.finish();
        }
    }
}

#[async_trait]
impl UnitAllocator for MemoryLoanTransaction {
    async fn acquire(&mut self, device_id: DeviceId) -> AppResult<Option<UnitId>> {
        let mut state = self.shared.lock()?;

        let mut candidates: Vec<&Row<InventoryUnit>> = state
            .units
            .values()
            .filter(|row| row.value.device_id == device_id)
            .filter(|row| row.lockable_by(self.id))
            .filter(|row| self.unit_available(row))
            .collect();
        candidates.sort_by_key(|row| (row.value.created_at, row.value.id));

        let Some(unit_id) = candidates.first().map(|row| row.value.id) else {
            return Ok(None);
        };

        if let Some(row) = state.units.get_mut(&unit_id) {
            row.locked_by = Some(self.id);
        }
        drop(state);
        self.staged.unit_availability.insert(unit_id, false);

        debug!(tx = self.id, device_id = %device_id, unit_id = %unit_id, "Unit claimed");
        Ok(Some(unit_id))
    }

    async fn release(&mut self, unit_id: UnitId) -> AppResult<()> {
        self.lock_unit(unit_id).await?;
        self.staged.unit_availability.insert(unit_id, true);
        Ok(())
    }
}

#[async_trait]
impl LoanTransaction for MemoryLoanTransaction {
    async fn device_loan_days(&mut self, device_id: DeviceId) -> AppResult<Option<Option<i32>>> {
        let state = self.shared.lock()?;
        Ok(state.devices.get(&device_id).map(|d| d.default_loan_days))
    }

    async fn insert_reservation(&mut self, data: &NewReservation) -> AppResult<Reservation> {
        if self.shared.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(AppError::database("Failed to create reservation"));
        }

        let state = self.shared.lock()?;
        if !state.users.contains_key(&data.user_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: user {} does not exist",
                data.user_id
            )));
        }
        if !state.units.contains_key(&data.unit_id) {
            return Err(AppError::database(format!(
                "Foreign key violation: unit {} does not exist",
                data.unit_id
            )));
        }
        let committed_live = state
            .reservations
            .values()
            .filter(|row| !self.staged.reservations.contains_key(&row.value.id))
            .any(|row| row.value.unit_id == data.unit_id && row.value.status.holds_unit());
        let staged_live = self
            .staged
            .reservations
            .values()
            .any(|r| r.unit_id == data.unit_id && r.status.holds_unit());
        if committed_live || staged_live {
            return Err(AppError::database(format!(
                "Unique violation: unit {} already has a live reservation",
                data.unit_id
            )));
        }
        drop(state);

        let reservation = data.clone().into_reservation();
        self.staged
            .reservations
            .insert(reservation.id, reservation.clone());
        self.staged.inserted.push(reservation.id);
        Ok(reservation)
    }

    async fn lock_reservation(&mut self, id: ReservationId) -> AppResult<Option<Reservation>> {
        if let Some(staged) = self.staged.reservations.get(&id) {
            return Ok(Some(staged.clone()));
        }

        loop {
            let unlocked = self.shared.unlocked.notified();
            {
                let mut state = self.shared.lock()?;
                let Some(row) = state.reservations.get_mut(&id) else {
                    return Ok(None);
                };
                if row.lockable_by(self.id) {
                    row.locked_by = Some(self.id);
                    let current = row.value.clone();
                    drop(state);
                    self.staged.reservations.insert(id, current.clone());
                    return Ok(Some(current));
                }
            }
            unlocked.await;
        }
    }

    async fn transition_reservation(
        &mut self,
        id: ReservationId,
        update: &ReservationUpdate,
    ) -> AppResult<Reservation> {
        if !self.staged.reservations.contains_key(&id) && self.lock_reservation(id).await?.is_none()
        {
            return Err(AppError::not_found(format!("Reservation {id} not found")));
        }
        let reservation = self
            .staged
            .reservations
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Reservation {id} not found")))?;
        update.apply_to(reservation);
        Ok(reservation.clone())
    }

    async fn commit(mut self: Box<Self>) -> AppResult<()> {
        {
            let mut state = self.shared.lock()?;
            for (unit_id, available) in self.staged.unit_availability.drain() {
                if let Some(row) = state.units.get_mut(&unit_id) {
                    row.value.is_available = available;
                    row.value.updated_at = Utc::now();
                }
            }
            for (id, reservation) in self.staged.reservations.drain() {
                match state.reservations.get_mut(&id) {
                    Some(row) => row.value = reservation,
                    None => {
                        state.reservations.insert(id, Row::new(reservation));
                    }
                }
            }
        }
        debug!(tx = self.id, "In-memory transaction committed");
        self.finish()
    }

    async fn rollback(mut self: Box<Self>) -> AppResult<()> {
        self.staged = StagedWrites::default();
        debug!(tx = self.id, "In-memory transaction rolled back");
        self.finish()
    }
}

#[async_trait]
impl LoanStore for MemoryLoanStore {
    async fn begin(&self) -> AppResult<Box<dyn LoanTransaction>> {
        let id = {
            let mut state = self.shared.lock()?;
            state.next_tx += 1;
            state.next_tx
        };
        Ok(Box::new(MemoryLoanTransaction {
            id,
            shared: Arc::clone(&self.shared),
            staged: StagedWrites::default(),
            finished: false,
        }))
    }

    async fn find_device(&self, id: DeviceId) -> AppResult<Option<Device>> {
        Ok(self.shared.lock()?.devices.get(&id).cloned())
    }

    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.shared.lock()?.users.get(&id).cloned())
    }

    async fn find_reservation(&self, id: ReservationId) -> AppResult<Option<Reservation>> {
        Ok(self
            .shared
            .lock()?
            .reservations
            .get(&id)
            .map(|row| row.value.clone()))
    }

    async fn find_unit(&self, id: UnitId) -> AppResult<Option<InventoryUnit>> {
        Ok(self.shared.lock()?.units.get(&id).map(|row| row.value.clone()))
    }

    async fn list_user_reservations(&self, user_id: UserId) -> AppResult<Vec<Reservation>> {
        let state = self.shared.lock()?;
        let mut reservations: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|row| row.value.user_id == user_id)
            .map(|row| row.value.clone())
            .collect();
        reservations.sort_by(|a, b| (b.reserved_at, b.id).cmp(&(a.reserved_at, a.id)));
        Ok(reservations)
    }

    async fn count_available_units(&self, device_id: DeviceId) -> AppResult<u64> {
        let state = self.shared.lock()?;
        Ok(state
            .units
            .values()
            .filter(|row| row.value.device_id == device_id && row.value.is_available)
            .count() as u64)
    }

    async fn insert_waitlist_entry(&self, data: &NewWaitlistEntry) -> AppResult<WaitlistEntry> {
        let mut state = self.shared.lock()?;
        if !state.users.contains_key(&data.user_id) || !state.devices.contains_key(&data.device_id)
        {
            return Err(AppError::database(
                "Foreign key violation: unknown user or device for waitlist entry",
            ));
        }
        let duplicate = state.waitlist.values().any(|entry| {
            entry.is_pending() && entry.user_id == data.user_id && entry.device_id == data.device_id
        });
        if duplicate {
            return Err(AppError::already_joined(format!(
                "User {} is already on the waitlist for device {}",
                data.user_id, data.device_id
            )));
        }

        let entry = data.clone().into_entry();
        state.waitlist.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn find_pending_waitlist_entry(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<Option<WaitlistEntry>> {
        let state = self.shared.lock()?;
        Ok(state
            .waitlist
            .values()
            .find(|e| e.is_pending() && e.user_id == user_id && e.device_id == device_id)
            .cloned())
    }

    async fn delete_pending_waitlist_entry(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> AppResult<bool> {
        let mut state = self.shared.lock()?;
        let found = state
            .waitlist
            .values()
            .find(|e| e.is_pending() && e.user_id == user_id && e.device_id == device_id)
            .map(|e| e.id);
        Ok(match found {
            Some(id) => state.waitlist.remove(&id).is_some(),
            None => false,
        })
    }

    async fn waitlist_position(&self, entry: &WaitlistEntry) -> AppResult<u64> {
        let state = self.shared.lock()?;
        let ahead = state
            .waitlist
            .values()
            .filter(|e| e.is_pending() && e.device_id == entry.device_id)
            .filter(|e| e.queue_key() < entry.queue_key())
            .count() as u64;
        Ok(ahead + 1)
    }

    async fn next_waitlist_entry(&self, device_id: DeviceId) -> AppResult<Option<WaitlistEntry>> {
        let state = self.shared.lock()?;
        Ok(state
            .waitlist
            .values()
            .filter(|e| e.is_pending() && e.device_id == device_id)
            .min_by(|a, b| a.queue_cmp(b))
            .cloned())
    }

    async fn list_pending_waitlist(&self, device_id: DeviceId) -> AppResult<Vec<WaitlistEntry>> {
        let state = self.shared.lock()?;
        let mut entries: Vec<WaitlistEntry> = state
            .waitlist
            .values()
            .filter(|e| e.is_pending() && e.device_id == device_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.queue_cmp(b));
        Ok(entries)
    }

    async fn mark_waitlist_notified(
        &self,
        id: WaitlistEntryId,
        at: DateTime<Utc>,
    ) -> AppResult<Option<WaitlistEntry>> {
        let mut state = self.shared.lock()?;
        match state.waitlist.get_mut(&id) {
            Some(entry) if entry.is_pending() => {
                entry.is_notified = true;
                entry.notified_at = Some(at);
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seed(units: usize) -> (MemoryLoanStore, UserId, DeviceId, Vec<UnitId>) {
        let store = MemoryLoanStore::new();
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: "ada@example.com".into(),
            display_name: Some("Ada".into()),
            created_at: now,
        };
        let device = Device {
            id: DeviceId::new(),
            brand: "Canon".into(),
            model: "EOS R6".into(),
            category: "camera".into(),
            default_loan_days: Some(7),
            created_at: now,
            updated_at: now,
        };
        let (user_id, device_id) = (user.id, device.id);
        store.insert_user(user).unwrap();
        store.insert_device(device).unwrap();

        let mut ids = Vec::new();
        for i in 0..units {
            let unit = InventoryUnit {
                id: UnitId::new(),
                device_id,
                serial_number: Some(format!("SN-{i}")),
                is_available: true,
                created_at: now + Duration::seconds(i as i64),
                updated_at: now,
            };
            ids.push(unit.id);
            store.insert_unit(unit).unwrap();
        }
        (store, user_id, device_id, ids)
    }

    #[tokio::test]
    async fn test_acquire_skips_units_locked_by_other_transaction() {
        let (store, _, device_id, units) = seed(2);

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        let mut third = store.begin().await.unwrap();

        assert_eq!(first.acquire(device_id).await.unwrap(), Some(units[0]));
        assert_eq!(second.acquire(device_id).await.unwrap(), Some(units[1]));
        assert_eq!(third.acquire(device_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_uncommitted_claim_is_invisible_and_dropped_claim_is_freed() {
        let (store, _, device_id, units) = seed(1);

        let mut tx = store.begin().await.unwrap();
        tx.acquire(device_id).await.unwrap();
        assert!(store.find_unit(units[0]).await.unwrap().unwrap().is_available);
        drop(tx);

        let mut again = store.begin().await.unwrap();
        assert_eq!(again.acquire(device_id).await.unwrap(), Some(units[0]));
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let (store, user_id, device_id, units) = seed(1);

        let mut tx = store.begin().await.unwrap();
        let unit = tx.acquire(device_id).await.unwrap().unwrap();
        let new = NewReservation::new(user_id, device_id, unit, Utc::now(), 7).unwrap();
        let reservation = tx.insert_reservation(&new).await.unwrap();
        assert!(store.find_reservation(reservation.id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert!(!store.find_unit(units[0]).await.unwrap().unwrap().is_available);
        assert!(store.find_reservation(reservation.id).await.unwrap().is_some());
        assert_eq!(store.count_available_units(device_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lock_reservation_waits_for_holder() {
        let (store, user_id, device_id, _) = seed(1);

        let mut tx = store.begin().await.unwrap();
        let unit = tx.acquire(device_id).await.unwrap().unwrap();
        let new = NewReservation::new(user_id, device_id, unit, Utc::now(), 7).unwrap();
        let id = tx.insert_reservation(&new).await.unwrap().id;
        tx.commit().await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_reservation(id).await.unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut tx = waiter_store.begin().await.unwrap();
            tx.lock_reservation(id).await.unwrap().map(|r| r.status)
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        holder.rollback().await.unwrap();
        assert!(waiter.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_pending_waitlist_entry_rejected() {
        let (store, user_id, device_id, _) = seed(0);
        let now = Utc::now();

        store
            .insert_waitlist_entry(&NewWaitlistEntry::new(user_id, device_id, now))
            .await
            .unwrap();
        let err = store
            .insert_waitlist_entry(&NewWaitlistEntry::new(user_id, device_id, now))
            .await
            .unwrap_err();

        assert!(err.is_conflict(loanhub_core::ConflictReason::AlreadyJoined));
        assert_eq!(store.list_pending_waitlist(device_id).await.unwrap().len(), 1);
    }
}
