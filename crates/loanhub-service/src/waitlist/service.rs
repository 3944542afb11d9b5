//! Waitlist join, removal, position and next-user operations.

use std::sync::Arc;

use tracing::info;

use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_core::traits::Clock;
use loanhub_core::types::id::{DeviceId, UserId, WaitlistEntryId};
use loanhub_database::LoanStore;
use loanhub_entity::waitlist::{NewWaitlistEntry, WaitlistEntry};

use crate::validate::require_id;

/// A freshly created entry and its queue position at insertion time.
#[derive(Debug, Clone)]
pub struct WaitlistJoin {
    /// The pending entry.
    pub entry: WaitlistEntry,
    /// 1-based position among pending entries for the device.
    pub position: u64,
}

/// Manages the per-device FIFO waitlist.
///
/// Queue order is `(added_at, id)` ascending over un-notified entries.
/// Notified entries are kept as a record of who was offered a unit.
#[derive(Clone)]
pub struct WaitlistService {
    store: Arc<dyn LoanStore>,
    clock: Arc<dyn Clock>,
}

impl WaitlistService {
    /// Creates a new waitlist service.
    pub fn new(store: Arc<dyn LoanStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Adds the user to the device's waitlist.
    pub async fn join(&self, user_id: UserId, device_id: DeviceId) -> AppResult<WaitlistJoin> {
        require_id(user_id.is_nil(), "user_id")?;
        require_id(device_id.is_nil(), "device_id")?;

        if self.store.find_device(device_id).await?.is_none() {
            return Err(AppError::not_found(format!("Device {device_id} not found")));
        }
        if self.store.find_user(user_id).await?.is_none() {
            return Err(AppError::not_found(format!("User {user_id} not found")));
        }
        if self
            .store
            .find_pending_waitlist_entry(user_id, device_id)
            .await?
            .is_some()
        {
            return Err(AppError::already_joined(format!(
                "User {user_id} is already on the waitlist for device {device_id}"
            )));
        }

        // The store's pending-pair uniqueness settles concurrent joins.
        let entry = self
            .store
            .insert_waitlist_entry(&NewWaitlistEntry::new(user_id, device_id, self.clock.now()))
            .await?;
        let position = self.store.waitlist_position(&entry).await?;

        info!(
            user_id = %user_id,
            device_id = %device_id,
            entry_id = %entry.id,
            position,
            "User joined waitlist"
        );

        Ok(WaitlistJoin { entry, position })
    }

    /// Removes the user's pending entry. Notified entries cannot be removed.
    pub async fn remove(&self, user_id: UserId, device_id: DeviceId) -> AppResult<()> {
        require_id(user_id.is_nil(), "user_id")?;
        require_id(device_id.is_nil(), "device_id")?;

        if !self
            .store
            .delete_pending_waitlist_entry(user_id, device_id)
            .await?
        {
            return Err(AppError::not_found(format!(
                "No pending waitlist entry for user {user_id} and device {device_id}"
            )));
        }

        info!(user_id = %user_id, device_id = %device_id, "User left waitlist");
        Ok(())
    }

    /// Current 1-based position of the user's pending entry.
    pub async fn position(&self, user_id: UserId, device_id: DeviceId) -> AppResult<u64> {
        require_id(user_id.is_nil(), "user_id")?;
        require_id(device_id.is_nil(), "device_id")?;

        let entry = self
            .store
            .find_pending_waitlist_entry(user_id, device_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "No pending waitlist entry for user {user_id} and device {device_id}"
                ))
            })?;
        self.store.waitlist_position(&entry).await
    }

    /// Pending entries for a device in queue order.
    pub async fn list(&self, device_id: DeviceId) -> AppResult<Vec<WaitlistEntry>> {
        require_id(device_id.is_nil(), "device_id")?;
        self.store.list_pending_waitlist(device_id).await
    }

    /// The earliest pending entry for a device.
    pub async fn next_user(&self, device_id: DeviceId) -> AppResult<Option<WaitlistEntry>> {
        require_id(device_id.is_nil(), "device_id")?;
        self.store.next_waitlist_entry(device_id).await
    }

    /// Marks an entry notified. Call only after a confirmed delivery.
    pub async fn mark_notified(&self, entry_id: WaitlistEntryId) -> AppResult<WaitlistEntry> {
        let entry = self
            .store
            .mark_waitlist_notified(entry_id, self.clock.now())
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("No pending waitlist entry {entry_id}"))
            })?;

        info!(entry_id = %entry_id, user_id = %entry.user_id, "Waitlist entry marked notified");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::testing::{Fixture, at};

    #[tokio::test]
    async fn test_fifo_order_and_join_position() {
        let fx = Fixture::new(0);
        let (e1_user, e2_user, e3_user) = (fx.add_user("e1"), fx.add_user("e2"), fx.add_user("e3"));
        let waitlist = fx.waitlist();

        fx.clock.set(at(10));
        let e1 = waitlist.join(e1_user, fx.device_id).await.unwrap();
        fx.clock.set(at(20));
        let e2 = waitlist.join(e2_user, fx.device_id).await.unwrap();
        fx.clock.set(at(15));
        let e3 = waitlist.join(e3_user, fx.device_id).await.unwrap();

        assert_eq!(e1.position, 1);
        assert_eq!(e2.position, 2);
        // e3 joined last but sorts before e2 by added_at.
        assert_eq!(e3.position, 2);
        assert_eq!(waitlist.position(e2_user, fx.device_id).await.unwrap(), 3);

        let next = waitlist.next_user(fx.device_id).await.unwrap().unwrap();
        assert_eq!(next.id, e1.entry.id);
        waitlist.mark_notified(next.id).await.unwrap();

        let next = waitlist.next_user(fx.device_id).await.unwrap().unwrap();
        assert_eq!(next.id, e3.entry.id);
    }

    #[tokio::test]
    async fn test_position_at_insertion_counts_earlier_entries() {
        let fx = Fixture::new(0);
        let (u1, u2, u3) = (fx.add_user("e1"), fx.add_user("e2"), fx.add_user("e3"));
        let waitlist = fx.waitlist();

        fx.clock.set(at(10));
        waitlist.join(u1, fx.device_id).await.unwrap();
        fx.clock.set(at(15));
        waitlist.join(u3, fx.device_id).await.unwrap();
        fx.clock.set(at(20));
        let e2 = waitlist.join(u2, fx.device_id).await.unwrap();

        assert_eq!(e2.position, 3);
    }

    #[tokio::test]
    async fn test_identical_timestamps_use_id_tiebreak() {
        let fx = Fixture::new(0);
        let (u1, u2) = (fx.add_user("a"), fx.add_user("b"));
        let waitlist = fx.waitlist();

        let first = waitlist.join(u1, fx.device_id).await.unwrap();
        let second = waitlist.join(u2, fx.device_id).await.unwrap();

        assert_eq!(first.entry.added_at, second.entry.added_at);
        assert_eq!(second.position, 2);
        let listed: Vec<_> = waitlist
            .list(fx.device_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(listed, vec![first.entry.id, second.entry.id]);
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected() {
        let fx = Fixture::new(0);
        let user = fx.add_user("dup");
        let waitlist = fx.waitlist();

        waitlist.join(user, fx.device_id).await.unwrap();
        let err = waitlist.join(user, fx.device_id).await.unwrap_err();

        assert!(err.is_conflict(loanhub_core::ConflictReason::AlreadyJoined));
        assert_eq!(waitlist.list(fx.device_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_joins_leave_one_entry() {
        let fx = Fixture::new(0);
        let user = fx.add_user("racer");
        let waitlist = fx.waitlist();

        let (a, b) = tokio::join!(
            waitlist.join(user, fx.device_id),
            waitlist.join(user, fx.device_id)
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(waitlist.list(fx.device_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_rejoin() {
        let fx = Fixture::new(0);
        let user = fx.add_user("leaver");
        let waitlist = fx.waitlist();

        waitlist.join(user, fx.device_id).await.unwrap();
        waitlist.remove(user, fx.device_id).await.unwrap();
        assert!(waitlist.remove(user, fx.device_id).await.unwrap_err().is_not_found());
        assert!(waitlist.join(user, fx.device_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_notified_entry_is_kept_and_cannot_be_removed() {
        let fx = Fixture::new(0);
        let user = fx.add_user("notified");
        let waitlist = fx.waitlist();

        let joined = waitlist.join(user, fx.device_id).await.unwrap();
        fx.clock.advance(Duration::minutes(5));
        let marked = waitlist.mark_notified(joined.entry.id).await.unwrap();

        assert!(marked.is_notified);
        assert_eq!(marked.notified_at, Some(fx.clock.now()));
        assert!(waitlist.remove(user, fx.device_id).await.unwrap_err().is_not_found());
        assert!(waitlist.next_user(fx.device_id).await.unwrap().is_none());
        assert!(waitlist.mark_notified(joined.entry.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_nil_ids_rejected() {
        let fx = Fixture::new(0);
        let waitlist = fx.waitlist();
        let err = waitlist
            .join(UserId::from_uuid(Default::default()), fx.device_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, loanhub_core::ErrorKind::Validation);
    }
}
