//! Reserve, cancel, collect, return and complete.
//!
//! Every flow runs in exactly one store transaction. Flows that free a
//! unit hand a waitlist notification task to the [`TaskSubmitter`] after
//! commit; a failed hand-off is logged and never reported to the caller.

use std::sync::Arc;

use tracing::{info, warn};

use loanhub_core::config::ReservationConfig;
use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_core::traits::Clock;
use loanhub_core::types::id::{DeviceId, ReservationId, UserId};
use loanhub_database::LoanStore;
use loanhub_entity::device::effective_loan_days;
use loanhub_entity::reservation::{
    NewReservation, Reservation, ReservationStatus, ReservationUpdate,
};
use loanhub_entity::task::{LoanTask, ReleaseCause};

use crate::task::TaskSubmitter;
use crate::validate::require_id;

/// Owns reservation lifecycles and the units they hold.
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn LoanStore>,
    tasks: Arc<dyn TaskSubmitter>,
    clock: Arc<dyn Clock>,
    config: ReservationConfig,
}

impl ReservationService {
    /// Creates a new reservation service.
    pub fn new(
        store: Arc<dyn LoanStore>,
        tasks: Arc<dyn TaskSubmitter>,
        clock: Arc<dyn Clock>,
        config: ReservationConfig,
    ) -> Self {
        Self {
            store,
            tasks,
            clock,
            config,
        }
    }

    /// Claims a free unit of the device for the user.
    ///
    /// Returns `Conflict(NoInventory)` when every unit is taken or locked
    /// by a concurrent reservation. Allocation is never retried here.
    pub async fn reserve(&self, user_id: UserId, device_id: DeviceId) -> AppResult<Reservation> {
        require_id(user_id.is_nil(), "user_id")?;
        require_id(device_id.is_nil(), "device_id")?;

        if self.store.find_user(user_id).await?.is_none() {
            return Err(AppError::not_found(format!("User {user_id} not found")));
        }

        let mut tx = self.store.begin().await?;

        let loan_days = tx
            .device_loan_days(device_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Device {device_id} not found")))?;

        let Some(unit_id) = tx.acquire(device_id).await? else {
            if let Err(e) = tx.rollback().await {
                warn!(device_id = %device_id, error = %e, "Rollback after empty claim failed");
            }
            info!(user_id = %user_id, device_id = %device_id, "No inventory available");
            return Err(AppError::no_inventory(format!(
                "No available units for device {device_id}"
            )));
        };

        let days = effective_loan_days(loan_days, self.config.default_loan_days);
        let new = NewReservation::new(user_id, device_id, unit_id, self.clock.now(), days)?;
        let reservation = tx.insert_reservation(&new).await?;
        tx.commit().await?;

        info!(
            reservation_id = %reservation.id,
            user_id = %user_id,
            device_id = %device_id,
            unit_id = %unit_id,
            due_date = %reservation.due_date,
            "Reservation created"
        );

        Ok(reservation)
    }

    /// Cancels the caller's pending reservation and frees its unit.
    pub async fn cancel(
        &self,
        user_id: UserId,
        reservation_id: ReservationId,
    ) -> AppResult<Reservation> {
        require_id(user_id.is_nil(), "user_id")?;
        require_id(reservation_id.is_nil(), "reservation_id")?;
        self.transition(reservation_id, Some(user_id), ReservationStatus::Cancelled)
            .await
    }

    /// Records that the caller picked up the unit.
    pub async fn collect(
        &self,
        user_id: UserId,
        reservation_id: ReservationId,
    ) -> AppResult<Reservation> {
        require_id(user_id.is_nil(), "user_id")?;
        require_id(reservation_id.is_nil(), "reservation_id")?;
        self.transition(reservation_id, Some(user_id), ReservationStatus::Collected)
            .await
    }

    /// Records that the unit came back and frees it.
    pub async fn return_unit(&self, reservation_id: ReservationId) -> AppResult<Reservation> {
        require_id(reservation_id.is_nil(), "reservation_id")?;
        self.transition(reservation_id, None, ReservationStatus::Returned)
            .await
    }

    /// Closes a collected loan and frees the unit.
    pub async fn complete(&self, reservation_id: ReservationId) -> AppResult<Reservation> {
        require_id(reservation_id.is_nil(), "reservation_id")?;
        self.transition(reservation_id, None, ReservationStatus::Completed)
            .await
    }

    /// Finds a reservation by ID.
    pub async fn get(&self, reservation_id: ReservationId) -> AppResult<Reservation> {
        require_id(reservation_id.is_nil(), "reservation_id")?;
        self.store
            .find_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Reservation {reservation_id} not found")))
    }

    /// Lists the user's reservations, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<Reservation>> {
        require_id(user_id.is_nil(), "user_id")?;
        self.store.list_user_reservations(user_id).await
    }

    async fn transition(
        &self,
        reservation_id: ReservationId,
        actor: Option<UserId>,
        next: ReservationStatus,
    ) -> AppResult<Reservation> {
        let mut tx = self.store.begin().await?;

        let current = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Reservation {reservation_id} not found")))?;

        if let Some(user_id) = actor {
            if !current.is_owned_by(user_id) {
                return Err(AppError::forbidden(format!(
                    "Reservation {reservation_id} belongs to another user"
                )));
            }
        }

        if !current.status.can_transition_to(next) {
            return Err(AppError::invalid_state(format!(
                "Reservation {reservation_id} is {} and cannot become {next}",
                current.status
            )));
        }

        let updated = tx
            .transition_reservation(reservation_id, &ReservationUpdate::status(next, self.clock.now()))
            .await?;

        let frees_unit = !next.holds_unit();
        if frees_unit {
            tx.release(updated.unit_id).await?;
        }
        tx.commit().await?;

        info!(
            reservation_id = %reservation_id,
            from = %current.status,
            to = %next,
            unit_id = %updated.unit_id,
            "Reservation transitioned"
        );

        if frees_unit {
            self.trigger_waitlist(&updated, release_cause(next));
        }

        Ok(updated)
    }

    fn trigger_waitlist(&self, reservation: &Reservation, cause: ReleaseCause) {
        let task = LoanTask::NotifyWaitlist {
            device_id: reservation.device_id,
            reservation_id: Some(reservation.id),
            cause,
        };
        if let Err(e) = self.tasks.submit(task) {
            warn!(
                reservation_id = %reservation.id,
                device_id = %reservation.device_id,
                error = %e,
                "Failed to enqueue waitlist notification"
            );
        }
    }
}

fn release_cause(status: ReservationStatus) -> ReleaseCause {
    match status {
        ReservationStatus::Returned => ReleaseCause::Returned,
        ReservationStatus::Completed => ReleaseCause::Completed,
        _ => ReleaseCause::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use loanhub_core::ConflictReason;

    use crate::testing::{Fixture, RecordingSubmitter};

    #[tokio::test]
    async fn test_reserve_sets_due_date_from_device() {
        let fx = Fixture::new(1);
        let user = fx.add_user("ada");
        let reservation = fx.reservations().reserve(user, fx.device_id).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.unit_id, fx.units[0]);
        assert_eq!(reservation.due_date - reservation.reserved_at, Duration::days(7));
        assert!(!fx.store.find_unit(fx.units[0]).await.unwrap().unwrap().is_available);
    }

    #[tokio::test]
    async fn test_reserve_falls_back_to_default_loan_days() {
        let fx = Fixture::with_loan_days(1, None);
        let user = fx.add_user("ada");
        let reservation = fx.reservations().reserve(user, fx.device_id).await.unwrap();
        assert_eq!(reservation.due_date - reservation.reserved_at, Duration::days(14));
    }

    #[tokio::test]
    async fn test_reserve_rejects_out_of_range_loan_days() {
        let fx = Fixture::with_loan_days(1, Some(200_000_000));
        let user = fx.add_user("ada");

        let err = fx.reservations().reserve(user, fx.device_id).await.unwrap_err();

        assert_eq!(err.kind, loanhub_core::ErrorKind::Validation);
        assert_eq!(fx.store.count_available_units(fx.device_id).await.unwrap(), 1);
        assert!(fx.reservations().list_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_claim_each_unit_once() {
        let fx = Fixture::new(3);
        let service = fx.reservations();
        let users: Vec<_> = (0..10).map(|i| fx.add_user(&format!("u{i}"))).collect();

        let handles = users.into_iter().map(|user| {
            let service = service.clone();
            let device_id = fx.device_id;
            tokio::spawn(async move { service.reserve(user, device_id).await })
        });
        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let mut units: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|res| res.unit_id))
            .collect();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_conflict(ConflictReason::NoInventory)))
            .count();

        assert_eq!(units.len(), 3);
        assert_eq!(conflicts, 7);
        units.sort();
        units.dedup();
        assert_eq!(units.len(), 3);
        assert_eq!(fx.store.count_available_units(fx.device_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_claim() {
        let fx = Fixture::new(1);
        let user = fx.add_user("ada");
        fx.store.fail_next_insert();

        let err = fx.reservations().reserve(user, fx.device_id).await.unwrap_err();

        assert_eq!(err.kind, loanhub_core::ErrorKind::Database);
        assert!(fx.store.find_unit(fx.units[0]).await.unwrap().unwrap().is_available);
        assert!(fx.reservations().reserve(user, fx.device_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_releases_unit_for_next_reserve() {
        let fx = Fixture::new(1);
        let (ada, bob) = (fx.add_user("ada"), fx.add_user("bob"));
        let service = fx.reservations();

        let first = service.reserve(ada, fx.device_id).await.unwrap();
        assert!(service
            .reserve(bob, fx.device_id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::NoInventory));

        let cancelled = service.cancel(ada, first.id).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(fx.store.find_unit(first.unit_id).await.unwrap().unwrap().is_available);

        let second = service.reserve(bob, fx.device_id).await.unwrap();
        assert_eq!(second.unit_id, first.unit_id);
    }

    #[tokio::test]
    async fn test_cancel_error_classes() {
        let fx = Fixture::new(1);
        let (ada, bob) = (fx.add_user("ada"), fx.add_user("bob"));
        let service = fx.reservations();
        let reservation = service.reserve(ada, fx.device_id).await.unwrap();

        assert!(service
            .cancel(ada, ReservationId::new())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(service
            .cancel(bob, reservation.id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::Forbidden));

        service.cancel(ada, reservation.id).await.unwrap();
        assert!(service
            .cancel(ada, reservation.id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::InvalidState));
    }

    #[tokio::test]
    async fn test_cancel_submits_notify_task_after_commit() {
        let fx = Fixture::new(1);
        let ada = fx.add_user("ada");
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = fx.reservations_with(submitter.clone());

        let reservation = service.reserve(ada, fx.device_id).await.unwrap();
        assert!(submitter.tasks().is_empty());

        service.cancel(ada, reservation.id).await.unwrap();
        assert_eq!(
            submitter.tasks(),
            vec![LoanTask::NotifyWaitlist {
                device_id: fx.device_id,
                reservation_id: Some(reservation.id),
                cause: ReleaseCause::Cancelled,
            }]
        );
    }

    #[tokio::test]
    async fn test_cancel_succeeds_when_task_submission_fails() {
        let fx = Fixture::new(1);
        let ada = fx.add_user("ada");
        let service = fx.reservations_with(Arc::new(RecordingSubmitter::failing()));

        let reservation = service.reserve(ada, fx.device_id).await.unwrap();
        let cancelled = service.cancel(ada, reservation.id).await.unwrap();

        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_collect_then_return_lifecycle() {
        let fx = Fixture::new(1);
        let (ada, bob) = (fx.add_user("ada"), fx.add_user("bob"));
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = fx.reservations_with(submitter.clone());
        let reservation = service.reserve(ada, fx.device_id).await.unwrap();

        assert!(service
            .collect(bob, reservation.id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::Forbidden));
        assert!(service
            .return_unit(reservation.id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::InvalidState));

        let collected = service.collect(ada, reservation.id).await.unwrap();
        assert_eq!(collected.status, ReservationStatus::Collected);
        assert!(!fx.store.find_unit(fx.units[0]).await.unwrap().unwrap().is_available);
        assert!(submitter.tasks().is_empty());
        assert!(service
            .cancel(ada, reservation.id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::InvalidState));

        let returned = service.return_unit(reservation.id).await.unwrap();
        assert_eq!(returned.status, ReservationStatus::Returned);
        assert!(fx.store.find_unit(fx.units[0]).await.unwrap().unwrap().is_available);
        assert_eq!(submitter.tasks().len(), 1);
        assert!(service
            .complete(reservation.id)
            .await
            .unwrap_err()
            .is_conflict(ConflictReason::InvalidState));
    }

    #[tokio::test]
    async fn test_complete_frees_unit() {
        let fx = Fixture::new(1);
        let ada = fx.add_user("ada");
        let service = fx.reservations();
        let reservation = service.reserve(ada, fx.device_id).await.unwrap();
        service.collect(ada, reservation.id).await.unwrap();

        let completed = service.complete(reservation.id).await.unwrap();

        assert_eq!(completed.status, ReservationStatus::Completed);
        assert_eq!(fx.store.count_available_units(fx.device_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_validation_before_transaction() {
        let fx = Fixture::new(1);
        let err = fx
            .reservations()
            .reserve(UserId::from_uuid(Default::default()), fx.device_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, loanhub_core::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let fx = Fixture::new(0);
        let ada = fx.add_user("ada");
        let err = fx
            .reservations()
            .reserve(ada, DeviceId::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_for_user_newest_first() {
        let fx = Fixture::new(2);
        let ada = fx.add_user("ada");
        let service = fx.reservations();

        let older = service.reserve(ada, fx.device_id).await.unwrap();
        fx.clock.advance(Duration::hours(1));
        let newer = service.reserve(ada, fx.device_id).await.unwrap();

        let ids: Vec<_> = service
            .list_for_user(ada)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
