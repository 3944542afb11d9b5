//! Shared fixtures for service tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use loanhub_core::config::ReservationConfig;
use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_core::traits::Clock;
use loanhub_core::types::id::{DeviceId, UnitId, UserId};
use loanhub_database::MemoryLoanStore;
use loanhub_entity::device::Device;
use loanhub_entity::inventory::InventoryUnit;
use loanhub_entity::task::LoanTask;
use loanhub_entity::user::User;

use crate::reservation::ReservationService;
use crate::task::TaskSubmitter;
use crate::waitlist::WaitlistService;

/// Fixed base instant plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Records submitted tasks, optionally refusing them.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    tasks: Mutex<Vec<LoanTask>>,
    fail: bool,
}

impl RecordingSubmitter {
    pub fn failing() -> Self {
        Self {
            tasks: Mutex::default(),
            fail: true,
        }
    }

    pub fn tasks(&self) -> Vec<LoanTask> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskSubmitter for RecordingSubmitter {
    fn submit(&self, task: LoanTask) -> AppResult<()> {
        if self.fail {
            return Err(AppError::service_unavailable("task queue is full"));
        }
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// One device with `units` free units, plus helpers to build services.
pub struct Fixture {
    pub store: MemoryLoanStore,
    pub clock: Arc<ManualClock>,
    pub device_id: DeviceId,
    pub units: Vec<UnitId>,
}

impl Fixture {
    pub fn new(units: usize) -> Self {
        Self::with_loan_days(units, Some(7))
    }

    pub fn with_loan_days(units: usize, loan_days: Option<i32>) -> Self {
        let store = MemoryLoanStore::new();
        let clock = Arc::new(ManualClock(Mutex::new(at(0))));
        let device = Device {
            id: DeviceId::new(),
            brand: "Canon".into(),
            model: "EOS R6".into(),
            category: "camera".into(),
            default_loan_days: loan_days,
            created_at: at(0),
            updated_at: at(0),
        };
        let device_id = device.id;
        store.insert_device(device).unwrap();

        let units = (0..units)
            .map(|i| {
                let unit = InventoryUnit {
                    id: UnitId::new(),
                    device_id,
                    serial_number: Some(format!("SN-{i:03}")),
                    is_available: true,
                    created_at: at(i as i64),
                    updated_at: at(i as i64),
                };
                let id = unit.id;
                store.insert_unit(unit).unwrap();
                id
            })
            .collect();

        Self {
            store,
            clock,
            device_id,
            units,
        }
    }

    pub fn add_user(&self, name: &str) -> UserId {
        let user = User {
            id: UserId::new(),
            email: format!("{name}@example.com"),
            display_name: Some(name.to_string()),
            created_at: at(0),
        };
        let id = user.id;
        self.store.insert_user(user).unwrap();
        id
    }

    pub fn reservations(&self) -> ReservationService {
        self.reservations_with(Arc::new(RecordingSubmitter::default()))
    }

    pub fn reservations_with(&self, tasks: Arc<dyn TaskSubmitter>) -> ReservationService {
        ReservationService::new(
            Arc::new(self.store.clone()),
            tasks,
            self.clock.clone(),
            ReservationConfig::default(),
        )
    }

    pub fn waitlist(&self) -> WaitlistService {
        WaitlistService::new(Arc::new(self.store.clone()), self.clock.clone())
    }
}
