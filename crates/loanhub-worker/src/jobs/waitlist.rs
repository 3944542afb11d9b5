//! Waitlist notification handler.
//!
//! Runs after a reservation releases its unit and mails the head of the
//! device's waitlist.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use loanhub_entity::task::{LoanTask, TaskKind};
use loanhub_service::{NotificationDispatcher, NotifyOutcome};

use crate::executor::{TaskExecutionError, TaskHandler};

/// Handles `notify_waitlist` tasks.
pub struct WaitlistNotifyHandler {
    dispatcher: Arc<NotificationDispatcher>,
}

impl WaitlistNotifyHandler {
    /// Create a new waitlist notification handler.
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl TaskHandler for WaitlistNotifyHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::NotifyWaitlist
    }

    async fn execute(&self, task: &LoanTask) -> Result<(), TaskExecutionError> {
        let LoanTask::NotifyWaitlist {
            device_id,
            reservation_id,
            cause,
        } = task;

        info!(
            device_id = %device_id,
            reservation_id = ?reservation_id,
            cause = ?cause,
            "Notifying waitlist"
        );

        match self.dispatcher.notify_next_user(*device_id).await? {
            NotifyOutcome::QueueEmpty | NotifyOutcome::Notified { .. } => Ok(()),
            NotifyOutcome::Failed { entry_id, error } => Err(TaskExecutionError::Transient(
                format!("Notification for waitlist entry {entry_id} failed: {error}"),
            )),
        }
    }
}
