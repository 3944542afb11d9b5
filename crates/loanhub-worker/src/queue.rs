//! Bounded in-process task queue.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;
use loanhub_entity::task::LoanTask;
use loanhub_service::TaskSubmitter;

/// A task waiting in the queue.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    /// Identifier used in logs.
    pub id: Uuid,
    /// The work to do.
    pub task: LoanTask,
    /// When the task was submitted.
    pub enqueued_at: DateTime<Utc>,
}

/// Sending half of the task queue. Cheap to clone.
///
/// The queue closes once every `TaskQueue` clone has been dropped.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<QueuedTask>,
}

/// Receiving half of the task queue, owned by the worker.
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::Receiver<QueuedTask>,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` pending tasks.
    pub fn bounded(capacity: usize) -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, TaskReceiver { receiver })
    }

    /// Number of tasks waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

impl TaskSubmitter for TaskQueue {
    fn submit(&self, task: LoanTask) -> AppResult<()> {
        let queued = QueuedTask {
            id: Uuid::new_v4(),
            task,
            enqueued_at: Utc::now(),
        };
        let id = queued.id;
        let kind = queued.task.kind();

        match self.sender.try_send(queued) {
            Ok(()) => {
                tracing::debug!(task_id = %id, kind = %kind, "Task enqueued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(AppError::service_unavailable(format!(
                "Task queue is full, dropping {kind} task"
            ))),
            Err(TrySendError::Closed(_)) => Err(AppError::service_unavailable(format!(
                "Task queue is closed, dropping {kind} task"
            ))),
        }
    }
}

impl TaskReceiver {
    /// Wait for the next task. `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<QueuedTask> {
        self.receiver.recv().await
    }

    /// Number of tasks still buffered.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no tasks are buffered.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanhub_core::types::id::DeviceId;
    use loanhub_entity::task::ReleaseCause;

    fn task() -> LoanTask {
        LoanTask::NotifyWaitlist {
            device_id: DeviceId::new(),
            reservation_id: None,
            cause: ReleaseCause::Manual,
        }
    }

    #[tokio::test]
    async fn test_submit_is_fifo() {
        let (queue, mut rx) = TaskQueue::bounded(4);
        let (a, b) = (task(), task());
        queue.submit(a.clone()).unwrap();
        queue.submit(b.clone()).unwrap();
        assert_eq!(queue.depth(), 2);

        assert_eq!(rx.recv().await.unwrap().task, a);
        assert_eq!(rx.recv().await.unwrap().task, b);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (queue, _rx) = TaskQueue::bounded(1);
        queue.submit(task()).unwrap();
        let err = queue.submit(task()).unwrap_err();
        assert_eq!(err.kind, loanhub_core::ErrorKind::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (queue, rx) = TaskQueue::bounded(1);
        drop(rx);
        assert!(queue.submit(task()).is_err());
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_dropped() {
        let (queue, mut rx) = TaskQueue::bounded(2);
        queue.submit(task()).unwrap();
        drop(queue);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
