//! Worker runner: drains the task queue and executes tasks.

use std::sync::Arc;

use tokio::sync::{Semaphore, watch};

use loanhub_core::config::WorkerConfig;

use crate::executor::{TaskExecutionError, TaskExecutor};
use crate::queue::TaskReceiver;

/// Executes queued tasks with bounded concurrency.
///
/// Runs until the shutdown signal flips to `true` (or its sender is
/// dropped) or every queue sender is dropped. On exit it waits up to
/// `shutdown_grace_seconds` for tasks that are already running.
pub struct WorkerRunner {
    executor: Arc<TaskExecutor>,
    config: WorkerConfig,
    worker_id: String,
}

impl WorkerRunner {
    /// Create a new worker runner.
    pub fn new(executor: Arc<TaskExecutor>, config: WorkerConfig, worker_id: String) -> Self {
        Self {
            executor,
            config,
            worker_id,
        }
    }

    /// Run the worker until shutdown or until the queue closes.
    pub async fn run(&self, mut receiver: TaskReceiver, mut shutdown: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        tracing::info!(
            worker_id = %self.worker_id,
            concurrency,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));

        loop {
            let permit = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(worker_id = %self.worker_id, "Worker received shutdown signal");
                        break;
                    }
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queued = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(worker_id = %self.worker_id, "Worker received shutdown signal");
                        break;
                    }
                    continue;
                }
                queued = receiver.recv() => match queued {
                    Some(queued) => queued,
                    None => {
                        tracing::info!(worker_id = %self.worker_id, "Task queue closed");
                        break;
                    }
                },
            };

            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                let _permit = permit;
                let kind = queued.task.kind();
                tracing::info!(task_id = %queued.id, kind = %kind, "Processing task");

                match executor.execute(&queued.task).await {
                    Ok(()) => {
                        tracing::info!(task_id = %queued.id, kind = %kind, "Task completed");
                    }
                    Err(TaskExecutionError::Transient(msg)) => {
                        tracing::warn!(task_id = %queued.id, kind = %kind, error = %msg, "Task failed (transient)");
                    }
                    Err(TaskExecutionError::Permanent(msg)) => {
                        tracing::error!(task_id = %queued.id, kind = %kind, error = %msg, "Task failed permanently");
                    }
                    Err(TaskExecutionError::Internal(err)) => {
                        tracing::error!(task_id = %queued.id, kind = %kind, error = %err, "Task internal error");
                    }
                }
            });
        }

        if !receiver.is_empty() {
            tracing::warn!(
                worker_id = %self.worker_id,
                dropped = receiver.len(),
                "Dropping queued tasks on shutdown"
            );
        }

        tracing::info!(worker_id = %self.worker_id, "Waiting for in-flight tasks to complete...");

        let grace = self.config.shutdown_grace();
        let permits = u32::try_from(concurrency).unwrap_or(u32::MAX);
        if tokio::time::timeout(grace, semaphore.acquire_many(permits))
            .await
            .is_err()
        {
            tracing::warn!(
                worker_id = %self.worker_id,
                grace_seconds = self.config.shutdown_grace_seconds,
                "In-flight tasks still running after grace period"
            );
        }

        tracing::info!(worker_id = %self.worker_id, "Worker shut down complete");
    }
}
