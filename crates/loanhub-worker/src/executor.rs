//! Task executor: dispatches tasks to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use loanhub_core::error::AppError;
use loanhub_entity::task::{LoanTask, TaskKind};

/// A handler for one kind of task.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// The task kind this handler processes.
    fn kind(&self) -> TaskKind;

    /// Run the task.
    async fn execute(&self, task: &LoanTask) -> Result<(), TaskExecutionError>;
}

/// Error from task execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskExecutionError {
    /// The task cannot succeed as submitted.
    #[error("Permanent task failure: {0}")]
    Permanent(String),

    /// The task failed but a later trigger may succeed.
    #[error("Transient task failure: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Dispatches tasks to the handler registered for their kind.
#[derive(Default)]
pub struct TaskExecutor {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same kind.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let kind = handler.kind();
        tracing::info!(kind = %kind, "Registered task handler");
        self.handlers.insert(kind, handler);
    }

    /// Execute a task with its registered handler.
    pub async fn execute(&self, task: &LoanTask) -> Result<(), TaskExecutionError> {
        let kind = task.kind();
        let handler = self.handlers.get(&kind).ok_or_else(|| {
            TaskExecutionError::Permanent(format!("No handler registered for task kind '{kind}'"))
        })?;
        handler.execute(task).await
    }
}
