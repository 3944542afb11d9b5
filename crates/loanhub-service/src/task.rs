//! Hand-off point for work that runs after the caller has been answered.

use loanhub_core::result::AppResult;
use loanhub_entity::task::LoanTask;

/// Accepts background tasks without waiting for them to run.
///
/// `submit` must not block: an implementation either enqueues the task
/// immediately or returns an error, which callers log and otherwise
/// ignore.
pub trait TaskSubmitter: Send + Sync + 'static {
    /// Enqueue a task.
    fn submit(&self, task: LoanTask) -> AppResult<()>;
}
