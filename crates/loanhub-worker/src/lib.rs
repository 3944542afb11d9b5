//! Background task processing for LoanHub.
//!
//! This crate provides:
//! - A bounded in-process task queue that services submit to without waiting
//! - A task executor that dispatches tasks to the registered handler
//! - A worker runner that drains the queue with bounded concurrency
//! - The waitlist notification handler

pub mod executor;
pub mod jobs;
pub mod queue;
pub mod runner;

pub use executor::{TaskExecutionError, TaskExecutor, TaskHandler};
pub use queue::{QueuedTask, TaskQueue, TaskReceiver};
pub use runner::WorkerRunner;
