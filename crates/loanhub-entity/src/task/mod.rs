//! Background task entities.

pub mod payload;

pub use payload::{LoanTask, ReleaseCause, TaskKind};
