//! Convenience result type alias for LoanHub.

use crate::error::AppError;

/// A specialized `Result` type for LoanHub operations.
pub type AppResult<T> = Result<T, AppError>;
