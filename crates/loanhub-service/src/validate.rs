//! Input checks performed before any transaction opens.

use loanhub_core::error::AppError;
use loanhub_core::result::AppResult;

/// Reject an empty (nil) identifier.
pub(crate) fn require_id(is_nil: bool, field: &str) -> AppResult<()> {
    if is_nil {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}
