//! # loanhub-core
//!
//! Core crate for LoanHub. Contains configuration schemas, typed
//! identifiers, the clock abstraction, and the unified error system.
//!
//! This crate has **no** internal dependencies on other LoanHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ConflictReason, ErrorKind};
pub use result::AppResult;
