//! Core type definitions used across the LoanHub workspace.

pub mod id;

pub use id::*;
