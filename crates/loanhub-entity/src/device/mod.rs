//! Device catalog entities.

pub mod model;

pub use model::{Device, effective_loan_days};
