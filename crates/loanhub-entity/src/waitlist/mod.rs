//! Waitlist domain entities.

pub mod model;

pub use model::{NewWaitlistEntry, WaitlistEntry};
