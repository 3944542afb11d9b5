//! FIFO waitlist per device.

pub mod service;

pub use service::{WaitlistJoin, WaitlistService};
