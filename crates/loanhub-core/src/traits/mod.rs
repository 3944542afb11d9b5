//! Core traits defined in `loanhub-core` and implemented by other crates.

pub mod clock;

pub use clock::{Clock, SystemClock};
