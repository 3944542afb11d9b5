//! # loanhub-service
//!
//! Business logic for LoanHub: the reservation transaction manager, the
//! FIFO waitlist, and the resilient notification dispatcher.
//!
//! Services follow constructor injection: stores, clocks, transports and
//! resilience handles are passed in as `Arc`s at construction time.

pub mod dto;
pub mod notification;
pub mod reservation;
pub mod task;
pub mod waitlist;

mod validate;

#[cfg(test)]
mod testing;

pub use dto::{ReservationView, WaitlistEntryView, WaitlistJoinView};
pub use notification::{NotificationDispatcher, NotifyOutcome};
pub use reservation::ReservationService;
pub use task::TaskSubmitter;
pub use waitlist::{WaitlistJoin, WaitlistService};
