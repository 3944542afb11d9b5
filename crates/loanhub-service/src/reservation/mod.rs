//! Reservation transaction manager and state machine.

pub mod service;

pub use service::ReservationService;
