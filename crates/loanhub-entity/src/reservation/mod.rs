//! Reservation domain entities and the reservation state machine.

pub mod model;
pub mod status;

pub use model::{NewReservation, Reservation, ReservationUpdate};
pub use status::ReservationStatus;
