//! # loanhub-entity
//!
//! Domain entity models for LoanHub. Every struct in this crate
//! represents a database table row or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, `Deserialize`, and database
//! entities additionally derive `sqlx::FromRow`.

pub mod device;
pub mod inventory;
pub mod reservation;
pub mod task;
pub mod user;
pub mod waitlist;
