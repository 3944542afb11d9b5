//! Repository implementations for all LoanHub tables.
//!
//! Pool-backed methods serve reads outside any transaction. Associated
//! functions taking `&mut PgConnection` run inside a caller-owned
//! transaction.

pub mod device;
pub mod inventory;
pub mod reservation;
pub mod user;
pub mod waitlist;

pub use device::DeviceRepository;
pub use inventory::InventoryRepository;
pub use reservation::ReservationRepository;
pub use user::UserRepository;
pub use waitlist::WaitlistRepository;
