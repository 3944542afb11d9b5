//! Built-in task handler implementations.

pub mod waitlist;

pub use waitlist::WaitlistNotifyHandler;
