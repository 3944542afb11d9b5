//! Inventory unit entities.

pub mod model;

pub use model::InventoryUnit;
