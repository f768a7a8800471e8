//! Inventory domain module.
//!
//! This crate contains the business rules for stock movements, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod log;
pub mod movement;
pub mod product;

pub use log::{replay_stock, ActorRef, InventoryLogEntry, LogEntryDetails, ProductRef};
pub use movement::{MovementRequest, StockAction, StockError};
pub use product::{
    total_stock_value, NewProduct, Product, ProductPatch, StockStatus, DEFAULT_THRESHOLD,
    MAX_PRICE_EXCLUSIVE, PRICE_SCALE,
};
