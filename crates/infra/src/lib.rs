//! Infrastructure layer: storage adapters, the stock ledger engine, read-side
//! derivations and reports, and configuration.

pub mod config;
pub mod error;
pub mod ledger;
pub mod queries;
pub mod reports;
pub mod store;


pub use config::AppConfig;
pub use error::LedgerError;
pub use ledger::StockLedger;
pub use queries::{InventoryStats, LedgerAudit, LowStockProduct, MovementPage, StockQueries};
pub use reports::{ExpiryReport, MovementReport, ValueReport};
pub use store::{
    InMemoryStockStore, InventorySnapshot, LogFilter, Pagination, PostgresStockStore,
    ProductFilter, ProductSort, StockStore, StockTransaction, StoreError,
};
