//! Storage boundary for products and the inventory ledger.
//!
//! The ledger engine never talks to a database directly. It opens an explicit unit of
//! work ([`StockTransaction`]) from a [`StockStore`], performs its reads and writes
//! through it, and then commits or rolls back. Dropping an uncommitted transaction
//! discards its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ProductId, UserId};
use stockledger_inventory::{ActorRef, InventoryLogEntry, LogEntryDetails, Product, StockAction};

pub use memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

/// Storage adapter failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed mid-operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A persisted row could not be decoded into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Typed ledger filter; every field is optional and all present fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub product_id: Option<ProductId>,
    pub actor_id: Option<UserId>,
    pub action: Option<StockAction>,
    /// Inclusive lower bound on `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub end: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &InventoryLogEntry) -> bool {
        self.product_id.is_none_or(|id| entry.product_id == id)
            && self.actor_id.is_none_or(|id| entry.actor_id == id)
            && self.action.is_none_or(|a| entry.action == a)
            && self.start.is_none_or(|s| entry.created_at >= s)
            && self.end.is_none_or(|e| entry.created_at <= e)
    }
}

/// 1-based pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Build from optional caller input; page is clamped to >= 1 and size to 1..=max.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32, max_size: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(default_size).clamp(1, max_size.max(1)),
        }
    }

    pub fn first(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// `ceil(total / page_size)`.
    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.page_size))
    }
}

/// One page of enriched ledger entries plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPage {
    pub entries: Vec<LogEntryDetails>,
    pub total: u64,
}

/// Live products and the most recent ledger entries, read from one committed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub products: Vec<Product>,
    /// Most recent first.
    pub recent: Vec<LogEntryDetails>,
}

/// Sortable product columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductSort {
    Name,
    Sku,
    Category,
    Stock,
    Price,
    CreatedAt,
}

impl FromStr for ProductSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(ProductSort::Name),
            "sku" => Ok(ProductSort::Sku),
            "category" => Ok(ProductSort::Category),
            "stock" => Ok(ProductSort::Stock),
            "price" => Ok(ProductSort::Price),
            "createdAt" | "created_at" => Ok(ProductSort::CreatedAt),
            other => Err(format!("unsupported sort field '{other}'")),
        }
    }
}

/// Typed product listing filter (tombstoned products are never listed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
    pub category: Option<String>,
    /// Only products with `stock <= threshold`.
    pub low_stock_only: bool,
    pub sort: Option<ProductSort>,
    pub descending: bool,
}

impl ProductFilter {
    pub fn low_stock() -> Self {
        Self {
            low_stock_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, product: &Product) -> bool {
        if product.is_deleted() {
            return false;
        }
        if self.low_stock_only && !product.is_low_stock() {
            return false;
        }
        if let Some(category) = &self.category {
            if &product.category != category {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !product.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Explicit unit of work over products and the ledger.
///
/// Implementations must hold the row lock taken by [`lock_product`] until
/// [`commit`]/[`rollback`], and must not expose any staged write to other readers
/// before commit.
///
/// [`lock_product`]: StockTransaction::lock_product
/// [`commit`]: StockTransaction::commit
/// [`rollback`]: StockTransaction::rollback
#[async_trait]
pub trait StockTransaction: Send {
    /// Fetch a live (non-tombstoned) product and lock it for the rest of the transaction.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Name the first live product other than `exclude` that already uses `sku` or
    /// `barcode`, as `"sku 'X'"` / `"barcode 'Y'"`.
    async fn find_duplicate(
        &mut self,
        sku: &str,
        barcode: Option<&str>,
        exclude: Option<ProductId>,
    ) -> Result<Option<String>, StoreError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    /// Persist descriptive fields, threshold, price and tombstone. Never writes `stock`.
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;

    /// The only path that changes a product's stock.
    async fn write_stock(
        &mut self,
        id: ProductId,
        stock: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn upsert_actor(&mut self, actor: &ActorRef) -> Result<(), StoreError>;

    async fn append_log(&mut self, entry: &InventoryLogEntry) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Products + ledger storage. Reads observe committed state only.
#[async_trait]
pub trait StockStore: Send + Sync + 'static {
    type Tx: StockTransaction + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    /// Live product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    /// Distinct categories of live products, sorted.
    async fn categories(&self) -> Result<Vec<String>, StoreError>;

    /// Matching entries, most recent first, paginated.
    async fn query_logs(&self, filter: &LogFilter, page: Pagination) -> Result<LogPage, StoreError>;

    /// All matching entries, oldest first.
    async fn ledger_entries(&self, filter: &LogFilter) -> Result<Vec<LogEntryDetails>, StoreError>;

    /// Every live product plus the `recent` newest ledger entries, as of a single point in
    /// time: a movement is either reflected in both halves or in neither.
    async fn inventory_snapshot(&self, recent: u32) -> Result<InventorySnapshot, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps_input() {
        let p = Pagination::new(Some(0), Some(5000), DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);

        let p = Pagination::new(None, None, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        assert_eq!(p, Pagination::default());
    }

    #[test]
    fn page_count_rounds_up() {
        let p = Pagination::first(50);
        assert_eq!(p.page_count(0), 0);
        assert_eq!(p.page_count(50), 1);
        assert_eq!(p.page_count(51), 2);
    }

    #[test]
    fn offset_is_zero_based() {
        let p = Pagination::new(Some(3), Some(20), DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn sort_field_parses_wire_names() {
        assert_eq!("createdAt".parse::<ProductSort>(), Ok(ProductSort::CreatedAt));
        assert!("DROP TABLE".parse::<ProductSort>().is_err());
    }
}
