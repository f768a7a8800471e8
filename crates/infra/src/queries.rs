//! Stock Query/Derivation Layer.
//!
//! Read-only views over committed product and ledger state. Nothing here retries: a
//! storage failure is logged and surfaced as `StorageUnavailable`.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use stockledger_core::ProductId;
use stockledger_inventory::{
    replay_stock, total_stock_value, InventoryLogEntry, LogEntryDetails, Product, StockStatus,
};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::store::{LogFilter, Pagination, ProductFilter, StockStore, StoreError};

/// Size of the recent-activity feed in [`InventoryStats`].
pub const RECENT_ACTIVITY_LIMIT: u32 = 5;

/// One page of `listMovements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub logs: Vec<LogEntryDetails>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}

/// A product in the low-stock listing with its criticality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowStockProduct {
    #[serde(flatten)]
    pub product: Product,
    pub ratio: f64,
    pub status: StockStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub total_products: u64,
    pub stock_value: Decimal,
    pub low_stock_count: u64,
    pub out_of_stock_count: u64,
    pub recent_activity: Vec<LogEntryDetails>,
}

/// Result of replaying one product's ledger against its stored stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    pub product_id: ProductId,
    pub current_stock: u32,
    /// `None` when the product has no ledger entries yet.
    pub replayed_stock: Option<u32>,
    pub entries: usize,
    pub consistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StockQueries<S> {
    store: S,
    default_page_size: u32,
    max_page_size: u32,
}

impl<S: StockStore> StockQueries<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        Self {
            store,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Clamp caller paging input against the configured limits.
    pub fn pagination(&self, page: Option<u32>, page_size: Option<u32>) -> Pagination {
        Pagination::new(page, page_size, self.default_page_size, self.max_page_size)
    }

    /// Filtered ledger page, most recent first.
    #[instrument(skip(self), err)]
    pub async fn list_movements(
        &self,
        filter: &LogFilter,
        page: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(LedgerError::Validation(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        let found = self
            .store
            .query_logs(filter, page)
            .await
            .map_err(|e| unavailable("list_movements", e))?;

        Ok(MovementPage {
            logs: found.entries,
            page: page.page,
            pages: page.page_count(found.total),
            total: found.total,
        })
    }

    /// Products at or under their reorder point, most critical first.
    #[instrument(skip(self), err)]
    pub async fn list_low_stock(&self) -> Result<Vec<LowStockProduct>, LedgerError> {
        let products = self
            .store
            .list_products(&ProductFilter::low_stock())
            .await
            .map_err(|e| unavailable("list_low_stock", e))?;

        let mut low: Vec<LowStockProduct> = products
            .into_iter()
            .map(|product| LowStockProduct {
                ratio: product.stock_ratio(),
                status: product.status(),
                product,
            })
            .collect();
        low.sort_by(|a, b| match a.ratio.total_cmp(&b.ratio) {
            Ordering::Equal => a.product.sku.cmp(&b.product.sku),
            other => other,
        });
        Ok(low)
    }

    /// Dashboard totals. Product counts and the activity feed come from one snapshot, so
    /// a movement committed mid-call shows up in both or in neither.
    #[instrument(skip(self), err)]
    pub async fn compute_stats(&self) -> Result<InventoryStats, LedgerError> {
        let snapshot = self
            .store
            .inventory_snapshot(RECENT_ACTIVITY_LIMIT)
            .await
            .map_err(|e| unavailable("compute_stats", e))?;
        let products = &snapshot.products;

        let stock_value = total_stock_value(products).ok_or_else(|| value_overflow("compute_stats"))?;
        let low_stock_count = products.iter().filter(|p| p.is_low_stock()).count() as u64;
        let out_of_stock_count = products.iter().filter(|p| p.stock == 0).count() as u64;

        Ok(InventoryStats {
            total_products: products.len() as u64,
            stock_value,
            low_stock_count,
            out_of_stock_count,
            recent_activity: snapshot.recent,
        })
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, LedgerError> {
        self.store
            .get_product(id)
            .await
            .map_err(|e| unavailable("get_product", e))?
            .ok_or(LedgerError::ProductNotFound(id))
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, LedgerError> {
        self.store
            .list_products(filter)
            .await
            .map_err(|e| unavailable("list_products", e))
    }

    pub async fn categories(&self) -> Result<Vec<String>, LedgerError> {
        self.store
            .categories()
            .await
            .map_err(|e| unavailable("categories", e))
    }

    /// Replay a product's ledger and compare it with the stored stock.
    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn audit_product(&self, id: ProductId) -> Result<LedgerAudit, LedgerError> {
        let product = self.get_product(id).await?;
        let entries = self
            .store
            .ledger_entries(&LogFilter::for_product(id))
            .await
            .map_err(|e| unavailable("audit_product", e))?;
        let log: Vec<InventoryLogEntry> = entries.into_iter().map(|d| d.entry).collect();

        let (replayed_stock, problem) = match replay_stock(&log) {
            Ok(replayed) => (replayed, None),
            Err(err) => (None, Some(err.to_string())),
        };
        let consistent = problem.is_none() && replayed_stock.unwrap_or(product.stock) == product.stock;

        Ok(LedgerAudit {
            product_id: id,
            current_stock: product.stock,
            replayed_stock,
            entries: log.len(),
            consistent,
            problem,
        })
    }
}

pub(crate) fn unavailable(operation: &'static str, err: StoreError) -> LedgerError {
    error!(operation, error = %err, "stock query failed");
    LedgerError::StorageUnavailable(err.to_string())
}

pub(crate) fn value_overflow(operation: &'static str) -> LedgerError {
    error!(operation, "stock value overflowed");
    LedgerError::Validation("inventory value exceeds the representable range".to_string())
}
