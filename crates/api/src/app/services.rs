//! Storage backend selection and the service facade handed to handlers.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stockledger_core::ProductId;
use stockledger_infra::{
    AppConfig, ExpiryReport, InMemoryStockStore, InventoryStats, LedgerAudit, LedgerError, LogFilter,
    LowStockProduct, MovementPage, MovementReport, Pagination, PostgresStockStore, ProductFilter,
    StockLedger, StockQueries, StockStore, ValueReport,
};
use stockledger_infra::config::LedgerConfig;
use stockledger_inventory::{
    ActorRef, LogEntryDetails, MovementRequest, NewProduct, Product, ProductPatch,
};

/// Engine + query facade over one store.
#[derive(Debug, Clone)]
pub struct Backend<S> {
    pub ledger: StockLedger<S>,
    pub queries: StockQueries<S>,
}

impl<S: StockStore + Clone> Backend<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        Self {
            ledger: StockLedger::new(store.clone(), config),
            queries: StockQueries::new(store, config),
        }
    }
}

#[derive(Debug)]
pub enum AppServices {
    InMemory(Backend<InMemoryStockStore>),
    Postgres(Backend<PostgresStockStore>),
}

macro_rules! on_backend {
    ($services:expr, $backend:ident => $body:expr) => {
        match $services {
            AppServices::InMemory($backend) => $body,
            AppServices::Postgres($backend) => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(store: InMemoryStockStore, config: &LedgerConfig) -> Self {
        AppServices::InMemory(Backend::new(store, config))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            AppServices::InMemory(_) => "memory",
            AppServices::Postgres(_) => "postgres",
        }
    }

    pub async fn health_check(&self) -> Result<(), LedgerError> {
        on_backend!(self, b => b.queries.store().health_check().await.map_err(LedgerError::from))
    }

    pub async fn apply_movement(
        &self,
        request: MovementRequest,
        actor: &ActorRef,
    ) -> Result<LogEntryDetails, LedgerError> {
        on_backend!(self, b => b.ledger.apply_movement(request, actor).await)
    }

    pub async fn create_product(
        &self,
        input: NewProduct,
        actor: &ActorRef,
    ) -> Result<Product, LedgerError> {
        on_backend!(self, b => b.ledger.create_product(input, actor).await)
    }

    pub async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, LedgerError> {
        on_backend!(self, b => b.ledger.update_product(id, patch).await)
    }

    pub async fn delete_product(&self, id: ProductId) -> Result<(), LedgerError> {
        on_backend!(self, b => b.ledger.delete_product(id).await)
    }

    pub fn pagination(&self, page: Option<u32>, page_size: Option<u32>) -> Pagination {
        on_backend!(self, b => b.queries.pagination(page, page_size))
    }

    pub async fn list_movements(
        &self,
        filter: &LogFilter,
        page: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        on_backend!(self, b => b.queries.list_movements(filter, page).await)
    }

    pub async fn list_low_stock(&self) -> Result<Vec<LowStockProduct>, LedgerError> {
        on_backend!(self, b => b.queries.list_low_stock().await)
    }

    pub async fn compute_stats(&self) -> Result<InventoryStats, LedgerError> {
        on_backend!(self, b => b.queries.compute_stats().await)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, LedgerError> {
        on_backend!(self, b => b.queries.get_product(id).await)
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, LedgerError> {
        on_backend!(self, b => b.queries.list_products(filter).await)
    }

    pub async fn categories(&self) -> Result<Vec<String>, LedgerError> {
        on_backend!(self, b => b.queries.categories().await)
    }

    pub async fn audit_product(&self, id: ProductId) -> Result<LedgerAudit, LedgerError> {
        on_backend!(self, b => b.queries.audit_product(id).await)
    }

    pub async fn stock_movement_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MovementReport, LedgerError> {
        on_backend!(self, b => b.queries.stock_movement_report(start, end).await)
    }

    pub async fn inventory_value_report(&self) -> Result<ValueReport, LedgerError> {
        on_backend!(self, b => b.queries.inventory_value_report().await)
    }

    pub async fn low_stock_report(&self) -> Result<Vec<LowStockProduct>, LedgerError> {
        on_backend!(self, b => b.queries.low_stock_report().await)
    }

    pub async fn expiry_report(&self, now: DateTime<Utc>) -> Result<ExpiryReport, LedgerError> {
        on_backend!(self, b => b.queries.expiry_report(now).await)
    }
}

/// Pick the storage backend: Postgres when `database.url` is set, otherwise in-memory.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    if config.database.url.is_none() {
        warn!("database.url not set; using the in-memory store (state is lost on restart)");
        return Ok(AppServices::in_memory(InMemoryStockStore::new(), &config.ledger));
    }

    let store = PostgresStockStore::connect(&config.database).await?;
    if config.database.run_migrations {
        store.migrate().await?;
    }
    info!("postgres store ready");

    Ok(AppServices::Postgres(Backend::new(store, &config.ledger)))
}
