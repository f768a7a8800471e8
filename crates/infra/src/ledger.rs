//! Stock Ledger Engine.
//!
//! Every stock change goes through [`StockLedger::apply_movement`], which runs as one
//! explicit unit of work:
//!
//! ```text
//! MovementRequest (already validated: action, quantity)
//!   ↓
//! 1. begin transaction
//!   ↓
//! 2. lock product row (missing/tombstoned → ProductNotFound)
//!   ↓
//! 3. transition guard: StockAction::apply(previous, quantity)
//!   ↓
//! 4. write new stock + record actor + append ledger entry
//!   ↓
//! 5. commit (any failure above → rollback, nothing persisted)
//! ```
//!
//! The whole transaction, lock wait included, is bounded by the configured timeout. On
//! expiry the in-flight transaction is dropped (which rolls it back) and the caller sees
//! `TransactionTimeout`.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use stockledger_core::ProductId;
use stockledger_inventory::{
    ActorRef, InventoryLogEntry, LogEntryDetails, MovementRequest, NewProduct, Product, ProductPatch,
    ProductRef,
};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::store::{StockStore, StockTransaction};

#[derive(Debug, Clone)]
pub struct StockLedger<S> {
    store: S,
    timeout: Duration,
}

impl<S: StockStore> StockLedger<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        Self::with_timeout(store, config.transaction_timeout())
    }

    pub fn with_timeout(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply one stock movement atomically and return the enriched ledger entry.
    #[instrument(
        skip(self, request, actor),
        fields(
            product_id = %request.product_id,
            action = %request.action,
            quantity = request.quantity,
            actor_id = %actor.id
        )
    )]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
        actor: &ActorRef,
    ) -> Result<LogEntryDetails, LedgerError> {
        let result = self
            .bounded(async {
                let mut tx = self.store.begin().await?;
                let outcome = movement(&mut tx, &request, actor).await;
                finish(tx, outcome).await
            })
            .await;

        match &result {
            Ok(details) => info!(
                previous_stock = details.entry.previous_stock,
                new_stock = details.entry.new_stock,
                "stock movement committed"
            ),
            Err(err) => record_failure("apply_movement", err),
        }
        result
    }

    /// Create a product. Initial stock is recorded as a synthetic `Add` entry in the same
    /// transaction, so the ledger replays to the product's stock from its first entry.
    #[instrument(skip(self, input, actor), fields(sku = %input.sku, actor_id = %actor.id))]
    pub async fn create_product(
        &self,
        input: NewProduct,
        actor: &ActorRef,
    ) -> Result<Product, LedgerError> {
        let product = match input.into_product(ProductId::new(), Utc::now()) {
            Ok(product) => product,
            Err(err) => {
                let err = LedgerError::from(err);
                record_failure("create_product", &err);
                return Err(err);
            }
        };

        let result = self
            .bounded(async {
                let mut tx = self.store.begin().await?;
                let outcome = insert(&mut tx, &product, actor).await;
                finish(tx, outcome).await
            })
            .await;

        match result {
            Ok(()) => {
                info!(product_id = %product.id, stock = product.stock, "product created");
                Ok(product)
            }
            Err(err) => {
                record_failure("create_product", &err);
                Err(err)
            }
        }
    }

    /// Edit descriptive fields, threshold and price. Stock is untouched.
    #[instrument(skip(self, patch), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, LedgerError> {
        let result = self
            .bounded(async {
                let mut tx = self.store.begin().await?;
                let outcome = patch_product(&mut tx, id, patch).await;
                finish(tx, outcome).await
            })
            .await;

        match &result {
            Ok(_) => info!("product updated"),
            Err(err) => record_failure("update_product", err),
        }
        result
    }

    /// Tombstone a product. Its ledger entries stay in place.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), LedgerError> {
        let result = self
            .bounded(async {
                let mut tx = self.store.begin().await?;
                let outcome = tombstone(&mut tx, id).await;
                finish(tx, outcome).await
            })
            .await;

        match &result {
            Ok(()) => info!("product deleted"),
            Err(err) => record_failure("delete_product", err),
        }
        result
    }

    async fn bounded<T>(
        &self,
        work: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| LedgerError::TransactionTimeout(timeout_ms(self.timeout)))?
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

async fn movement<T: StockTransaction>(
    tx: &mut T,
    request: &MovementRequest,
    actor: &ActorRef,
) -> Result<LogEntryDetails, LedgerError> {
    let product = tx
        .lock_product(request.product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound(request.product_id))?;

    let previous_stock = product.stock;
    let new_stock = request.action.apply(previous_stock, request.quantity)?;

    // Entries for one product must never go backwards in time, even if the clock does.
    let at = Utc::now().max(product.updated_at);

    tx.write_stock(product.id, new_stock, at).await?;
    tx.upsert_actor(actor).await?;
    let entry = InventoryLogEntry::record(request, actor.id, previous_stock, new_stock, at);
    tx.append_log(&entry).await?;

    Ok(LogEntryDetails {
        entry,
        product: ProductRef::from(&product),
        actor: actor.clone(),
    })
}

async fn insert<T: StockTransaction>(
    tx: &mut T,
    product: &Product,
    actor: &ActorRef,
) -> Result<(), LedgerError> {
    if let Some(duplicate) = tx
        .find_duplicate(&product.sku, product.barcode.as_deref(), None)
        .await?
    {
        return Err(LedgerError::DuplicateProduct(duplicate));
    }

    tx.insert_product(product).await?;
    if product.stock > 0 {
        tx.upsert_actor(actor).await?;
        tx.append_log(&InventoryLogEntry::initial_stock(product, actor.id))
            .await?;
    }
    Ok(())
}

async fn patch_product<T: StockTransaction>(
    tx: &mut T,
    id: ProductId,
    patch: ProductPatch,
) -> Result<Product, LedgerError> {
    let mut product = tx
        .lock_product(id)
        .await?
        .ok_or(LedgerError::ProductNotFound(id))?;

    let now = Utc::now().max(product.updated_at);
    product.apply_patch(patch, now)?;

    if let Some(duplicate) = tx
        .find_duplicate(&product.sku, product.barcode.as_deref(), Some(id))
        .await?
    {
        return Err(LedgerError::DuplicateProduct(duplicate));
    }

    tx.update_product(&product).await?;
    Ok(product)
}

async fn tombstone<T: StockTransaction>(tx: &mut T, id: ProductId) -> Result<(), LedgerError> {
    let mut product = tx
        .lock_product(id)
        .await?
        .ok_or(LedgerError::ProductNotFound(id))?;

    let now = Utc::now().max(product.updated_at);
    product.deleted_at = Some(now);
    product.updated_at = now;
    tx.update_product(&product).await?;
    Ok(())
}

/// Commit on success, roll back on failure. The original failure wins over a failed
/// rollback.
async fn finish<T, X: StockTransaction>(
    tx: X,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

fn record_failure(operation: &'static str, err: &LedgerError) {
    if err.is_expected() {
        warn!(operation, error = %err, "ledger operation rejected");
    } else {
        error!(operation, error = %err, "ledger operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use stockledger_core::UserId;
    use stockledger_inventory::{StockAction, StockStatus};

    use crate::store::{InMemoryStockStore, LogFilter, Pagination};

    fn ledger() -> StockLedger<InMemoryStockStore> {
        StockLedger::with_timeout(InMemoryStockStore::new(), Duration::from_secs(5))
    }

    fn alice() -> ActorRef {
        ActorRef::new(UserId::new(), "alice")
    }

    fn widget(sku: &str, stock: i64) -> NewProduct {
        NewProduct {
            sku: sku.to_string(),
            name: format!("Widget {sku}"),
            category: "Hardware".to_string(),
            stock: Some(stock),
            threshold: Some(10),
            price: Some(Decimal::new(250, 2)),
            ..Default::default()
        }
    }

    fn movement(product: &Product, action: StockAction, quantity: i64) -> MovementRequest {
        MovementRequest::new(product.id, action, quantity, None).unwrap()
    }

    async fn ledger_count(ledger: &StockLedger<InMemoryStockStore>, id: ProductId) -> u64 {
        ledger
            .store()
            .query_logs(&LogFilter::for_product(id), Pagination::default())
            .await
            .unwrap()
            .total
    }

    async fn stock_of(ledger: &StockLedger<InMemoryStockStore>, id: ProductId) -> u32 {
        ledger.store().get_product(id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn add_remove_update_scenario() {
        let ledger = ledger();
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 50), &actor).await.unwrap();

        let added = ledger
            .apply_movement(movement(&product, StockAction::Add, 20), &actor)
            .await
            .unwrap();
        assert_eq!(added.entry.previous_stock, 50);
        assert_eq!(added.entry.new_stock, 70);
        assert_eq!(added.product.sku, "SKU-1");
        assert_eq!(added.actor.username, "alice");

        let before = ledger_count(&ledger, product.id).await;
        let err = ledger
            .apply_movement(movement(&product, StockAction::Remove, 80), &actor)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                current_stock: 70,
                requested_quantity: 80
            }
        );
        assert_eq!(stock_of(&ledger, product.id).await, 70);
        assert_eq!(ledger_count(&ledger, product.id).await, before);

        let updated = ledger
            .apply_movement(movement(&product, StockAction::Update, 5), &actor)
            .await
            .unwrap();
        assert_eq!(updated.entry.previous_stock, 70);
        assert_eq!(updated.entry.new_stock, 5);

        let current = ledger.store().get_product(product.id).await.unwrap().unwrap();
        assert_eq!(current.stock, 5);
        assert_eq!(current.status(), StockStatus::LowStock);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_removes_cannot_oversell() {
        let ledger = Arc::new(ledger());
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 40), &actor).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = ledger.clone();
            let actor = actor.clone();
            let request = movement(&product, StockAction::Remove, 30);
            handles.push(tokio::spawn(async move {
                ledger.apply_movement(request, &actor).await
            }));
        }

        let mut successes = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::InsufficientStock { current_stock, .. }) => {
                    assert_eq!(current_stock, 10);
                    insufficient += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!((successes, insufficient), (1, 1));
        assert_eq!(stock_of(&ledger, product.id).await, 10);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let ledger = ledger();
        let id = ProductId::new();
        let request = MovementRequest::new(id, StockAction::Add, 1, None).unwrap();
        let err = ledger.apply_movement(request, &alice()).await.unwrap_err();
        assert_eq!(err, LedgerError::ProductNotFound(id));
    }

    #[tokio::test]
    async fn update_to_zero_empties_stock() {
        let ledger = ledger();
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 12), &actor).await.unwrap();

        let details = ledger
            .apply_movement(movement(&product, StockAction::Update, 0), &actor)
            .await
            .unwrap();
        assert_eq!(details.entry.new_stock, 0);

        let current = ledger.store().get_product(product.id).await.unwrap().unwrap();
        assert_eq!(current.status(), StockStatus::OutOfStock);
    }

    #[tokio::test]
    async fn initial_stock_is_logged_with_creation() {
        let ledger = ledger();
        let actor = alice();
        let stocked = ledger.create_product(widget("SKU-1", 25), &actor).await.unwrap();
        let empty = ledger.create_product(widget("SKU-2", 0), &actor).await.unwrap();

        let entries = ledger
            .store()
            .ledger_entries(&LogFilter::for_product(stocked.id))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry.action, StockAction::Add);
        assert_eq!(entries[0].entry.previous_stock, 0);
        assert_eq!(entries[0].entry.new_stock, 25);
        assert_eq!(entries[0].entry.notes.as_deref(), Some("Initial stock"));

        assert_eq!(ledger_count(&ledger, empty.id).await, 0);
    }

    #[tokio::test]
    async fn duplicate_sku_and_barcode_are_rejected() {
        let ledger = ledger();
        let actor = alice();
        ledger
            .create_product(
                NewProduct {
                    barcode: Some("0001".into()),
                    ..widget("SKU-1", 0)
                },
                &actor,
            )
            .await
            .unwrap();

        let err = ledger.create_product(widget("SKU-1", 0), &actor).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateProduct(ref what) if what.contains("sku")));

        let err = ledger
            .create_product(
                NewProduct {
                    barcode: Some("0001".into()),
                    ..widget("SKU-2", 0)
                },
                &actor,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateProduct(ref what) if what.contains("barcode")));
    }

    #[tokio::test]
    async fn invalid_product_input_is_validation_error() {
        let ledger = ledger();
        let err = ledger
            .create_product(
                NewProduct {
                    threshold: Some(0),
                    ..widget("SKU-1", 0)
                },
                &alice(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn patch_keeps_stock_and_rejects_taken_sku() {
        let ledger = ledger();
        let actor = alice();
        let a = ledger.create_product(widget("SKU-A", 30), &actor).await.unwrap();
        ledger.create_product(widget("SKU-B", 0), &actor).await.unwrap();

        let patched = ledger
            .update_product(
                a.id,
                ProductPatch {
                    name: Some("Renamed".into()),
                    threshold: Some(40),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.stock, 30);
        assert_eq!(stock_of(&ledger, a.id).await, 30);
        assert_eq!(patched.status(), StockStatus::LowStock);

        let err = ledger
            .update_product(
                a.id,
                ProductPatch {
                    sku: Some("SKU-B".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateProduct(_)));
    }

    #[tokio::test]
    async fn deleted_product_rejects_movements_but_keeps_ledger() {
        let ledger = ledger();
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 5), &actor).await.unwrap();

        ledger.delete_product(product.id).await.unwrap();
        assert!(ledger.store().get_product(product.id).await.unwrap().is_none());

        let err = ledger
            .apply_movement(movement(&product, StockAction::Add, 1), &actor)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::ProductNotFound(product.id));

        let err = ledger.delete_product(product.id).await.unwrap_err();
        assert_eq!(err, LedgerError::ProductNotFound(product.id));

        let entries = ledger
            .store()
            .ledger_entries(&LogFilter::for_product(product.id))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].product.sku, "SKU-1");
    }

    #[tokio::test]
    async fn lock_contention_times_out_without_writes() {
        let store = InMemoryStockStore::new();
        let ledger = StockLedger::with_timeout(store.clone(), Duration::from_millis(50));
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 10), &actor).await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_product(product.id).await.unwrap();

        let err = ledger
            .apply_movement(movement(&product, StockAction::Add, 5), &actor)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::TransactionTimeout(50));
        assert!(!err.is_expected());

        holder.rollback().await.unwrap();
        assert_eq!(stock_of(&ledger, product.id).await, 10);
        assert_eq!(ledger_count(&ledger, product.id).await, 1);

        ledger
            .apply_movement(movement(&product, StockAction::Add, 5), &actor)
            .await
            .unwrap();
        assert_eq!(stock_of(&ledger, product.id).await, 15);
    }

    #[tokio::test]
    async fn outage_surfaces_storage_unavailable() {
        let store = InMemoryStockStore::new();
        let ledger = StockLedger::with_timeout(store.clone(), Duration::from_secs(1));
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 10), &actor).await.unwrap();

        store.set_offline(true);
        let err = ledger
            .apply_movement(movement(&product, StockAction::Add, 5), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StorageUnavailable(_)));

        store.set_offline(false);
        assert_eq!(stock_of(&ledger, product.id).await, 10);
    }

    #[tokio::test]
    async fn ledger_entries_stay_time_ordered() {
        let ledger = ledger();
        let actor = alice();
        let product = ledger.create_product(widget("SKU-1", 1), &actor).await.unwrap();
        for _ in 0..20 {
            ledger
                .apply_movement(movement(&product, StockAction::Add, 1), &actor)
                .await
                .unwrap();
        }

        let entries = ledger
            .store()
            .ledger_entries(&LogFilter::for_product(product.id))
            .await
            .unwrap();
        let log: Vec<InventoryLogEntry> = entries.into_iter().map(|d| d.entry).collect();
        assert_eq!(
            stockledger_inventory::replay_stock(&log).unwrap(),
            Some(stock_of(&ledger, product.id).await)
        );
    }
}
