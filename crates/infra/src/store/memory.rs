use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use stockledger_core::{ProductId, UserId};
use stockledger_inventory::{ActorRef, InventoryLogEntry, LogEntryDetails, Product, ProductRef};

use super::{
    InventorySnapshot, LogFilter, LogPage, Pagination, ProductFilter, ProductSort, StockStore,
    StockTransaction, StoreError,
};

#[derive(Debug, Default)]
struct Committed {
    products: HashMap<ProductId, Product>,
    logs: Vec<InventoryLogEntry>,
    actors: HashMap<UserId, ActorRef>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<Committed>,
    row_locks: Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>,
    offline: AtomicBool,
}

/// In-memory products + ledger store.
///
/// Intended for tests/dev. Each product has its own async mutex standing in for a row
/// lock; transactions stage their writes and apply them under one write lock on commit,
/// so readers never observe a half-applied movement.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while offline every operation fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        ensure_online(&self.shared)
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.shared.row_locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Committed>, StoreError> {
        self.ensure_online()?;
        self.shared
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn ensure_online(shared: &Shared) -> Result<(), StoreError> {
    if shared.offline.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
    }
    Ok(())
}

fn enrich(state: &Committed, entry: &InventoryLogEntry) -> LogEntryDetails {
    let product = state
        .products
        .get(&entry.product_id)
        .map(ProductRef::from)
        .unwrap_or_else(|| ProductRef {
            id: entry.product_id,
            name: String::new(),
            sku: String::new(),
        });
    let actor = state
        .actors
        .get(&entry.actor_id)
        .cloned()
        .unwrap_or_else(|| ActorRef::new(entry.actor_id, ""));

    LogEntryDetails {
        entry: entry.clone(),
        product,
        actor,
    }
}

fn duplicate_of(
    products: &HashMap<ProductId, Product>,
    sku: &str,
    barcode: Option<&str>,
    exclude: Option<ProductId>,
) -> Option<String> {
    let live = products
        .values()
        .filter(|p| !p.is_deleted() && Some(p.id) != exclude);

    for p in live {
        if p.sku == sku {
            return Some(format!("sku '{sku}'"));
        }
        if let (Some(b), Some(existing)) = (barcode, p.barcode.as_deref()) {
            if b == existing {
                return Some(format!("barcode '{b}'"));
            }
        }
    }
    None
}

#[derive(Debug)]
enum Staged {
    InsertProduct(Product),
    UpdateProduct(Product),
    WriteStock {
        id: ProductId,
        stock: u32,
        at: DateTime<Utc>,
    },
    Actor(ActorRef),
    Log(InventoryLogEntry),
}

/// Unit of work over an [`InMemoryStockStore`].
///
/// Row locks are released when the transaction is committed, rolled back, or dropped.
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    staged: Vec<Staged>,
}

impl InMemoryTransaction {
    /// Committed product overlaid with this transaction's staged writes.
    fn view(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self
            .shared
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let mut product = state.products.get(&id).cloned();

        for write in &self.staged {
            match write {
                Staged::InsertProduct(p) | Staged::UpdateProduct(p) if p.id == id => {
                    let stock = product.as_ref().map(|cur| cur.stock).unwrap_or(p.stock);
                    let mut next = p.clone();
                    if matches!(write, Staged::UpdateProduct(_)) {
                        next.stock = stock;
                    }
                    product = Some(next);
                }
                Staged::WriteStock { id: sid, stock, at } if *sid == id => {
                    if let Some(p) = product.as_mut() {
                        p.stock = *stock;
                        p.updated_at = *at;
                    }
                }
                _ => {}
            }
        }

        Ok(product.filter(|p| !p.is_deleted()))
    }

    fn row_lock(&self, id: ProductId) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut locks = self
            .shared
            .row_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(locks.entry(id).or_default().clone())
    }

    /// Drop held row locks and forget the ones nobody else is holding or waiting on.
    fn release_locks(&mut self) {
        if self.guards.is_empty() {
            return;
        }
        let held: Vec<ProductId> = self.guards.keys().copied().collect();
        self.guards.clear();

        let Ok(mut locks) = self.shared.row_locks.lock() else {
            return;
        };
        for id in held {
            if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&id);
            }
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        ensure_online(&self.shared)?;
        if !self.guards.contains_key(&id) {
            let lock = self.row_lock(id)?;
            let guard = lock.lock_owned().await;
            self.guards.insert(id, guard);
        }
        self.view(id)
    }

    async fn find_duplicate(
        &mut self,
        sku: &str,
        barcode: Option<&str>,
        exclude: Option<ProductId>,
    ) -> Result<Option<String>, StoreError> {
        ensure_online(&self.shared)?;
        let state = self
            .shared
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(duplicate_of(&state.products, sku, barcode, exclude))
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        ensure_online(&self.shared)?;
        self.staged.push(Staged::InsertProduct(product.clone()));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        ensure_online(&self.shared)?;
        self.staged.push(Staged::UpdateProduct(product.clone()));
        Ok(())
    }

    async fn write_stock(
        &mut self,
        id: ProductId,
        stock: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        ensure_online(&self.shared)?;
        if !self.guards.contains_key(&id) {
            return Err(StoreError::Unavailable(format!(
                "stock write for product {id} without holding its row lock"
            )));
        }
        self.staged.push(Staged::WriteStock { id, stock, at });
        Ok(())
    }

    async fn upsert_actor(&mut self, actor: &ActorRef) -> Result<(), StoreError> {
        ensure_online(&self.shared)?;
        self.staged.push(Staged::Actor(actor.clone()));
        Ok(())
    }

    async fn append_log(&mut self, entry: &InventoryLogEntry) -> Result<(), StoreError> {
        ensure_online(&self.shared)?;
        self.staged.push(Staged::Log(entry.clone()));
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        ensure_online(&self.shared)?;
        let staged = std::mem::take(&mut self.staged);
        let mut state = self
            .shared
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        // Uniqueness is checked against committed state at commit time, the way a
        // database unique index would reject a racing insert.
        let mut products = state.products.clone();
        for write in &staged {
            match write {
                Staged::InsertProduct(p) => {
                    if let Some(dup) = duplicate_of(&products, &p.sku, p.barcode.as_deref(), None) {
                        return Err(StoreError::Conflict(dup));
                    }
                    products.insert(p.id, p.clone());
                }
                Staged::UpdateProduct(p) => {
                    if !p.is_deleted() {
                        if let Some(dup) =
                            duplicate_of(&products, &p.sku, p.barcode.as_deref(), Some(p.id))
                        {
                            return Err(StoreError::Conflict(dup));
                        }
                    }
                    let stock = products.get(&p.id).map(|cur| cur.stock).unwrap_or(p.stock);
                    let mut next = p.clone();
                    next.stock = stock;
                    products.insert(p.id, next);
                }
                Staged::WriteStock { id, stock, at } => {
                    let p = products.get_mut(id).ok_or_else(|| {
                        StoreError::Unavailable(format!("stock write for unknown product {id}"))
                    })?;
                    p.stock = *stock;
                    p.updated_at = *at;
                }
                Staged::Actor(_) | Staged::Log(_) => {}
            }
        }

        state.products = products;
        for write in staged {
            match write {
                Staged::Actor(actor) => {
                    state.actors.insert(actor.id, actor);
                }
                Staged::Log(entry) => state.logs.push(entry),
                _ => {}
            }
        }

        drop(state);
        self.release_locks();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.staged.clear();
        self.release_locks();
        Ok(())
    }
}

fn sort_products(products: &mut [Product], sort: Option<ProductSort>, descending: bool) {
    match sort {
        Some(ProductSort::Name) => products.sort_by(|a, b| a.name.cmp(&b.name)),
        Some(ProductSort::Sku) => products.sort_by(|a, b| a.sku.cmp(&b.sku)),
        Some(ProductSort::Category) => products.sort_by(|a, b| a.category.cmp(&b.category)),
        Some(ProductSort::Stock) => products.sort_by_key(|p| p.stock),
        Some(ProductSort::Price) => products.sort_by_key(|p| p.price),
        Some(ProductSort::CreatedAt) | None => products.sort_by_key(|p| (p.created_at, p.id)),
    }
    if descending {
        products.reverse();
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.ensure_online()?;
        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            staged: Vec::new(),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self.read()?;
        Ok(state.products.get(&id).filter(|p| !p.is_deleted()).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let state = self.read()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        sort_products(&mut products, filter.sort, filter.descending);
        Ok(products)
    }

    async fn categories(&self) -> Result<Vec<String>, StoreError> {
        let state = self.read()?;
        let mut categories: Vec<String> = state
            .products
            .values()
            .filter(|p| !p.is_deleted())
            .map(|p| p.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn query_logs(&self, filter: &LogFilter, page: Pagination) -> Result<LogPage, StoreError> {
        let state = self.read()?;
        let mut matching: Vec<&InventoryLogEntry> =
            state.logs.iter().filter(|e| filter.matches(e)).collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = matching.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let entries = matching
            .into_iter()
            .skip(offset)
            .take(page.page_size as usize)
            .map(|e| enrich(&state, e))
            .collect();

        Ok(LogPage { entries, total })
    }

    async fn ledger_entries(&self, filter: &LogFilter) -> Result<Vec<LogEntryDetails>, StoreError> {
        let state = self.read()?;
        let mut matching: Vec<&InventoryLogEntry> =
            state.logs.iter().filter(|e| filter.matches(e)).collect();
        matching.sort_by_key(|e| (e.created_at, e.id));
        Ok(matching.into_iter().map(|e| enrich(&state, e)).collect())
    }

    async fn inventory_snapshot(&self, recent: u32) -> Result<InventorySnapshot, StoreError> {
        let state = self.read()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| !p.is_deleted())
            .cloned()
            .collect();
        sort_products(&mut products, None, false);

        let mut logs: Vec<&InventoryLogEntry> = state.logs.iter().collect();
        logs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let recent = logs
            .into_iter()
            .take(recent as usize)
            .map(|e| enrich(&state, e))
            .collect();

        Ok(InventorySnapshot { products, recent })
    }
}
