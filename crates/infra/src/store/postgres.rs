//! Postgres-backed products + ledger store.
//!
//! Row locks are real `SELECT ... FOR UPDATE` locks taken inside a `sqlx` transaction,
//! so two movements on the same product serialize in the database while movements on
//! different products proceed in parallel. Dropping a [`PostgresTransaction`] without
//! committing rolls it back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Unavailable` |
//! | PoolClosed / Io / Tls / PoolTimedOut | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, QueryBuilder, Row, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use stockledger_core::{LogEntryId, ProductId, UserId};
use stockledger_inventory::{ActorRef, InventoryLogEntry, LogEntryDetails, Product, ProductRef, StockAction};

use super::{
    InventorySnapshot, LogFilter, LogPage, Pagination, ProductFilter, ProductSort, StockStore,
    StockTransaction, StoreError,
};
use crate::config::DatabaseConfig;

const PRODUCT_COLUMNS: &str = "id, sku, name, category, description, barcode, image_url, \
     stock, threshold, price, expiry_date, created_at, updated_at, deleted_at";

const LOG_DETAILS_SELECT: &str = "SELECT l.id, l.product_id, l.user_id, l.action, l.quantity, \
     l.previous_stock, l.new_stock, l.notes, l.created_at, \
     p.name AS product_name, p.sku AS product_sku, a.username \
     FROM inventory_logs l \
     JOIN products p ON p.id = l.product_id \
     LEFT JOIN actors a ON a.id = l.user_id";

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("database.url is not configured".to_string()))?;

        info!(max_connections = config.max_connections, "connecting to postgres");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        Ok(())
    }
}

/// Unit of work backed by a Postgres transaction.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?;

        row.map(|r| decode_product(&r)).transpose()
    }

    async fn find_duplicate(
        &mut self,
        sku: &str,
        barcode: Option<&str>,
        exclude: Option<ProductId>,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT sku, barcode
            FROM products
            WHERE deleted_at IS NULL
              AND ($3::uuid IS NULL OR id <> $3)
              AND (sku = $1 OR ($2::text IS NOT NULL AND barcode = $2))
            LIMIT 1
            "#,
        )
        .bind(sku)
        .bind(barcode)
        .bind(exclude.map(|id| *id.as_uuid()))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_duplicate", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let existing_sku: String = row.try_get("sku").map_err(|e| map_sqlx_error("find_duplicate", e))?;
        if existing_sku == sku {
            return Ok(Some(format!("sku '{sku}'")));
        }
        Ok(barcode.map(|b| format!("barcode '{b}'")))
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, category, description, barcode, image_url,
                stock, threshold, price, expiry_date, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(*product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.description)
        .bind(&product.barcode)
        .bind(&product.image_url)
        .bind(i64::from(product.stock))
        .bind(i64::from(product.threshold))
        .bind(product.price)
        .bind(product.expiry_date)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE products SET
                sku = $2, name = $3, category = $4, description = $5, barcode = $6,
                image_url = $7, threshold = $8, price = $9, expiry_date = $10,
                updated_at = $11, deleted_at = $12
            WHERE id = $1
            "#,
        )
        .bind(*product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.description)
        .bind(&product.barcode)
        .bind(&product.image_url)
        .bind(i64::from(product.threshold))
        .bind(product.price)
        .bind(product.expiry_date)
        .bind(product.updated_at)
        .bind(product.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(())
    }

    async fn write_stock(
        &mut self,
        id: ProductId,
        stock: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE products SET stock = $2, updated_at = $3 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(i64::from(stock))
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_stock", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Unavailable(format!(
                "stock write for product {id} affected {} rows",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn upsert_actor(&mut self, actor: &ActorRef) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO actors (id, username, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (id) DO UPDATE
                SET username = EXCLUDED.username, updated_at = now()
            "#,
        )
        .bind(*actor.id.as_uuid())
        .bind(&actor.username)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_actor", e))?;
        Ok(())
    }

    async fn append_log(&mut self, entry: &InventoryLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_logs (
                id, product_id, user_id, action, quantity,
                previous_stock, new_stock, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.product_id.as_uuid())
        .bind(*entry.actor_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(i64::from(entry.quantity))
        .bind(i64::from(entry.previous_stock))
        .bind(i64::from(entry.new_stock))
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_log", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn push_log_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &LogFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = filter.product_id {
        builder.push(" AND l.product_id = ").push_bind(*id.as_uuid());
    }
    if let Some(id) = filter.actor_id {
        builder.push(" AND l.user_id = ").push_bind(*id.as_uuid());
    }
    if let Some(action) = filter.action {
        builder.push(" AND l.action = ").push_bind(action.as_str());
    }
    if let Some(start) = filter.start {
        builder.push(" AND l.created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        builder.push(" AND l.created_at <= ").push_bind(end);
    }
}

fn sort_column(sort: Option<ProductSort>) -> &'static str {
    match sort {
        Some(ProductSort::Name) => "name",
        Some(ProductSort::Sku) => "sku",
        Some(ProductSort::Category) => "category",
        Some(ProductSort::Stock) => "stock",
        Some(ProductSort::Price) => "price",
        Some(ProductSort::CreatedAt) | None => "created_at",
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PostgresTransaction { tx })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool.as_ref())
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("health_check", e))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(|r| decode_product(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE deleted_at IS NULL"
        ));
        if let Some(search) = &filter.search {
            builder
                .push(" AND position(lower(")
                .push_bind(search.clone())
                .push(") in lower(name)) > 0");
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if filter.low_stock_only {
            builder.push(" AND stock <= threshold");
        }
        builder
            .push(" ORDER BY ")
            .push(sort_column(filter.sort))
            .push(if filter.descending { " DESC" } else { " ASC" })
            .push(", id ASC");

        let rows = builder
            .build()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(decode_product).collect()
    }

    async fn categories(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM products WHERE deleted_at IS NULL ORDER BY category",
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("categories", e))
    }

    #[instrument(skip(self), err)]
    async fn query_logs(&self, filter: &LogFilter, page: Pagination) -> Result<LogPage, StoreError> {
        let mut count: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM inventory_logs l");
        push_log_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("query_logs_count", e))?;

        let mut select: QueryBuilder<'_, Postgres> = QueryBuilder::new(LOG_DETAILS_SELECT);
        push_log_filter(&mut select, filter);
        select
            .push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("query_logs", e))?;

        let entries = rows.iter().map(decode_log).collect::<Result<Vec<_>, _>>()?;

        Ok(LogPage {
            entries,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    #[instrument(skip(self), err)]
    async fn ledger_entries(&self, filter: &LogFilter) -> Result<Vec<LogEntryDetails>, StoreError> {
        let mut select: QueryBuilder<'_, Postgres> = QueryBuilder::new(LOG_DETAILS_SELECT);
        push_log_filter(&mut select, filter);
        select.push(" ORDER BY l.created_at ASC, l.id ASC");

        let rows = select
            .build()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("ledger_entries", e))?;

        rows.iter().map(decode_log).collect()
    }

    #[instrument(skip(self), err)]
    async fn inventory_snapshot(&self, recent: u32) -> Result<InventorySnapshot, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("inventory_snapshot", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("inventory_snapshot", e))?;

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE deleted_at IS NULL ORDER BY created_at ASC, id ASC"
        );
        let product_rows = sqlx::query(&sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("inventory_snapshot_products", e))?;

        let sql = format!("{LOG_DETAILS_SELECT} ORDER BY l.created_at DESC, l.id DESC LIMIT $1");
        let log_rows = sqlx::query(&sql)
            .bind(i64::from(recent))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("inventory_snapshot_logs", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("inventory_snapshot", e))?;

        Ok(InventorySnapshot {
            products: product_rows.iter().map(decode_product).collect::<Result<_, _>>()?,
            recent: log_rows.iter().map(decode_log).collect::<Result<_, _>>()?,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("row decode failed in {operation}: {err}"))
        }
        other => StoreError::Unavailable(format!("{operation} failed: {other}")),
    }
}

fn to_u32(column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    category: String,
    description: Option<String>,
    barcode: Option<String>,
    image_url: Option<String>,
    stock: i64,
    threshold: i64,
    price: Decimal,
    expiry_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            barcode: row.try_get("barcode")?,
            image_url: row.try_get("image_url")?,
            stock: row.try_get("stock")?,
            threshold: row.try_get("threshold")?,
            price: row.try_get("price")?,
            expiry_date: row.try_get("expiry_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            sku: row.sku,
            name: row.name,
            category: row.category,
            description: row.description,
            barcode: row.barcode,
            image_url: row.image_url,
            stock: to_u32("stock", row.stock)?,
            threshold: to_u32("threshold", row.threshold)?,
            price: row.price,
            expiry_date: row.expiry_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn decode_product(row: &PgRow) -> Result<Product, StoreError> {
    ProductRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_product", e))?
        .try_into()
}

fn decode_log(row: &PgRow) -> Result<LogEntryDetails, StoreError> {
    LogDetailsRow::from_row(row)
        .map_err(|e| map_sqlx_error("decode_log", e))?
        .try_into()
}

#[derive(Debug)]
struct LogDetailsRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    action: String,
    quantity: i64,
    previous_stock: i64,
    new_stock: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    product_name: String,
    product_sku: String,
    username: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for LogDetailsRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(LogDetailsRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            user_id: row.try_get("user_id")?,
            action: row.try_get("action")?,
            quantity: row.try_get("quantity")?,
            previous_stock: row.try_get("previous_stock")?,
            new_stock: row.try_get("new_stock")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            product_name: row.try_get("product_name")?,
            product_sku: row.try_get("product_sku")?,
            username: row.try_get("username")?,
        })
    }
}

impl TryFrom<LogDetailsRow> for LogEntryDetails {
    type Error = StoreError;

    fn try_from(row: LogDetailsRow) -> Result<Self, Self::Error> {
        let action: StockAction = row
            .action
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("unknown ledger action '{}'", row.action)))?;
        let product_id = ProductId::from_uuid(row.product_id);
        let actor_id = UserId::from_uuid(row.user_id);

        Ok(LogEntryDetails {
            entry: InventoryLogEntry {
                id: LogEntryId::from_uuid(row.id),
                product_id,
                actor_id,
                action,
                quantity: to_u32("quantity", row.quantity)?,
                previous_stock: to_u32("previous_stock", row.previous_stock)?,
                new_stock: to_u32("new_stock", row.new_stock)?,
                notes: row.notes,
                created_at: row.created_at,
            },
            product: ProductRef {
                id: product_id,
                name: row.product_name,
                sku: row.product_sku,
            },
            actor: ActorRef::new(actor_id, row.username.unwrap_or_default()),
        })
    }
}
