use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ProductId};

/// Reorder point applied when a product is created without one.
pub const DEFAULT_THRESHOLD: u32 = 10;

/// Prices carry at most this many decimal places.
pub const PRICE_SCALE: u32 = 2;

/// Exclusive upper bound on a unit price (`NUMERIC(12,2)`).
pub const MAX_PRICE_EXCLUSIVE: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Derived stock classification (never persisted).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    /// Classify a stock level against its reorder point (threshold is inclusive).
    pub fn classify(stock: u32, threshold: u32) -> Self {
        if stock == 0 {
            StockStatus::OutOfStock
        } else if stock <= threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn needs_reorder(self) -> bool {
        !matches!(self, StockStatus::InStock)
    }
}

/// One stock-keeping unit.
///
/// `stock` is owned by the ledger engine: adapters persist it, but only a committed
/// stock movement (or product creation) may change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub stock: u32,
    pub threshold: u32,
    pub price: Decimal,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn status(&self) -> StockStatus {
        StockStatus::classify(self.stock, self.threshold)
    }

    /// `stock <= threshold`, the reorder condition used by listings and counts.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.threshold
    }

    /// Criticality ratio used to order low-stock listings (lower is more critical).
    pub fn stock_ratio(&self) -> f64 {
        f64::from(self.stock) / f64::from(self.threshold.max(1))
    }

    /// `stock × price`, computed in decimal arithmetic. `None` on overflow.
    pub fn stock_value(&self) -> Option<Decimal> {
        Decimal::from(self.stock).checked_mul(self.price)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Apply a descriptive patch. Stock is not patchable.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(sku) = patch.sku {
            self.sku = required("sku", sku)?;
        }
        if let Some(name) = patch.name {
            self.name = required("name", name)?;
        }
        if let Some(category) = patch.category {
            self.category = required("category", category)?;
        }
        if let Some(threshold) = patch.threshold {
            self.threshold = validate_threshold(threshold)?;
        }
        if let Some(price) = patch.price {
            self.price = validate_price(price)?;
        }
        if patch.barcode.is_some() {
            self.barcode = optional(patch.barcode);
        }
        if patch.description.is_some() {
            self.description = optional(patch.description);
        }
        if patch.image_url.is_some() {
            self.image_url = optional(patch.image_url);
        }
        if patch.expiry_date.is_some() {
            self.expiry_date = patch.expiry_date;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub threshold: Option<i64>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl NewProduct {
    /// Validate and build the product record.
    pub fn into_product(self, id: ProductId, now: DateTime<Utc>) -> DomainResult<Product> {
        let stock = match self.stock {
            None => 0,
            Some(s) => u32::try_from(s)
                .map_err(|_| DomainError::validation(format!("stock must be a non-negative integer, got {s}")))?,
        };
        let threshold = match self.threshold {
            None => DEFAULT_THRESHOLD,
            Some(t) => validate_threshold(t)?,
        };
        let price = validate_price(self.price.unwrap_or(Decimal::ZERO))?;

        Ok(Product {
            id,
            sku: required("sku", self.sku)?,
            name: required("name", self.name)?,
            category: required("category", self.category)?,
            description: optional(self.description),
            barcode: optional(self.barcode),
            image_url: optional(self.image_url),
            stock,
            threshold,
            price,
            expiry_date: self.expiry_date,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

/// Descriptive edits made by administrators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub threshold: Option<i64>,
    pub price: Option<Decimal>,
    pub expiry_date: Option<DateTime<Utc>>,
}

fn required(field: &str, value: String) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_threshold(threshold: i64) -> DomainResult<u32> {
    u32::try_from(threshold)
        .ok()
        .filter(|t| *t >= 1)
        .ok_or_else(|| DomainError::validation(format!("threshold must be at least 1, got {threshold}")))
}

fn validate_price(price: Decimal) -> DomainResult<Decimal> {
    if price < Decimal::ZERO {
        return Err(DomainError::validation(format!("price cannot be negative, got {price}")));
    }
    if price >= MAX_PRICE_EXCLUSIVE {
        return Err(DomainError::validation(format!(
            "price must be below {MAX_PRICE_EXCLUSIVE}, got {price}"
        )));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(DomainError::validation(format!(
            "price allows at most {PRICE_SCALE} decimal places, got {price}"
        )));
    }
    let mut price = price;
    price.rescale(PRICE_SCALE);
    Ok(price)
}

/// Sum of `stock × price` over `products`. `None` on overflow.
pub fn total_stock_value<'a>(products: impl IntoIterator<Item = &'a Product>) -> Option<Decimal> {
    products
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.stock_value()?))
}
