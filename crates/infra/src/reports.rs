//! Read-only reports derived from products and the ledger.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stockledger_core::{ProductId, UserId};
use stockledger_inventory::{ActorRef, Product, ProductRef, StockAction};

use crate::error::LedgerError;
use crate::queries::{unavailable, value_overflow, LowStockProduct, StockQueries};
use crate::store::{LogFilter, ProductFilter, StockStore};

pub const DEFAULT_REPORT_WINDOW_DAYS: i64 = 30;
/// How far ahead an expiry date counts as "expiring soon".
pub const EXPIRY_WINDOW_DAYS: i64 = 30;
const TOP_PRODUCTS: usize = 10;
const TOP_ACTORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub action: StockAction,
    pub count: u64,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMovement {
    pub date: NaiveDate,
    pub action: StockAction,
    pub count: u64,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMovement {
    #[serde(rename = "Product")]
    pub product: ProductRef,
    pub total_quantity: u64,
    pub movement_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorActivity {
    #[serde(rename = "User")]
    pub actor: ActorRef,
    pub activity_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementReport {
    pub period: ReportPeriod,
    pub by_action: Vec<ActionSummary>,
    pub daily: Vec<DailyMovement>,
    pub top_products: Vec<ProductMovement>,
    pub top_actors: Vec<ActorActivity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValue {
    pub category: String,
    pub product_count: u64,
    pub total_stock: u64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductValue {
    #[serde(flatten)]
    pub product: ProductRef,
    pub category: String,
    pub stock: u32,
    pub price: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueReport {
    pub categories: Vec<CategoryValue>,
    pub total_value: Decimal,
    pub top_products: Vec<ProductValue>,
}

/// Stocked products bucketed by the month they expire in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryMonth {
    /// First day of the month.
    pub month: NaiveDate,
    pub product_count: u64,
    pub total_stock: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySummary {
    pub total_expired: u64,
    pub total_expiring_soon: u64,
}

/// Stocked products past or near their expiry date. Products with no stock left are not
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryReport {
    pub expired_products: Vec<Product>,
    pub expiring_products: Vec<Product>,
    pub expiry_by_month: Vec<ExpiryMonth>,
    pub summary: ExpirySummary,
}

impl ExpiryReport {
    /// Classify against `now`: expired is strictly before `now`, expiring soon is within
    /// `[now, now + 30d]` inclusive.
    pub fn build(products: impl IntoIterator<Item = Product>, now: DateTime<Utc>) -> Self {
        let horizon = now + Duration::days(EXPIRY_WINDOW_DAYS);
        let mut expired = Vec::new();
        let mut expiring = Vec::new();
        let mut months: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();

        for p in products {
            let Some(expiry) = p.expiry_date else { continue };
            if p.stock == 0 {
                continue;
            }

            let day = expiry.date_naive();
            let bucket = months.entry(day.with_day(1).unwrap_or(day)).or_default();
            bucket.0 += 1;
            bucket.1 += u64::from(p.stock);

            if expiry < now {
                expired.push(p);
            } else if expiry <= horizon {
                expiring.push(p);
            }
        }
        expired.sort_by_key(|p| (p.expiry_date, p.id));
        expiring.sort_by_key(|p| (p.expiry_date, p.id));

        Self {
            summary: ExpirySummary {
                total_expired: expired.len() as u64,
                total_expiring_soon: expiring.len() as u64,
            },
            expired_products: expired,
            expiring_products: expiring,
            expiry_by_month: months
                .into_iter()
                .map(|(month, (product_count, total_stock))| ExpiryMonth {
                    month,
                    product_count,
                    total_stock,
                })
                .collect(),
        }
    }
}

/// Last instant of `at`'s calendar day (UTC), at millisecond precision.
pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
    at.date_naive().and_time(last).and_utc()
}

/// Resolve an optional report window: `[now - 30d, now]` by default, with the end bound
/// stretched to the end of its day.
pub fn report_period(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<ReportPeriod, LedgerError> {
    let start = start.unwrap_or(now - Duration::days(DEFAULT_REPORT_WINDOW_DAYS));
    let end = end_of_day(end.unwrap_or(now));
    if start > end {
        return Err(LedgerError::Validation(
            "startDate must not be after endDate".to_string(),
        ));
    }
    Ok(ReportPeriod { start, end })
}

#[derive(Default)]
struct Tally {
    count: u64,
    quantity: u64,
}

impl<S: StockStore> StockQueries<S> {
    #[instrument(skip(self), err)]
    pub async fn stock_movement_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MovementReport, LedgerError> {
        let period = report_period(start, end, Utc::now())?;
        let entries = self
            .store()
            .ledger_entries(&LogFilter::between(period.start, period.end))
            .await
            .map_err(|e| unavailable("stock_movement_report", e))?;

        let mut by_action: BTreeMap<StockAction, Tally> = BTreeMap::new();
        let mut daily: BTreeMap<(NaiveDate, StockAction), Tally> = BTreeMap::new();
        let mut products: HashMap<ProductId, (ProductRef, Tally)> = HashMap::new();
        let mut actors: HashMap<UserId, (ActorRef, u64)> = HashMap::new();

        for details in entries {
            let entry = &details.entry;
            let quantity = u64::from(entry.quantity);

            let t = by_action.entry(entry.action).or_default();
            t.count += 1;
            t.quantity += quantity;

            let t = daily
                .entry((entry.created_at.date_naive(), entry.action))
                .or_default();
            t.count += 1;
            t.quantity += quantity;

            let (_, t) = products
                .entry(entry.product_id)
                .or_insert_with(|| (details.product.clone(), Tally::default()));
            t.count += 1;
            t.quantity += quantity;

            actors
                .entry(entry.actor_id)
                .or_insert_with(|| (details.actor.clone(), 0))
                .1 += 1;
        }

        let mut top_products: Vec<ProductMovement> = products
            .into_values()
            .map(|(product, t)| ProductMovement {
                product,
                total_quantity: t.quantity,
                movement_count: t.count,
            })
            .collect();
        top_products.sort_by(|a, b| {
            b.total_quantity
                .cmp(&a.total_quantity)
                .then_with(|| a.product.sku.cmp(&b.product.sku))
        });
        top_products.truncate(TOP_PRODUCTS);

        let mut top_actors: Vec<ActorActivity> = actors
            .into_values()
            .map(|(actor, activity_count)| ActorActivity {
                actor,
                activity_count,
            })
            .collect();
        top_actors.sort_by(|a, b| {
            b.activity_count
                .cmp(&a.activity_count)
                .then_with(|| a.actor.username.cmp(&b.actor.username))
        });
        top_actors.truncate(TOP_ACTORS);

        Ok(MovementReport {
            period,
            by_action: by_action
                .into_iter()
                .map(|(action, t)| ActionSummary {
                    action,
                    count: t.count,
                    total_quantity: t.quantity,
                })
                .collect(),
            daily: daily
                .into_iter()
                .map(|((date, action), t)| DailyMovement {
                    date,
                    action,
                    count: t.count,
                    total_quantity: t.quantity,
                })
                .collect(),
            top_products,
            top_actors,
        })
    }

    #[instrument(skip(self), err)]
    pub async fn inventory_value_report(&self) -> Result<ValueReport, LedgerError> {
        let products = self.list_products(&ProductFilter::default()).await?;

        let overflow = || value_overflow("inventory_value_report");
        let mut categories: BTreeMap<String, CategoryValue> = BTreeMap::new();
        let mut top_products: Vec<ProductValue> = Vec::with_capacity(products.len());
        for p in &products {
            let value = p.stock_value().ok_or_else(overflow)?;
            let c = categories
                .entry(p.category.clone())
                .or_insert_with(|| CategoryValue {
                    category: p.category.clone(),
                    product_count: 0,
                    total_stock: 0,
                    total_value: Decimal::ZERO,
                });
            c.product_count += 1;
            c.total_stock += u64::from(p.stock);
            c.total_value = c.total_value.checked_add(value).ok_or_else(overflow)?;

            top_products.push(ProductValue {
                product: p.into(),
                category: p.category.clone(),
                stock: p.stock,
                price: p.price,
                value,
            });
        }
        top_products.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.product.sku.cmp(&b.product.sku))
        });
        top_products.truncate(TOP_PRODUCTS);

        let categories: Vec<CategoryValue> = categories.into_values().collect();
        let total_value = categories
            .iter()
            .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(c.total_value))
            .ok_or_else(overflow)?;

        Ok(ValueReport {
            categories,
            total_value,
            top_products,
        })
    }

    pub async fn low_stock_report(&self) -> Result<Vec<LowStockProduct>, LedgerError> {
        self.list_low_stock().await
    }

    #[instrument(skip(self), err)]
    pub async fn expiry_report(&self, now: DateTime<Utc>) -> Result<ExpiryReport, LedgerError> {
        let products = self.list_products(&ProductFilter::default()).await?;
        Ok(ExpiryReport::build(products, now))
    }
}
