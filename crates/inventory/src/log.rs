//! Append-only inventory ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, LogEntryId, ProductId, UserId};

use crate::movement::{MovementRequest, StockAction};
use crate::product::Product;

/// Identifying product fields attached to ledger reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
}

impl From<&Product> for ProductRef {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            sku: p.sku.clone(),
        }
    }
}

/// Identifying actor fields attached to ledger reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: UserId,
    pub username: String,
}

impl ActorRef {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// One immutable record of a stock mutation.
///
/// `quantity` is the delta for `Add`/`Remove` and the new absolute value for `Update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLogEntry {
    pub id: LogEntryId,
    pub product_id: ProductId,
    #[serde(rename = "userId")]
    pub actor_id: UserId,
    pub action: StockAction,
    pub quantity: u32,
    pub previous_stock: u32,
    pub new_stock: u32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryLogEntry {
    /// Record a movement that has already passed the transition guard.
    pub fn record(
        request: &MovementRequest,
        actor_id: UserId,
        previous_stock: u32,
        new_stock: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            product_id: request.product_id,
            actor_id,
            action: request.action,
            quantity: request.quantity,
            previous_stock,
            new_stock,
            notes: request.notes.clone(),
            created_at,
        }
    }

    /// Synthetic `Add` entry for stock a product was created with.
    pub fn initial_stock(product: &Product, actor_id: UserId) -> Self {
        Self {
            id: LogEntryId::new(),
            product_id: product.id,
            actor_id,
            action: StockAction::Add,
            quantity: product.stock,
            previous_stock: 0,
            new_stock: product.stock,
            notes: Some("Initial stock".to_string()),
            created_at: product.created_at,
        }
    }

    /// Whether `new_stock` follows from `previous_stock` under the transition table.
    pub fn is_consistent(&self) -> bool {
        self.action.apply(self.previous_stock, self.quantity) == Ok(self.new_stock)
    }
}

/// A ledger entry with its product and actor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryDetails {
    #[serde(flatten)]
    pub entry: InventoryLogEntry,
    #[serde(rename = "Product")]
    pub product: ProductRef,
    #[serde(rename = "User")]
    pub actor: ActorRef,
}

/// Replay a product's ledger and return the stock it implies.
///
/// Entries are ordered by `created_at` (ties broken by id, which is time-ordered). The
/// fold starts at the first entry's `previous_stock`; every entry must continue from the
/// previous entry's `new_stock` and satisfy the transition table. An empty ledger
/// implies nothing and yields `None`.
pub fn replay_stock(entries: &[InventoryLogEntry]) -> Result<Option<u32>, DomainError> {
    let mut ordered: Vec<&InventoryLogEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| (e.created_at, e.id));

    let Some(first) = ordered.first() else {
        return Ok(None);
    };

    let mut stock = first.previous_stock;
    for entry in ordered {
        if entry.previous_stock != stock {
            return Err(DomainError::invariant(format!(
                "ledger gap at entry {}: expected previous stock {stock}, found {}",
                entry.id, entry.previous_stock
            )));
        }
        stock = entry.action.apply(stock, entry.quantity).map_err(|e| {
            DomainError::invariant(format!("entry {} violates transition: {e}", entry.id))
        })?;
        if stock != entry.new_stock {
            return Err(DomainError::invariant(format!(
                "entry {} records new stock {}, transition yields {stock}",
                entry.id, entry.new_stock
            )));
        }
    }

    Ok(Some(stock))
}
