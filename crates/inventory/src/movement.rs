use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::ProductId;

/// Kind of stock change recorded in the ledger (closed set).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StockAction {
    /// Increase stock by `quantity`.
    Add,
    /// Decrease stock by `quantity`, guarded against going negative.
    Remove,
    /// Set stock to exactly `quantity`.
    Update,
}

impl StockAction {
    pub const ALL: [StockAction; 3] = [StockAction::Add, StockAction::Remove, StockAction::Update];

    pub fn as_str(self) -> &'static str {
        match self {
            StockAction::Add => "Add",
            StockAction::Remove => "Remove",
            StockAction::Update => "Update",
        }
    }

    /// Smallest quantity accepted for this action.
    ///
    /// `Update` may set stock to zero; the relative actions need a non-zero delta.
    pub fn min_quantity(self) -> u32 {
        match self {
            StockAction::Add | StockAction::Remove => 1,
            StockAction::Update => 0,
        }
    }

    /// Range-check a raw quantity for this action.
    pub fn check_quantity(self, quantity: i64) -> Result<u32, StockError> {
        let min = self.min_quantity();
        u32::try_from(quantity)
            .ok()
            .filter(|q| *q >= min)
            .ok_or(StockError::InvalidQuantity {
                action: self,
                quantity,
                min,
            })
    }

    /// Transition function: `previous` stock → new stock.
    ///
    /// | action | guard                   | new stock             |
    /// |--------|-------------------------|-----------------------|
    /// | Add    | none                    | `previous + quantity` |
    /// | Remove | `previous >= quantity`  | `previous - quantity` |
    /// | Update | none                    | `quantity`            |
    pub fn apply(self, previous: u32, quantity: u32) -> Result<u32, StockError> {
        match self {
            StockAction::Add => previous
                .checked_add(quantity)
                .ok_or(StockError::StockOverflow {
                    current_stock: previous,
                    requested_quantity: quantity,
                }),
            StockAction::Remove => {
                if previous < quantity {
                    return Err(StockError::InsufficientStock {
                        current_stock: previous,
                        requested_quantity: quantity,
                    });
                }
                Ok(previous - quantity)
            }
            StockAction::Update => Ok(quantity),
        }
    }
}

impl core::fmt::Display for StockAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockAction {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Add" => Ok(StockAction::Add),
            "Remove" => Ok(StockAction::Remove),
            "Update" => Ok(StockAction::Update),
            other => Err(StockError::InvalidAction(other.to_string())),
        }
    }
}

/// Pure stock-movement failures (validation and transition guards).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("invalid action '{0}': must be Add, Remove, or Update")]
    InvalidAction(String),

    #[error("invalid quantity {quantity} for {action}: must be at least {min}")]
    InvalidQuantity {
        action: StockAction,
        quantity: i64,
        min: u32,
    },

    #[error("insufficient stock (current: {current_stock}, requested: {requested_quantity})")]
    InsufficientStock {
        current_stock: u32,
        requested_quantity: u32,
    },

    #[error("stock overflow (current: {current_stock}, requested: {requested_quantity})")]
    StockOverflow {
        current_stock: u32,
        requested_quantity: u32,
    },
}

/// A validated request to move stock for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub action: StockAction,
    pub quantity: u32,
    pub notes: Option<String>,
}

impl MovementRequest {
    /// Validate raw caller input.
    ///
    /// Checks run in order: the action must be one of the closed set, then the
    /// quantity must be within range for that action. Product existence is checked
    /// later, inside the transaction.
    pub fn parse(
        product_id: ProductId,
        action: &str,
        quantity: i64,
        notes: Option<String>,
    ) -> Result<Self, StockError> {
        let action: StockAction = action.parse()?;
        Self::new(product_id, action, quantity, notes)
    }

    pub fn new(
        product_id: ProductId,
        action: StockAction,
        quantity: i64,
        notes: Option<String>,
    ) -> Result<Self, StockError> {
        let quantity = action.check_quantity(quantity)?;

        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            product_id,
            action,
            quantity,
            notes,
        })
    }
}
