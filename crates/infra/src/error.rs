use thiserror::Error;

use stockledger_core::{DomainError, ProductId};
use stockledger_inventory::StockError;

use crate::store::StoreError;

/// Failure taxonomy of the ledger engine and its query facade.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid action '{0}': must be Add, Remove, or Update")]
    InvalidAction(String),

    #[error("{0}")]
    InvalidQuantity(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock (current: {current_stock}, requested: {requested_quantity})")]
    InsufficientStock {
        current_stock: u32,
        requested_quantity: u32,
    },

    #[error("duplicate product: {0}")]
    DuplicateProduct(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("transaction timed out after {0} ms")]
    TransactionTimeout(u64),
}

impl LedgerError {
    /// Recoverable business outcomes, as opposed to system faults.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            LedgerError::StorageUnavailable(_) | LedgerError::TransactionTimeout(_)
        )
    }
}

impl From<StockError> for LedgerError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InvalidAction(action) => LedgerError::InvalidAction(action),
            StockError::InsufficientStock {
                current_stock,
                requested_quantity,
            } => LedgerError::InsufficientStock {
                current_stock,
                requested_quantity,
            },
            e @ (StockError::InvalidQuantity { .. } | StockError::StockOverflow { .. }) => {
                LedgerError::InvalidQuantity(e.to_string())
            }
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => LedgerError::DuplicateProduct(what),
            StoreError::Unavailable(msg) | StoreError::Corrupt(msg) => {
                LedgerError::StorageUnavailable(msg)
            }
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            other => LedgerError::Validation(other.to_string()),
        }
    }
}
