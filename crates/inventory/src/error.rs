use thiserror::Error;

use stockroom_core::DomainError;

use crate::item::InventoryItemId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Requested more units than are on hand. Nothing was changed.
    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: InventoryItemId,
        available: i64,
        requested: i64,
    },

    #[error("inventory item {0} not found")]
    ItemNotFound(InventoryItemId),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }
}
