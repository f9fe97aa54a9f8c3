//! Inventory domain: items, stock movements and the stock rules.
//!
//! Pure decision logic (no IO). A stock change is decided by
//! [`InventoryItem::handle`], which returns the [`InventoryMovement`] to
//! record, and takes effect through [`InventoryItem::apply`]. The infra
//! ledger runs both under a row lock.

pub mod error;
pub mod item;
pub mod movement;

pub use error::InventoryError;
pub use item::{InventoryItem, InventoryItemId, ItemSnapshot, LowStockPolicy, NewItem, Sku, StockCommand};
pub use movement::{InventoryMovement, MovementId, MovementKind, reconcile};
