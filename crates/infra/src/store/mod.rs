//! Storage abstraction.
//!
//! Services never talk to a database directly. They ask a [`Store`] for a
//! [`UnitOfWork`], read and write through the repository traits it
//! implements, then commit or roll back. Everything done through one unit of
//! work becomes visible atomically on commit; dropping a unit of work without
//! committing discards it.
//!
//! `lock_*` methods take a row lock that is held until the unit of work ends.
//! Callers that lock several rows do so in a fixed order so two units of work
//! never wait on each other in a cycle: a checkout locks items ascending by id
//! and then the discount; a status change locks the order and then its items
//! ascending by id.

use async_trait::async_trait;
use thiserror::Error;

use stockroom_core::TenantId;
use stockroom_discounts::{Discount, DiscountCode, DiscountId};
use stockroom_inventory::{InventoryItem, InventoryItemId, InventoryMovement};
use stockroom_orders::{Order, OrderId};

use crate::error::ServiceResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient contention (serialization failure, deadlock). The whole unit
    /// of work may be retried.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The unit of work was already committed or rolled back.
    #[error("unit of work already finished")]
    Closed,

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ItemRepository: Send {
    /// Fails with [`StoreError::Duplicate`] when the SKU is taken in the tenant.
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError>;

    async fn get_item(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError>;

    /// Read an item and hold its row lock until the unit of work ends.
    async fn lock_item(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError>;

    /// All items of a tenant ordered by SKU.
    async fn list_items(&mut self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError>;

    /// Persist quantity, price and `updated_at` of an existing item.
    async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError>;

    async fn append_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError>;

    /// Movement history of one item, oldest first.
    async fn movements_for(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<InventoryMovement>, StoreError>;
}

#[async_trait]
pub trait DiscountRepository: Send {
    /// Fails with [`StoreError::Duplicate`] when the code is taken in the tenant.
    async fn insert_discount(&mut self, discount: &Discount) -> Result<(), StoreError>;

    async fn find_discount_by_code(
        &mut self,
        tenant_id: TenantId,
        code: &DiscountCode,
    ) -> Result<Option<Discount>, StoreError>;

    /// Read a discount and hold its row lock until the unit of work ends.
    async fn lock_discount(
        &mut self,
        tenant_id: TenantId,
        discount_id: DiscountId,
    ) -> Result<Option<Discount>, StoreError>;

    /// All discounts of a tenant ordered by code.
    async fn list_discounts(&mut self, tenant_id: TenantId) -> Result<Vec<Discount>, StoreError>;

    /// Persist `active`, `used_count` and `updated_at` of an existing discount.
    async fn update_discount(&mut self, discount: &Discount) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderRepository: Send {
    /// Insert an order together with its line items.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&mut self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Read an order and hold its row lock until the unit of work ends.
    async fn lock_order(&mut self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All orders of a tenant, newest first.
    async fn list_orders(&mut self, tenant_id: TenantId) -> Result<Vec<Order>, StoreError>;

    /// Persist `status` and `updated_at` of an existing order. Line items and
    /// amounts are immutable once placed.
    async fn update_order_status(&mut self, order: &Order) -> Result<(), StoreError>;
}

/// One storage transaction.
#[async_trait]
pub trait UnitOfWork: ItemRepository + DiscountRepository + OrderRepository + Send {
    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged and the original error is returned; the
/// backend discards the transaction either way.
pub(crate) async fn finish<T: Send>(mut uow: Box<dyn UnitOfWork>, outcome: ServiceResult<T>) -> ServiceResult<T> {
    match outcome {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
