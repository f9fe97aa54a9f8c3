//! Inventory ledger: the only writer of item quantities.
//!
//! Every quantity change goes through a locked read of the item row, the
//! item's own `handle`/`apply` decision, an update of the row and an appended
//! movement, all inside one unit of work. The `*_in` functions do that inside
//! a caller's unit of work (checkout, order cancellation); the methods on
//! [`InventoryLedger`] open their own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use stockroom_auth::{Actor, Permission, authorize};
use stockroom_core::{EntityId, Money};
use stockroom_inventory::{
    InventoryError, InventoryItem, InventoryItemId, InventoryMovement, LowStockPolicy, MovementKind, NewItem,
    StockCommand,
};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{ItemRepository, Store, UnitOfWork, finish};

/// A quantity change requested against one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub item_id: InventoryItemId,
    /// Units to move; must be positive.
    pub quantity: i64,
    pub kind: MovementKind,
    pub reason: Option<String>,
    pub related_order_id: Option<EntityId>,
}

/// Catalog data for a new item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub opening_quantity: i64,
    pub low_stock_threshold: i64,
}

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

/// Remove units from an item inside `uow`, holding its row lock.
///
/// Returns the item as it stands after the change (its catalog price is the
/// one a checkout snapshots) and the recorded movement. On
/// `InsufficientStock` nothing is written.
pub async fn decrement_in(
    uow: &mut dyn UnitOfWork,
    actor: &Actor,
    change: &StockChange,
    at: DateTime<Utc>,
) -> ServiceResult<(InventoryItem, InventoryMovement)> {
    let command = StockCommand::Decrement {
        quantity: change.quantity,
        kind: change.kind,
        reason: change.reason.clone(),
        actor: actor.user_id,
        related_order_id: change.related_order_id,
        occurred_at: at,
    };
    record(uow, actor, change.item_id, &command).await
}

/// Add units to an item inside `uow`, holding its row lock.
pub async fn increase_in(
    uow: &mut dyn UnitOfWork,
    actor: &Actor,
    change: &StockChange,
    at: DateTime<Utc>,
) -> ServiceResult<(InventoryItem, InventoryMovement)> {
    let command = StockCommand::Increase {
        quantity: change.quantity,
        kind: change.kind,
        reason: change.reason.clone(),
        actor: actor.user_id,
        related_order_id: change.related_order_id,
        occurred_at: at,
    };
    record(uow, actor, change.item_id, &command).await
}

async fn record(
    uow: &mut dyn UnitOfWork,
    actor: &Actor,
    item_id: InventoryItemId,
    command: &StockCommand,
) -> ServiceResult<(InventoryItem, InventoryMovement)> {
    let mut item = uow
        .lock_item(actor.tenant_id, item_id)
        .await?
        .ok_or(InventoryError::ItemNotFound(item_id))?;

    let movement = item.handle(command)?;
    item.apply(&movement);

    uow.update_item(&item).await?;
    uow.append_movement(&movement).await?;
    Ok((item, movement))
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register a catalog item. A positive opening quantity is recorded as a
    /// `StockIn` movement.
    #[instrument(skip(self, actor, request), fields(tenant_id = %actor.tenant_id, sku = %request.sku), err)]
    pub async fn create_item(&self, actor: &Actor, request: CreateItem) -> ServiceResult<InventoryItem> {
        authorize(actor, &Permission::INVENTORY_CREATE)?;

        let (item, opening) = InventoryItem::create(&NewItem {
            tenant_id: actor.tenant_id,
            item_id: InventoryItemId::new(),
            sku: request.sku,
            name: request.name,
            category: request.category,
            unit_price: request.unit_price,
            opening_quantity: request.opening_quantity,
            low_stock_threshold: request.low_stock_threshold,
            actor: actor.user_id,
            occurred_at: Utc::now(),
        })?;

        let mut uow = self.store.begin().await?;
        let outcome = async {
            uow.insert_item(&item).await?;
            if let Some(movement) = &opening {
                uow.append_movement(movement).await?;
            }
            Ok::<(), ServiceError>(())
        }
        .await;
        finish(uow, outcome).await?;

        info!(item_id = %item.id_typed(), quantity = item.quantity(), "inventory item created");
        Ok(item)
    }

    /// Remove stock outside of a checkout (write-offs, manual picks).
    ///
    /// Only `StockOut` and `Damage` remove stock here; signed corrections go
    /// through [`InventoryLedger::adjust`].
    #[instrument(skip(self, actor, change), fields(tenant_id = %actor.tenant_id, item_id = %change.item_id), err)]
    pub async fn decrement_stock(&self, actor: &Actor, change: StockChange) -> ServiceResult<InventoryMovement> {
        authorize(actor, &Permission::INVENTORY_ADJUST)?;
        if !matches!(change.kind, MovementKind::StockOut | MovementKind::Damage) {
            return Err(ServiceError::validation("kind", "stock can only be removed as stock_out or damage"));
        }
        let mut uow = self.store.begin().await?;
        let outcome = decrement_in(uow.as_mut(), actor, &change, Utc::now()).await;
        let (_, movement) = finish(uow, outcome).await?;
        Ok(movement)
    }

    /// Receive stock as a `StockIn` delivery or a `Return`.
    #[instrument(skip(self, actor, change), fields(tenant_id = %actor.tenant_id, item_id = %change.item_id), err)]
    pub async fn increase_stock(&self, actor: &Actor, change: StockChange) -> ServiceResult<InventoryMovement> {
        authorize(actor, &Permission::INVENTORY_RESTOCK)?;
        if !matches!(change.kind, MovementKind::StockIn | MovementKind::Return) {
            return Err(ServiceError::validation("kind", "stock can only be received as stock_in or return"));
        }
        let mut uow = self.store.begin().await?;
        let outcome = increase_in(uow.as_mut(), actor, &change, Utc::now()).await;
        let (item, movement) = finish(uow, outcome).await?;
        info!(quantity = item.quantity(), delta = movement.delta, "stock increased");
        Ok(movement)
    }

    /// Signed correction after a stock count, damage or an unplanned return.
    ///
    /// `Damage` must remove stock and `Return` must add it; a correction that
    /// would leave the item below zero is refused as insufficient stock.
    #[instrument(skip(self, actor, reason), fields(tenant_id = %actor.tenant_id, item_id = %item_id), err)]
    pub async fn adjust(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        delta: i64,
        kind: MovementKind,
        reason: Option<String>,
    ) -> ServiceResult<InventoryMovement> {
        authorize(actor, &Permission::INVENTORY_ADJUST)?;
        match kind {
            MovementKind::Adjustment => {}
            MovementKind::Damage if delta < 0 => {}
            MovementKind::Return if delta > 0 => {}
            MovementKind::Damage => {
                return Err(ServiceError::validation("delta", "damage adjustments must remove stock"));
            }
            MovementKind::Return => {
                return Err(ServiceError::validation("delta", "return adjustments must add stock"));
            }
            MovementKind::StockIn | MovementKind::StockOut => {
                return Err(ServiceError::validation(
                    "kind",
                    "manual adjustments must be adjustment, damage or return",
                ));
            }
        }

        let command = StockCommand::Adjust {
            delta,
            kind,
            reason,
            actor: actor.user_id,
            occurred_at: Utc::now(),
        };
        let mut uow = self.store.begin().await?;
        let outcome = record(uow.as_mut(), actor, item_id, &command).await;
        let (item, movement) = finish(uow, outcome).await?;
        info!(quantity = item.quantity(), delta, "stock adjusted");
        Ok(movement)
    }

    /// Change the catalog price. Orders already placed keep the price they
    /// were placed at.
    #[instrument(skip(self, actor), fields(tenant_id = %actor.tenant_id, item_id = %item_id), err)]
    pub async fn reprice(&self, actor: &Actor, item_id: InventoryItemId, unit_price: Money) -> ServiceResult<InventoryItem> {
        authorize(actor, &Permission::INVENTORY_PRICE)?;
        let mut uow = self.store.begin().await?;
        let outcome = async {
            let mut item = uow
                .lock_item(actor.tenant_id, item_id)
                .await?
                .ok_or(InventoryError::ItemNotFound(item_id))?;
            item.reprice(unit_price, Utc::now());
            uow.update_item(&item).await?;
            Ok::<_, ServiceError>(item)
        }
        .await;
        finish(uow, outcome).await
    }

    pub async fn get_item(&self, actor: &Actor, item_id: InventoryItemId) -> ServiceResult<InventoryItem> {
        authorize(actor, &Permission::INVENTORY_READ)?;
        let mut uow = self.store.begin().await?;
        let outcome = uow
            .get_item(actor.tenant_id, item_id)
            .await
            .map_err(ServiceError::from)
            .and_then(|item| item.ok_or_else(|| ServiceError::not_found("inventory item", item_id)));
        finish(uow, outcome).await
    }

    pub async fn list_items(&self, actor: &Actor) -> ServiceResult<Vec<InventoryItem>> {
        authorize(actor, &Permission::INVENTORY_READ)?;
        let mut uow = self.store.begin().await?;
        let outcome = uow.list_items(actor.tenant_id).await.map_err(ServiceError::from);
        finish(uow, outcome).await
    }

    /// Items at or below their low-stock threshold, in SKU order. Read-only.
    pub async fn low_stock(
        &self,
        actor: &Actor,
        policy: LowStockPolicy,
    ) -> ServiceResult<impl Iterator<Item = InventoryItem>> {
        let items = self.list_items(actor).await?;
        Ok(items.into_iter().filter(move |item| item.is_low_stock(policy)))
    }

    /// Movement history of an item, oldest first. Read-only.
    pub async fn movements_for(&self, actor: &Actor, item_id: InventoryItemId) -> ServiceResult<Vec<InventoryMovement>> {
        authorize(actor, &Permission::INVENTORY_READ)?;
        let mut uow = self.store.begin().await?;
        let outcome = async {
            if uow.get_item(actor.tenant_id, item_id).await?.is_none() {
                return Err(ServiceError::not_found("inventory item", item_id));
            }
            Ok::<_, ServiceError>(uow.movements_for(actor.tenant_id, item_id).await?)
        }
        .await;
        finish(uow, outcome).await
    }
}
