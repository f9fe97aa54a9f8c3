//! In-memory store used for tests and when no `DATABASE_URL` is configured.
//!
//! All tables sit behind one `tokio::sync::Mutex`. A unit of work owns the
//! guard for its whole lifetime, so units of work are serialized: that is the
//! single-writer equivalent of holding every row lock at once. Writes go to a
//! staged overlay that is folded into the tables on commit and thrown away on
//! rollback or drop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_core::{Entity, TenantId};
use stockroom_discounts::{Discount, DiscountCode, DiscountId};
use stockroom_inventory::{InventoryItem, InventoryItemId, InventoryMovement};
use stockroom_orders::{Order, OrderId};

use super::{DiscountRepository, ItemRepository, OrderRepository, Store, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<(TenantId, InventoryItemId), InventoryItem>,
    movements: Vec<InventoryMovement>,
    discounts: HashMap<(TenantId, DiscountId), Discount>,
    orders: HashMap<(TenantId, OrderId), Order>,
}

impl Tables {
    fn absorb(&mut self, staged: Tables) {
        self.items.extend(staged.items);
        self.movements.extend(staged.movements);
        self.discounts.extend(staged.discounts);
        self.orders.extend(staged.orders);
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            committed: Some(guard),
            staged: Tables::default(),
        }))
    }
}

pub struct InMemoryUnitOfWork {
    committed: Option<OwnedMutexGuard<Tables>>,
    staged: Tables,
}

impl InMemoryUnitOfWork {
    fn committed(&self) -> Result<&Tables, StoreError> {
        self.committed.as_deref().ok_or(StoreError::Closed)
    }

    fn item(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
        let key = (tenant_id, item_id);
        let committed = self.committed()?;
        Ok(self
            .staged
            .items
            .get(&key)
            .or_else(|| committed.items.get(&key))
            .cloned())
    }

    fn discount(&self, tenant_id: TenantId, discount_id: DiscountId) -> Result<Option<Discount>, StoreError> {
        let key = (tenant_id, discount_id);
        let committed = self.committed()?;
        Ok(self
            .staged
            .discounts
            .get(&key)
            .or_else(|| committed.discounts.get(&key))
            .cloned())
    }

    fn order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let key = (tenant_id, order_id);
        let committed = self.committed()?;
        Ok(self
            .staged
            .orders
            .get(&key)
            .or_else(|| committed.orders.get(&key))
            .cloned())
    }

    /// Committed rows overlaid with staged ones, restricted to one tenant.
    fn merged<'a, K, V>(
        committed: &'a HashMap<(TenantId, K), V>,
        staged: &'a HashMap<(TenantId, K), V>,
        tenant_id: TenantId,
    ) -> Vec<&'a V>
    where
        K: std::hash::Hash + Eq,
    {
        let mut rows: HashMap<&(TenantId, K), &V> = committed
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .collect();
        rows.extend(staged.iter().filter(|((tenant, _), _)| *tenant == tenant_id));
        rows.into_values().collect()
    }
}

#[async_trait]
impl ItemRepository for InMemoryUnitOfWork {
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        let tenant_id = item.tenant_id();
        if self.item(tenant_id, item.id_typed())?.is_some() {
            return Err(StoreError::Duplicate(format!("inventory item {}", item.id_typed())));
        }
        let committed = self.committed()?;
        let sku_taken = Self::merged(&committed.items, &self.staged.items, tenant_id)
            .into_iter()
            .any(|existing| existing.sku() == item.sku());
        if sku_taken {
            return Err(StoreError::Duplicate(format!("sku {}", item.sku())));
        }
        self.staged.items.insert((tenant_id, item.id_typed()), item.clone());
        Ok(())
    }

    async fn get_item(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        self.item(tenant_id, item_id)
    }

    async fn lock_item(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        // The unit of work already holds the store-wide lock.
        self.item(tenant_id, item_id)
    }

    async fn list_items(&mut self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
        let committed = self.committed()?;
        let mut items: Vec<InventoryItem> = Self::merged(&committed.items, &self.staged.items, tenant_id)
            .into_iter()
            .cloned()
            .collect();
        items.sort_by(|a, b| a.sku().as_str().cmp(b.sku().as_str()));
        Ok(items)
    }

    async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        if self.item(item.tenant_id(), item.id_typed())?.is_none() {
            return Err(StoreError::Backend(format!("update of unknown inventory item {}", item.id_typed())));
        }
        self.staged
            .items
            .insert((item.tenant_id(), item.id_typed()), item.clone());
        Ok(())
    }

    async fn append_movement(&mut self, movement: &InventoryMovement) -> Result<(), StoreError> {
        self.committed()?;
        self.staged.movements.push(movement.clone());
        Ok(())
    }

    async fn movements_for(
        &mut self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let committed = self.committed()?;
        Ok(committed
            .movements
            .iter()
            .chain(self.staged.movements.iter())
            .filter(|m| m.tenant_id == tenant_id && m.item_id == item_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DiscountRepository for InMemoryUnitOfWork {
    async fn insert_discount(&mut self, discount: &Discount) -> Result<(), StoreError> {
        let tenant_id = discount.tenant_id();
        if self.discount(tenant_id, discount.id_typed())?.is_some() {
            return Err(StoreError::Duplicate(format!("discount {}", discount.id_typed())));
        }
        let committed = self.committed()?;
        let code_taken = Self::merged(&committed.discounts, &self.staged.discounts, tenant_id)
            .into_iter()
            .any(|existing| existing.code() == discount.code());
        if code_taken {
            return Err(StoreError::Duplicate(format!("discount code {}", discount.code())));
        }
        self.staged
            .discounts
            .insert((tenant_id, discount.id_typed()), discount.clone());
        Ok(())
    }

    async fn find_discount_by_code(
        &mut self,
        tenant_id: TenantId,
        code: &DiscountCode,
    ) -> Result<Option<Discount>, StoreError> {
        let committed = self.committed()?;
        Ok(Self::merged(&committed.discounts, &self.staged.discounts, tenant_id)
            .into_iter()
            .find(|d| d.code() == code)
            .cloned())
    }

    async fn lock_discount(
        &mut self,
        tenant_id: TenantId,
        discount_id: DiscountId,
    ) -> Result<Option<Discount>, StoreError> {
        self.discount(tenant_id, discount_id)
    }

    async fn list_discounts(&mut self, tenant_id: TenantId) -> Result<Vec<Discount>, StoreError> {
        let committed = self.committed()?;
        let mut discounts: Vec<Discount> = Self::merged(&committed.discounts, &self.staged.discounts, tenant_id)
            .into_iter()
            .cloned()
            .collect();
        discounts.sort_by(|a, b| a.code().as_str().cmp(b.code().as_str()));
        Ok(discounts)
    }

    async fn update_discount(&mut self, discount: &Discount) -> Result<(), StoreError> {
        if self.discount(discount.tenant_id(), discount.id_typed())?.is_none() {
            return Err(StoreError::Backend(format!("update of unknown discount {}", discount.id_typed())));
        }
        self.staged
            .discounts
            .insert((discount.tenant_id(), discount.id_typed()), discount.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryUnitOfWork {
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.order(order.tenant_id(), order.id_typed())?.is_some() {
            return Err(StoreError::Duplicate(format!("order {}", order.id_typed())));
        }
        self.staged
            .orders
            .insert((order.tenant_id(), order.id_typed()), order.clone());
        Ok(())
    }

    async fn get_order(&mut self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.order(tenant_id, order_id)
    }

    async fn lock_order(&mut self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.order(tenant_id, order_id)
    }

    async fn list_orders(&mut self, tenant_id: TenantId) -> Result<Vec<Order>, StoreError> {
        let committed = self.committed()?;
        let mut orders: Vec<Order> = Self::merged(&committed.orders, &self.staged.orders, tenant_id)
            .into_iter()
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(orders)
    }

    async fn update_order_status(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.order(order.tenant_id(), order.id_typed())?.is_none() {
            return Err(StoreError::Backend(format!("update of unknown order {}", order.id_typed())));
        }
        self.staged
            .orders
            .insert((order.tenant_id(), order.id_typed()), order.clone());
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.committed.take().ok_or(StoreError::Closed)?;
        guard.absorb(std::mem::take(&mut self.staged));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.committed.take().ok_or(StoreError::Closed)?;
        self.staged = Tables::default();
        Ok(())
    }
}
