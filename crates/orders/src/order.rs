use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, Entity, Money, TenantId, UserId, entity_id};
use stockroom_discounts::DiscountId;
use stockroom_inventory::{InventoryItemId, Sku};

use crate::error::OrderError;
use crate::status::{OrderStatus, OrderStatusMachine};

entity_id! {
    /// Order identifier (tenant-scoped through the owning order).
    pub struct OrderId;
}

/// Customer contact fields captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub email: String,
}

impl CustomerDetails {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.name.trim().is_empty() {
            return Err(OrderError::customer("customer.name", "name cannot be empty"));
        }
        let email = self.email.trim();
        if !email.is_empty() && !email.contains('@') {
            return Err(OrderError::customer("customer.email", "email must contain '@'"));
        }
        Ok(())
    }
}

/// One requested line of a cart (ephemeral, never persisted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub inventory_item_id: InventoryItemId,
    pub quantity: i64,
}

/// A validated cart: non-empty, positive quantities, one line per item.
///
/// Lines are keyed by item id, so iteration is in ascending id order. Stores
/// lock item rows in this order, which keeps concurrent checkouts from
/// deadlocking on each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    lines: BTreeMap<InventoryItemId, i64>,
}

impl Cart {
    pub fn new(items: &[CartItem]) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::cart("cart", "cart cannot be empty"));
        }

        let mut lines: BTreeMap<InventoryItemId, i64> = BTreeMap::new();
        for (idx, item) in items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(OrderError::cart(
                    format!("cart[{idx}].quantity"),
                    "quantity must be positive",
                ));
            }
            let line = lines.entry(item.inventory_item_id).or_insert(0);
            *line = line.checked_add(item.quantity).ok_or_else(|| {
                OrderError::cart(format!("cart[{idx}].quantity"), "quantity too large")
            })?;
        }

        let total = lines.values().try_fold(0i64, |acc, qty| acc.checked_add(*qty));
        if total.is_none() {
            return Err(OrderError::cart("cart", "total quantity too large"));
        }

        Ok(Self { lines })
    }

    /// `(item, quantity)` pairs in ascending item id order.
    pub fn lines(&self) -> impl Iterator<Item = (InventoryItemId, i64)> + '_ {
        self.lines.iter().map(|(id, qty)| (*id, *qty))
    }

    pub fn distinct_items(&self) -> usize {
        self.lines.len()
    }

    /// Total units across all lines (what `min_items` is checked against).
    pub fn item_count(&self) -> u32 {
        let units = self
            .lines
            .values()
            .try_fold(0i64, |acc, qty| acc.checked_add(*qty))
            .unwrap_or(i64::MAX);
        u32::try_from(units).unwrap_or(u32::MAX)
    }
}

/// A purchased line. `price_at_purchase` is the catalog price at checkout
/// time and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub inventory_item_id: InventoryItemId,
    pub name: String,
    pub sku: Sku,
    pub quantity: i64,
    pub price_at_purchase: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.price_at_purchase.times(self.quantity)
    }
}

/// Discount applied to an order at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub discount_id: DiscountId,
    pub amount: Money,
}

/// Command: place an order from already-reserved stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub customer: CustomerDetails,
    pub items: Vec<OrderItem>,
    pub discount: Option<AppliedDiscount>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// A placed order. Items and amounts are fixed at creation; only the status
/// moves afterwards, along the edges of [`OrderStatusMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    tenant_id: TenantId,
    customer: CustomerDetails,
    items: Vec<OrderItem>,
    subtotal: Money,
    discount_id: Option<DiscountId>,
    discount_amount: Money,
    total: Money,
    status: OrderStatus,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted state of an order, used by stores to rebuild it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub customer: CustomerDetails,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount_id: Option<DiscountId>,
    pub discount_amount: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Compute totals and build the order in `Processing`.
    pub fn place(cmd: NewOrder) -> Result<Self, OrderError> {
        cmd.customer.validate()?;
        if cmd.items.is_empty() {
            return Err(OrderError::cart("cart", "order needs at least one item"));
        }

        let subtotal = subtotal_of(&cmd.items)?;
        let discount_amount = cmd.discount.map(|d| d.amount).unwrap_or(Money::ZERO);
        if discount_amount > subtotal {
            return Err(DomainError::invariant("discount amount exceeds subtotal").into());
        }

        Ok(Self {
            id: cmd.order_id,
            tenant_id: cmd.tenant_id,
            customer: cmd.customer,
            items: cmd.items,
            subtotal,
            discount_id: cmd.discount.map(|d| d.discount_id),
            discount_amount,
            total: subtotal.saturating_sub(discount_amount),
            status: OrderStatus::Processing,
            created_by: cmd.created_by,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    pub fn restore(snapshot: OrderSnapshot) -> Self {
        Self {
            id: snapshot.id,
            tenant_id: snapshot.tenant_id,
            customer: snapshot.customer,
            items: snapshot.items,
            subtotal: snapshot.subtotal,
            discount_id: snapshot.discount_id,
            discount_amount: snapshot.discount_amount,
            total: snapshot.total,
            status: snapshot.status,
            created_by: snapshot.created_by,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer(&self) -> &CustomerDetails {
        &self.customer
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount_id(&self) -> Option<DiscountId> {
        self.discount_id
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Move to `to` if the lifecycle allows it. Returns the previous status.
    pub fn transition_to(&mut self, to: OrderStatus, at: DateTime<Utc>) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        self.status = OrderStatusMachine::transition(from, to)?;
        self.updated_at = at;
        Ok(from)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

fn subtotal_of(items: &[OrderItem]) -> Result<Money, OrderError> {
    items.iter().try_fold(Money::ZERO, |acc, item| {
        let line = item.line_total()?;
        Ok(acc.checked_add(line)?)
    })
}
