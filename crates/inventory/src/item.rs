use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, Entity, EntityId, Money, TenantId, UserId, ValueObject, entity_id};

use crate::error::InventoryError;
use crate::movement::{InventoryMovement, MovementId, MovementKind};

entity_id! {
    /// Inventory item identifier (tenant-scoped through the owning item).
    pub struct InventoryItemId;
}

/// Stock-keeping unit: the human-facing item code, unique per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl ValueObject for Sku {}

impl Sku {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if trimmed.len() > 64 {
            return Err(DomainError::validation("sku must be at most 64 characters"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("sku cannot contain whitespace"));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Sku {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Sku::parse(&value)
    }
}

impl From<Sku> for String {
    fn from(value: Sku) -> Self {
        value.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which threshold decides that an item is running low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LowStockPolicy {
    /// Each item's own `low_stock_threshold`.
    #[default]
    ItemThreshold,
    /// One threshold for every item.
    Fixed(i64),
}

/// Inventory item: catalog data plus the on-hand quantity.
///
/// `quantity` only changes through [`InventoryItem::apply`] with a movement
/// produced by [`InventoryItem::handle`], which refuses to go below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: TenantId,
    sku: Sku,
    name: String,
    category: String,
    unit_price: Money,
    quantity: i64,
    low_stock_threshold: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted state of an item, used by stores to rebuild it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub id: InventoryItemId,
    pub tenant_id: TenantId,
    pub sku: Sku,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Command: create an item, optionally with opening stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub opening_quantity: i64,
    pub low_stock_threshold: i64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Stock change commands handled by an existing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockCommand {
    /// Remove `quantity` units; fails if fewer are on hand.
    Decrement {
        quantity: i64,
        kind: MovementKind,
        reason: Option<String>,
        actor: UserId,
        related_order_id: Option<EntityId>,
        occurred_at: DateTime<Utc>,
    },
    /// Add `quantity` units.
    Increase {
        quantity: i64,
        kind: MovementKind,
        reason: Option<String>,
        actor: UserId,
        related_order_id: Option<EntityId>,
        occurred_at: DateTime<Utc>,
    },
    /// Signed correction (stock count, damage write-off).
    Adjust {
        delta: i64,
        kind: MovementKind,
        reason: Option<String>,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    },
}

impl InventoryItem {
    /// Validate a creation command and build the item at zero stock, plus the
    /// opening `StockIn` movement when `opening_quantity > 0`.
    ///
    /// The returned item already has the opening movement applied.
    pub fn create(cmd: &NewItem) -> Result<(Self, Option<InventoryMovement>), InventoryError> {
        let sku = Sku::parse(&cmd.sku)?;
        if cmd.name.trim().is_empty() {
            return Err(InventoryError::validation("name cannot be empty"));
        }
        if cmd.opening_quantity < 0 {
            return Err(InventoryError::validation("opening quantity cannot be negative"));
        }
        if cmd.low_stock_threshold < 0 {
            return Err(InventoryError::validation("low stock threshold cannot be negative"));
        }

        let mut item = Self {
            id: cmd.item_id,
            tenant_id: cmd.tenant_id,
            sku,
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            unit_price: cmd.unit_price,
            quantity: 0,
            low_stock_threshold: cmd.low_stock_threshold,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        };

        if cmd.opening_quantity == 0 {
            return Ok((item, None));
        }

        let opening = item.handle(&StockCommand::Increase {
            quantity: cmd.opening_quantity,
            kind: MovementKind::StockIn,
            reason: Some("opening stock".to_string()),
            actor: cmd.actor,
            related_order_id: None,
            occurred_at: cmd.occurred_at,
        })?;
        item.apply(&opening);
        Ok((item, Some(opening)))
    }

    pub fn restore(snapshot: ItemSnapshot) -> Self {
        Self {
            id: snapshot.id,
            tenant_id: snapshot.tenant_id,
            sku: snapshot.sku,
            name: snapshot.name,
            category: snapshot.category,
            unit_price: snapshot.unit_price,
            quantity: snapshot.quantity,
            low_stock_threshold: snapshot.low_stock_threshold,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_low_stock(&self, policy: LowStockPolicy) -> bool {
        let threshold = match policy {
            LowStockPolicy::ItemThreshold => self.low_stock_threshold,
            LowStockPolicy::Fixed(t) => t,
        };
        self.quantity <= threshold
    }

    /// Change the catalog price. Existing orders keep their snapshot.
    pub fn reprice(&mut self, unit_price: Money, at: DateTime<Utc>) {
        self.unit_price = unit_price;
        self.updated_at = at;
    }

    /// Decide the movement for a stock command. Does not mutate.
    pub fn handle(&self, command: &StockCommand) -> Result<InventoryMovement, InventoryError> {
        match command {
            StockCommand::Decrement {
                quantity,
                kind,
                reason,
                actor,
                related_order_id,
                occurred_at,
            } => {
                ensure_positive(*quantity)?;
                if self.quantity < *quantity {
                    return Err(InventoryError::InsufficientStock {
                        item_id: self.id,
                        available: self.quantity,
                        requested: *quantity,
                    });
                }
                Ok(self.movement(-quantity, *kind, reason, *actor, *related_order_id, *occurred_at))
            }
            StockCommand::Increase {
                quantity,
                kind,
                reason,
                actor,
                related_order_id,
                occurred_at,
            } => {
                ensure_positive(*quantity)?;
                if self.quantity.checked_add(*quantity).is_none() {
                    return Err(DomainError::overflow("stock quantity").into());
                }
                Ok(self.movement(*quantity, *kind, reason, *actor, *related_order_id, *occurred_at))
            }
            StockCommand::Adjust {
                delta,
                kind,
                reason,
                actor,
                occurred_at,
            } => {
                if *delta == 0 {
                    return Err(InventoryError::validation("delta cannot be zero"));
                }
                match self.quantity.checked_add(*delta) {
                    None => Err(DomainError::overflow("stock quantity").into()),
                    Some(next) if next < 0 => Err(InventoryError::InsufficientStock {
                        item_id: self.id,
                        available: self.quantity,
                        requested: -delta,
                    }),
                    Some(_) => Ok(self.movement(*delta, *kind, reason, *actor, None, *occurred_at)),
                }
            }
        }
    }

    /// Evolve state from a movement previously decided by `handle`.
    pub fn apply(&mut self, movement: &InventoryMovement) {
        debug_assert_eq!(movement.item_id, self.id);
        self.quantity += movement.delta;
        self.updated_at = movement.occurred_at;
    }

    fn movement(
        &self,
        delta: i64,
        kind: MovementKind,
        reason: &Option<String>,
        actor: UserId,
        related_order_id: Option<EntityId>,
        occurred_at: DateTime<Utc>,
    ) -> InventoryMovement {
        InventoryMovement {
            id: MovementId::new(),
            tenant_id: self.tenant_id,
            item_id: self.id,
            delta,
            kind,
            related_order_id,
            actor,
            reason: reason.clone(),
            occurred_at,
        }
    }
}

impl Entity for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

fn ensure_positive(quantity: i64) -> Result<(), InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::validation("quantity must be positive"));
    }
    Ok(())
}
