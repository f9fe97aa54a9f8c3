use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use stockroom_core::Money;
use stockroom_discounts::{Discount, DiscountConditions, DiscountRule};
use stockroom_inventory::{InventoryItem, InventoryMovement, MovementKind};
use stockroom_orders::{CartItem, CustomerDetails, Order};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer: CustomerDetails,
    pub cart: Vec<CartItem>,
    #[serde(default)]
    pub discount_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateDiscountRequest {
    pub code: String,
    pub cart_total: Money,
    #[serde(default)]
    pub item_count: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionsRequest {
    #[serde(default)]
    pub min_spend: Option<Money>,
    #[serde(default)]
    pub min_items: Option<u32>,
    #[serde(default)]
    pub max_usage: Option<u32>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscountRequest {
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: DiscountType,
    /// Percent for `percentage`, minor units for `fixed_amount`.
    pub value: u64,
    #[serde(default)]
    pub conditions: ConditionsRequest,
}

impl CreateDiscountRequest {
    pub fn rule(&self) -> Result<DiscountRule, axum::response::Response> {
        match self.kind {
            DiscountType::Percentage => u32::try_from(self.value)
                .map(|percent| DiscountRule::Percentage { percent })
                .map_err(|_| {
                    super::errors::json_error(
                        axum::http::StatusCode::BAD_REQUEST,
                        "validation_error",
                        "percentage must be between 1 and 100",
                    )
                }),
            DiscountType::FixedAmount => Ok(DiscountRule::FixedAmount {
                amount: Money::from_minor(self.value),
            }),
        }
    }

    pub fn conditions(&self) -> DiscountConditions {
        DiscountConditions {
            min_spend: self.conditions.min_spend,
            min_items: self.conditions.min_items,
            max_usage: self.conditions.max_usage,
            valid_until: self.conditions.valid_until,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub unit_price: Money,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub low_stock_threshold: i64,
}

#[derive(Debug, Deserialize)]
pub struct RepriceRequest {
    pub unit_price: Money,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_adjust_kind() -> MovementKind {
    MovementKind::Adjustment
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    #[serde(default = "default_adjust_kind")]
    pub kind: MovementKind,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    /// Overrides every item's own threshold when present.
    pub threshold: Option<i64>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn order_to_json(order: &Order) -> Value {
    json!({
        "id": order.id_typed().to_string(),
        "customer": order.customer(),
        "items": order.items().iter().map(|line| json!({
            "inventory_item_id": line.inventory_item_id.to_string(),
            "name": line.name,
            "sku": line.sku.as_str(),
            "quantity": line.quantity,
            "price_at_purchase": line.price_at_purchase.minor_units(),
        })).collect::<Vec<_>>(),
        "subtotal": order.subtotal().minor_units(),
        "discountId": order.discount_id().map(|id| id.to_string()),
        "discountAmount": order.discount_amount().minor_units(),
        "total": order.total().minor_units(),
        "status": order.status().as_str(),
        "createdBy": order.created_by().to_string(),
        "createdAt": order.created_at(),
        "updatedAt": order.updated_at(),
    })
}

pub fn item_to_json(item: &InventoryItem) -> Value {
    json!({
        "id": item.id_typed().to_string(),
        "sku": item.sku().as_str(),
        "name": item.name(),
        "category": item.category(),
        "unit_price": item.unit_price().minor_units(),
        "quantity": item.quantity(),
        "low_stock_threshold": item.low_stock_threshold(),
        "created_at": item.created_at(),
        "updated_at": item.updated_at(),
    })
}

pub fn movement_to_json(movement: &InventoryMovement) -> Value {
    json!({
        "id": movement.id.to_string(),
        "item_id": movement.item_id.to_string(),
        "delta": movement.delta,
        "kind": movement.kind.as_str(),
        "related_order_id": movement.related_order_id.map(|id| id.to_string()),
        "actor": movement.actor.to_string(),
        "reason": movement.reason,
        "occurred_at": movement.occurred_at,
    })
}

pub fn discount_to_json(discount: &Discount) -> Value {
    let (kind, value) = match discount.rule() {
        DiscountRule::Percentage { percent } => ("percentage", u64::from(percent)),
        DiscountRule::FixedAmount { amount } => ("fixed_amount", amount.minor_units()),
    };
    let conditions = discount.conditions();
    json!({
        "id": discount.id_typed().to_string(),
        "code": discount.code().as_str(),
        "description": discount.description(),
        "type": kind,
        "value": value,
        "conditions": {
            "minSpend": conditions.min_spend.map(Money::minor_units),
            "minItems": conditions.min_items,
            "maxUsage": conditions.max_usage,
            "validUntil": conditions.valid_until,
        },
        "isActive": discount.is_active(),
        "usedCount": discount.used_count(),
        "createdAt": discount.created_at(),
        "updatedAt": discount.updated_at(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_body_uses_camel_case() {
        let body: CheckoutRequest = serde_json::from_value(json!({
            "customer": { "name": "Ada", "email": "ada@example.com" },
            "cart": [{ "inventory_item_id": uuid_str(), "quantity": 2 }],
            "discountCode": "SUMMER10",
        }))
        .unwrap();
        assert_eq!(body.cart.len(), 1);
        assert_eq!(body.discount_code.as_deref(), Some("SUMMER10"));
        assert_eq!(body.customer.contact, "");
    }

    #[test]
    fn adjust_kind_defaults_to_adjustment() {
        let body: AdjustStockRequest = serde_json::from_value(json!({ "delta": -2 })).unwrap();
        assert_eq!(body.kind, MovementKind::Adjustment);

        let body: AdjustStockRequest =
            serde_json::from_value(json!({ "delta": -2, "kind": "damage" })).unwrap();
        assert_eq!(body.kind, MovementKind::Damage);
    }

    #[test]
    fn discount_body_maps_type_and_value() {
        let body: CreateDiscountRequest = serde_json::from_value(json!({
            "code": "FIVE",
            "type": "fixed_amount",
            "value": 500,
            "conditions": { "minSpend": 1000, "maxUsage": 3 },
        }))
        .unwrap();
        assert!(matches!(
            body.rule(),
            Ok(DiscountRule::FixedAmount { amount }) if amount == Money::from_minor(500)
        ));
        let conditions = body.conditions();
        assert_eq!(conditions.min_spend, Some(Money::from_minor(1000)));
        assert_eq!(conditions.max_usage, Some(3));
        assert_eq!(conditions.min_items, None);
    }

    fn uuid_str() -> String {
        uuid::Uuid::now_v7().to_string()
    }
}
