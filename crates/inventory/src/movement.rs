use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, EntityId, TenantId, UserId, entity_id};

use crate::item::InventoryItemId;

entity_id! {
    /// Identifier of a recorded stock movement.
    pub struct MovementId;
}

/// Why a stock quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    StockIn,
    /// Sale or other outbound consumption.
    StockOut,
    Adjustment,
    Damage,
    Return,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::StockIn => "stock_in",
            MovementKind::StockOut => "stock_out",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Damage => "damage",
            MovementKind::Return => "return",
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock_in" => Ok(MovementKind::StockIn),
            "stock_out" => Ok(MovementKind::StockOut),
            "adjustment" => Ok(MovementKind::Adjustment),
            "damage" => Ok(MovementKind::Damage),
            "return" => Ok(MovementKind::Return),
            other => Err(DomainError::validation(format!("unknown movement kind '{other}'"))),
        }
    }
}

/// Immutable record of a stock quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    /// Signed quantity change; never zero.
    pub delta: i64,
    pub kind: MovementKind,
    /// Order that caused the movement (sales, cancellation returns).
    pub related_order_id: Option<EntityId>,
    pub actor: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Sum of deltas for one item. Equals the item's quantity when the history is
/// complete.
pub fn reconcile<'a>(
    item_id: InventoryItemId,
    movements: impl IntoIterator<Item = &'a InventoryMovement>,
) -> i64 {
    movements
        .into_iter()
        .filter(|m| m.item_id == item_id)
        .map(|m| m.delta)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(item_id: InventoryItemId, delta: i64) -> InventoryMovement {
        InventoryMovement {
            id: MovementId::new(),
            tenant_id: TenantId::new(),
            item_id,
            delta,
            kind: if delta > 0 { MovementKind::StockIn } else { MovementKind::StockOut },
            related_order_id: None,
            actor: UserId::new(),
            reason: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn reconcile_sums_only_matching_item() {
        let a = InventoryItemId::new();
        let b = InventoryItemId::new();
        let history = vec![movement(a, 5), movement(b, 7), movement(a, -3)];
        assert_eq!(reconcile(a, &history), 2);
        assert_eq!(reconcile(b, &history), 7);
    }

    #[test]
    fn kind_parses_its_own_label() {
        for kind in [
            MovementKind::StockIn,
            MovementKind::StockOut,
            MovementKind::Adjustment,
            MovementKind::Damage,
            MovementKind::Return,
        ] {
            assert_eq!(kind.as_str().parse::<MovementKind>().unwrap(), kind);
        }
        assert!("theft".parse::<MovementKind>().is_err());
    }
}
