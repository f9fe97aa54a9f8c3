use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, Entity, Money, TenantId, ValueObject, entity_id};

use crate::error::DiscountError;

entity_id! {
    pub struct DiscountId;
}

/// Discount code as typed by customers. Case-insensitive; stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiscountCode(String);

impl ValueObject for DiscountCode {}

impl DiscountCode {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("discount code cannot be empty"));
        }
        if trimmed.len() > 32 {
            return Err(DomainError::validation("discount code must be at most 32 characters"));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(DomainError::validation(
                "discount code may only contain letters, digits, '-' and '_'",
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DiscountCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DiscountCode::parse(&value)
    }
}

impl From<DiscountCode> for String {
    fn from(value: DiscountCode) -> Self {
        value.0
    }
}

impl core::fmt::Display for DiscountCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the discount amount is computed from the cart subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountRule {
    /// `percent`% off the subtotal, rounded down. 1..=100.
    Percentage { percent: u32 },
    /// Flat amount off, capped at the subtotal.
    FixedAmount { amount: Money },
}

impl DiscountRule {
    pub fn amount_for(&self, subtotal: Money) -> Money {
        match self {
            DiscountRule::Percentage { percent } => subtotal.percent(*percent),
            DiscountRule::FixedAmount { amount } => (*amount).min(subtotal),
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        match self {
            DiscountRule::Percentage { percent } if !(1..=100).contains(percent) => Err(
                DomainError::validation("percentage must be between 1 and 100"),
            ),
            DiscountRule::FixedAmount { amount } if amount.is_zero() => {
                Err(DomainError::validation("fixed amount must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Eligibility conditions. Every field is optional; `None` means unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountConditions {
    #[serde(default)]
    pub min_spend: Option<Money>,
    #[serde(default)]
    pub min_items: Option<u32>,
    #[serde(default)]
    pub max_usage: Option<u32>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Discount definition plus its usage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    id: DiscountId,
    tenant_id: TenantId,
    code: DiscountCode,
    description: String,
    rule: DiscountRule,
    conditions: DiscountConditions,
    active: bool,
    used_count: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted state of a discount, used by stores to rebuild it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountSnapshot {
    pub id: DiscountId,
    pub tenant_id: TenantId,
    pub code: DiscountCode,
    pub description: String,
    pub rule: DiscountRule,
    pub conditions: DiscountConditions,
    pub active: bool,
    pub used_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Command: define a new discount code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiscount {
    pub tenant_id: TenantId,
    pub discount_id: DiscountId,
    pub code: String,
    pub description: String,
    pub rule: DiscountRule,
    pub conditions: DiscountConditions,
    pub occurred_at: DateTime<Utc>,
}

impl Discount {
    pub fn create(cmd: &NewDiscount) -> Result<Self, DiscountError> {
        let code = DiscountCode::parse(&cmd.code)?;
        cmd.rule.validate()?;
        if cmd.conditions.max_usage == Some(0) {
            return Err(DomainError::validation("max usage must be positive when set").into());
        }

        Ok(Self {
            id: cmd.discount_id,
            tenant_id: cmd.tenant_id,
            code,
            description: cmd.description.trim().to_string(),
            rule: cmd.rule,
            conditions: cmd.conditions,
            active: true,
            used_count: 0,
            created_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    pub fn restore(snapshot: DiscountSnapshot) -> Self {
        Self {
            id: snapshot.id,
            tenant_id: snapshot.tenant_id,
            code: snapshot.code,
            description: snapshot.description,
            rule: snapshot.rule,
            conditions: snapshot.conditions,
            active: snapshot.active,
            used_count: snapshot.used_count,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    pub fn id_typed(&self) -> DiscountId {
        self.id
    }

    pub fn code(&self) -> &DiscountCode {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rule(&self) -> DiscountRule {
        self.rule
    }

    pub fn conditions(&self) -> &DiscountConditions {
        &self.conditions
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn used_count(&self) -> u32 {
        self.used_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Uses left before the limit, `None` when unlimited.
    pub fn remaining_uses(&self) -> Option<u32> {
        self.conditions
            .max_usage
            .map(|max| max.saturating_sub(self.used_count))
    }

    /// Check the discount against a cart and compute the amount off.
    ///
    /// Order of checks: inactive, expired, minimum spend, minimum items,
    /// usage limit. Does not mutate; the usage counter is only moved by
    /// [`Discount::reserve_use`].
    pub fn evaluate(
        &self,
        subtotal: Money,
        item_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Money, DiscountError> {
        if !self.active {
            return Err(DiscountError::Inactive);
        }
        if let Some(valid_until) = self.conditions.valid_until {
            if valid_until < now {
                return Err(DiscountError::Expired);
            }
        }
        if let Some(min_spend) = self.conditions.min_spend {
            if subtotal < min_spend {
                return Err(DiscountError::MinSpendNotMet { min_spend, subtotal });
            }
        }
        if let Some(min_items) = self.conditions.min_items {
            if item_count < min_items {
                return Err(DiscountError::MinItemsNotMet { min_items, item_count });
            }
        }
        if let Some(max_usage) = self.conditions.max_usage {
            if self.used_count >= max_usage {
                return Err(DiscountError::UsageLimitReached { max_usage });
            }
        }

        Ok(self.rule.amount_for(subtotal))
    }

    /// Spend one use. Returns `false` and leaves the counter untouched when the
    /// increment would pass `max_usage`.
    pub fn reserve_use(&mut self, at: DateTime<Utc>) -> bool {
        let next = match self.used_count.checked_add(1) {
            Some(n) => n,
            None => return false,
        };
        if let Some(max_usage) = self.conditions.max_usage {
            if next > max_usage {
                return false;
            }
        }
        self.used_count = next;
        self.updated_at = at;
        true
    }

    pub fn deactivate(&mut self, at: DateTime<Utc>) {
        if self.active {
            self.active = false;
            self.updated_at = at;
        }
    }
}

impl Entity for Discount {
    type Id = DiscountId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
