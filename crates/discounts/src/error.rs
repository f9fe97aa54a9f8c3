use serde::Serialize;
use thiserror::Error;

use stockroom_core::{DomainError, Money};

/// Why a discount code cannot be applied to a cart.
///
/// Variants are listed in the order they are checked; the first violated
/// condition is the one reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscountError {
    #[error("discount code '{0}' not found")]
    CodeNotFound(String),

    #[error("discount code is inactive")]
    Inactive,

    #[error("discount code has expired")]
    Expired,

    #[error("cart subtotal {subtotal} is below the minimum spend of {min_spend}")]
    MinSpendNotMet { min_spend: Money, subtotal: Money },

    #[error("cart has {item_count} items, discount requires at least {min_items}")]
    MinItemsNotMet { min_items: u32, item_count: u32 },

    #[error("discount usage limit of {max_usage} reached")]
    UsageLimitReached { max_usage: u32 },

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Stable machine-readable discriminant, used in API error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountErrorKind {
    CodeNotFound,
    Inactive,
    Expired,
    MinSpendNotMet,
    MinItemsNotMet,
    UsageLimitReached,
    Invalid,
}

impl DiscountError {
    pub fn kind(&self) -> DiscountErrorKind {
        match self {
            DiscountError::CodeNotFound(_) => DiscountErrorKind::CodeNotFound,
            DiscountError::Inactive => DiscountErrorKind::Inactive,
            DiscountError::Expired => DiscountErrorKind::Expired,
            DiscountError::MinSpendNotMet { .. } => DiscountErrorKind::MinSpendNotMet,
            DiscountError::MinItemsNotMet { .. } => DiscountErrorKind::MinItemsNotMet,
            DiscountError::UsageLimitReached { .. } => DiscountErrorKind::UsageLimitReached,
            DiscountError::Invalid(_) => DiscountErrorKind::Invalid,
        }
    }
}
