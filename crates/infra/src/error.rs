//! The single error type surfaced by infra services.
//!
//! Domain errors from every crate fold into [`ServiceError`]; the HTTP layer
//! maps its variants onto status codes.

use thiserror::Error;

use stockroom_auth::AuthzError;
use stockroom_core::DomainError;
use stockroom_discounts::DiscountError;
use stockroom_inventory::{InventoryError, InventoryItemId};
use stockroom_orders::{OrderError, OrderStatus};

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Unauthorized(#[from] AuthzError),

    #[error("validation failed ({field}): {message}")]
    Validation { field: String, message: String },

    #[error("invalid cart ({field}): {message}")]
    InvalidCart { field: String, message: String },

    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: InventoryItemId,
        available: i64,
        requested: i64,
    },

    #[error(transparent)]
    Discount(DiscountError),

    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Transient contention that outlived the retry budget.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The checkout deadline passed before commit; nothing was written.
    #[error("checkout did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("store failure: {0}")]
    Store(String),
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether a retry of the whole unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::Overflow(msg) => ServiceError::validation("request", msg),
        }
    }
}

impl From<InventoryError> for ServiceError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock {
                item_id,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                item_id,
                available,
                requested,
            },
            InventoryError::ItemNotFound(id) => ServiceError::not_found("inventory item", id),
            InventoryError::Domain(e) => e.into(),
        }
    }
}

impl From<DiscountError> for ServiceError {
    fn from(err: DiscountError) -> Self {
        match err {
            DiscountError::Invalid(e) => e.into(),
            other => ServiceError::Discount(other),
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidCart { field, message } => ServiceError::InvalidCart { field, message },
            OrderError::InvalidCustomer { field, message } => ServiceError::Validation { field, message },
            OrderError::IllegalTransition { from, to } => ServiceError::IllegalTransition { from, to },
            OrderError::Domain(e) => e.into(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Duplicate(msg) => ServiceError::Duplicate(msg),
            other => ServiceError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_keeps_its_numbers() {
        let item_id = InventoryItemId::new();
        let err: ServiceError = InventoryError::InsufficientStock {
            item_id,
            available: 1,
            requested: 2,
        }
        .into();
        assert_eq!(
            err,
            ServiceError::InsufficientStock {
                item_id,
                available: 1,
                requested: 2
            }
        );
    }

    #[test]
    fn discount_domain_errors_become_validation() {
        let err: ServiceError = DiscountError::Invalid(DomainError::validation("percent out of range")).into();
        assert!(matches!(err, ServiceError::Validation { .. }));

        let err: ServiceError = DiscountError::Expired.into();
        assert_eq!(err, ServiceError::Discount(DiscountError::Expired));
    }

    #[test]
    fn store_conflict_is_transient() {
        let err: ServiceError = StoreError::Conflict("40001".into()).into();
        assert!(err.is_transient());
        let err: ServiceError = StoreError::Backend("boom".into()).into();
        assert!(!err.is_transient());
    }
}
