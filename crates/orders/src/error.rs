use thiserror::Error;

use stockroom_core::DomainError;

use crate::status::OrderStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Empty cart or a line with a non-positive quantity. `field` points at
    /// the offending part of the request (e.g. `cart[1].quantity`).
    #[error("invalid cart ({field}): {message}")]
    InvalidCart { field: String, message: String },

    #[error("invalid customer details ({field}): {message}")]
    InvalidCustomer { field: String, message: String },

    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl OrderError {
    pub(crate) fn cart(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCart {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn customer(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCustomer {
            field: field.into(),
            message: message.into(),
        }
    }
}
