//! Order status lifecycle.
//!
//! ```text
//! Processing ──► Shipped ──► Delivered
//!     │             │            │
//!     ├──► Cancelled ◄┘          │
//!     └──────────► Refunded ◄────┘ (also from Shipped)
//! ```
//!
//! `Delivered` only moves on to `Refunded`; `Cancelled` and `Refunded` are
//! terminal.

use serde::{Deserialize, Serialize};

use stockroom_core::DomainError;

use crate::error::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }

    pub fn is_terminal(self) -> bool {
        OrderStatusMachine::next_states(self).is_empty()
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// The legal edges of the order lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStatusMachine;

impl OrderStatusMachine {
    pub fn next_states(from: OrderStatus) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match from {
            Processing => &[Shipped, Cancelled, Refunded],
            Shipped => &[Delivered, Cancelled, Refunded],
            Delivered => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        Self::next_states(from).contains(&to)
    }

    pub fn transition(from: OrderStatus, to: OrderStatus) -> Result<OrderStatus, OrderError> {
        if Self::can_transition(from, to) {
            Ok(to)
        } else {
            Err(OrderError::IllegalTransition { from, to })
        }
    }
}
