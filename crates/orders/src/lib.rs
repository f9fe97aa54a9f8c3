//! Orders domain: carts, placed orders and the order status lifecycle.
//!
//! Pure business rules (no IO). Placing an order only builds the record; the
//! stock and discount side effects are coordinated by the checkout
//! orchestrator in `stockroom-infra`.

pub mod error;
pub mod order;
pub mod status;

pub use error::OrderError;
pub use order::{
    AppliedDiscount, Cart, CartItem, CustomerDetails, NewOrder, Order, OrderId, OrderItem,
    OrderSnapshot,
};
pub use status::{OrderStatus, OrderStatusMachine};
