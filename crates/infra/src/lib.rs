//! Infrastructure layer: storage backends and the transactional services that
//! drive the domain crates.
//!
//! - [`store`] holds the repository traits and the unit-of-work abstraction,
//!   with an in-memory and a Postgres implementation.
//! - [`ledger`], [`discount_engine`], [`checkout`] and [`order_service`] are
//!   the service entry points used by the HTTP layer.

pub mod checkout;
pub mod config;
pub mod discount_engine;
pub mod error;
pub mod ledger;
pub mod order_service;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use checkout::{CheckoutOrchestrator, CheckoutRequest};
pub use config::{AppConfig, CheckoutConfig, ConfigError};
pub use discount_engine::{CreateDiscount, DiscountEngine, DiscountQuote};
pub use error::{ServiceError, ServiceResult};
pub use ledger::{CreateItem, InventoryLedger, StockChange};
pub use order_service::OrderService;
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, UnitOfWork};
