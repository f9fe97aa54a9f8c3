//! `stockroom-core`: shared domain building blocks.
//!
//! Pure types only: identifiers, money, the domain error model. No IO.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, TenantId, UserId};
pub use money::Money;
pub use value_object::ValueObject;

#[doc(hidden)]
pub use uuid;
