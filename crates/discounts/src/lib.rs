//! Discount domain: codes, rules, eligibility conditions and usage counting.
//!
//! Eligibility is checked by [`Discount::evaluate`] (pure, usable for cart
//! previews). Spending a use is a separate step, [`Discount::reserve_use`],
//! run under a row lock at checkout commit time.

pub mod discount;
pub mod error;

pub use discount::{Discount, DiscountCode, DiscountConditions, DiscountId, DiscountRule, DiscountSnapshot, NewDiscount};
pub use error::{DiscountError, DiscountErrorKind};
