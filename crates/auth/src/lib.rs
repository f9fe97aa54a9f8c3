//! `stockroom-auth`: acting-user context and role capability checks.
//!
//! Authentication itself (token issuance, sessions) is owned elsewhere; this
//! crate only knows what a verified caller looks like and which roles may
//! invoke which operations. No HTTP, no storage.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::{Permission, permissions_for};
pub use principal::Actor;
pub use roles::Role;
