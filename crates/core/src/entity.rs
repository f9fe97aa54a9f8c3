//! Entity trait: identity + tenant ownership.

use crate::id::TenantId;

/// A tenant-owned record with a stable identity.
///
/// Every persisted row in stockroom belongs to exactly one tenant; stores use
/// `tenant_id()` as part of every key so cross-tenant reads are impossible.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;

    fn tenant_id(&self) -> TenantId;
}
