use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Capability required to run an operation (e.g. `"orders.checkout"`).
///
/// The wildcard `"*"` grants everything and is only handed to admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission(Cow::Borrowed("*"));

    pub const ORDERS_CHECKOUT: Permission = Permission(Cow::Borrowed("orders.checkout"));
    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("orders.read"));
    pub const ORDERS_UPDATE_STATUS: Permission = Permission(Cow::Borrowed("orders.update_status"));
    pub const ORDERS_REFUND: Permission = Permission(Cow::Borrowed("orders.refund"));

    pub const DISCOUNTS_VALIDATE: Permission = Permission(Cow::Borrowed("discounts.validate"));
    pub const DISCOUNTS_READ: Permission = Permission(Cow::Borrowed("discounts.read"));
    pub const DISCOUNTS_MANAGE: Permission = Permission(Cow::Borrowed("discounts.manage"));

    pub const INVENTORY_READ: Permission = Permission(Cow::Borrowed("inventory.read"));
    pub const INVENTORY_CREATE: Permission = Permission(Cow::Borrowed("inventory.items.create"));
    pub const INVENTORY_RESTOCK: Permission = Permission(Cow::Borrowed("inventory.stock.restock"));
    pub const INVENTORY_ADJUST: Permission = Permission(Cow::Borrowed("inventory.stock.adjust"));
    pub const INVENTORY_PRICE: Permission = Permission(Cow::Borrowed("inventory.items.price"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

const STAFF_PERMISSIONS: &[Permission] = &[
    Permission::ORDERS_CHECKOUT,
    Permission::ORDERS_READ,
    Permission::ORDERS_UPDATE_STATUS,
    Permission::DISCOUNTS_VALIDATE,
    Permission::DISCOUNTS_READ,
    Permission::INVENTORY_READ,
];

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::ORDERS_REFUND,
    Permission::DISCOUNTS_MANAGE,
    Permission::INVENTORY_CREATE,
    Permission::INVENTORY_RESTOCK,
    Permission::INVENTORY_ADJUST,
    Permission::INVENTORY_PRICE,
];

/// Effective permissions for a set of roles.
///
/// staff ⊂ manager ⊂ admin. Admin resolves to the wildcard.
pub fn permissions_for(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == Role::ADMIN.as_str()) {
        return vec![Permission::ALL];
    }

    let manager = roles.iter().any(|r| r.as_str() == Role::MANAGER.as_str());
    let staff = manager || roles.iter().any(|r| r.as_str() == Role::STAFF.as_str());

    let mut perms = Vec::new();
    if staff {
        perms.extend_from_slice(STAFF_PERMISSIONS);
    }
    if manager {
        perms.extend_from_slice(MANAGER_PERMISSIONS);
    }
    perms
}
