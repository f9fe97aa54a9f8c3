use thiserror::Error;

use crate::{Actor, Permission};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Check that `actor` holds `required` (or the wildcard).
///
/// Pure policy check: no IO, no panics.
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    let granted = actor
        .permissions()
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use stockroom_core::{TenantId, UserId};

    fn actor(roles: Vec<Role>) -> Actor {
        Actor::new(UserId::new(), TenantId::new(), roles)
    }

    #[test]
    fn staff_may_checkout() {
        assert!(authorize(&actor(vec![Role::STAFF]), &Permission::ORDERS_CHECKOUT).is_ok());
    }

    #[test]
    fn staff_may_not_refund() {
        assert_eq!(
            authorize(&actor(vec![Role::STAFF]), &Permission::ORDERS_REFUND),
            Err(AuthzError::Forbidden("orders.refund".to_string()))
        );
    }

    #[test]
    fn admin_may_do_anything() {
        let admin = actor(vec![Role::ADMIN]);
        assert!(authorize(&admin, &Permission::INVENTORY_ADJUST).is_ok());
        assert!(authorize(&admin, &Permission::new("reports.export")).is_ok());
    }

    #[test]
    fn no_roles_no_access() {
        assert!(authorize(&actor(vec![]), &Permission::ORDERS_READ).is_err());
    }
}
