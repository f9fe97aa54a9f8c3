//! Bridge from request context to the service-level caller.
//!
//! Handlers build an [`Actor`] once per request and pass it to infra
//! services, which run the capability checks themselves.

use stockroom_auth::Actor;

use crate::context::{PrincipalContext, TenantContext};

pub fn actor(tenant: &TenantContext, principal: &PrincipalContext) -> Actor {
    Actor::new(principal.user_id(), tenant.tenant_id(), principal.roles().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_auth::{Permission, Role, authorize};
    use stockroom_core::{TenantId, UserId};

    #[test]
    fn actor_carries_tenant_and_roles() {
        let tenant = TenantContext::new(TenantId::new());
        let principal = PrincipalContext::new(UserId::new(), vec![Role::STAFF]);

        let actor = actor(&tenant, &principal);
        assert_eq!(actor.tenant_id, tenant.tenant_id());
        assert_eq!(actor.user_id, principal.user_id());
        assert!(authorize(&actor, &Permission::ORDERS_CHECKOUT).is_ok());
        assert!(authorize(&actor, &Permission::INVENTORY_CREATE).is_err());
    }
}
