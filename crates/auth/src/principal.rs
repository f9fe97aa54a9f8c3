use serde::{Deserialize, Serialize};

use stockroom_core::{TenantId, UserId};

use crate::{Permission, Role, permissions_for};

/// The verified caller of a service operation.
///
/// Built once per request by the transport layer from the authenticated
/// identity and passed explicitly into services, which never consult ambient
/// request state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(user_id: UserId, tenant_id: TenantId, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            tenant_id,
            roles,
        }
    }

    pub fn permissions(&self) -> Vec<Permission> {
        permissions_for(&self.roles)
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}
