//! Role model - a named permission bundle, optionally tenant-scoped and
//! optionally inheriting from a single parent role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub tenant_id: Option<Uuid>,
    pub parent_role_id: Option<Uuid>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    /// Create a new role. `tenant_id = None` makes it system-wide.
    pub fn new(role_name: String, tenant_id: Option<Uuid>) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            role_name,
            tenant_id,
            parent_role_id: None,
            is_active: true,
            is_deleted: false,
            created_utc: Utc::now(),
        }
    }

    pub fn is_system_wide(&self) -> bool {
        self.tenant_id.is_none()
    }

    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

/// (role, permission) pair. Permission names are flat strings such as
/// `"Brands.ManageBranches"`; uniqueness per role is enforced on write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission: String,
}
