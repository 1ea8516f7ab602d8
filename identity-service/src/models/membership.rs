//! User-tenant-role membership - the edge the permission resolver walks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Membership edge binding a user to a role within a tenant.
/// `tenant_id = None` marks a system-wide role membership.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserTenantRole {
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role_id: Uuid,
    pub is_default: bool,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl UserTenantRole {
    pub fn new(user_id: Uuid, tenant_id: Option<Uuid>, role_id: Uuid, is_default: bool) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            user_id,
            tenant_id,
            role_id,
            is_default,
            is_active: true,
            created_utc: Utc::now(),
        }
    }
}
