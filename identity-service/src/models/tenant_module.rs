//! Tenant module subscription - which platform modules a tenant can use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Module subscription entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantModule {
    pub tenant_module_id: Uuid,
    pub tenant_id: Uuid,
    pub module_code: String,
    pub is_active: bool,
    pub expiry_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl TenantModule {
    /// Create a new active subscription with no expiry.
    pub fn new(tenant_id: Uuid, module_code: String) -> Self {
        Self {
            tenant_module_id: Uuid::new_v4(),
            tenant_id,
            module_code,
            is_active: true,
            expiry_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Whether the tenant currently has access through this subscription.
    pub fn has_access(&self) -> bool {
        self.is_active && self.expiry_utc.map_or(true, |exp| exp > Utc::now())
    }
}
