//! Tenant model - a node in the organizational hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Structural kind of a tenant node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantType {
    System,
    Brand,
    Branch,
    Department,
    Team,
    Project,
    Custom,
}

impl TenantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantType::System => "system",
            TenantType::Brand => "brand",
            TenantType::Branch => "branch",
            TenantType::Department => "department",
            TenantType::Team => "team",
            TenantType::Project => "project",
            TenantType::Custom => "custom",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "system" => Some(TenantType::System),
            "brand" => Some(TenantType::Brand),
            "branch" => Some(TenantType::Branch),
            "department" => Some(TenantType::Department),
            "team" => Some(TenantType::Team),
            "project" => Some(TenantType::Project),
            "custom" => Some(TenantType::Custom),
            _ => None,
        }
    }

    /// Claim key derived from the tenant type, e.g. `brand` -> `brand_id`.
    pub fn claim_key(&self) -> String {
        format!("{}_id", self.as_str())
    }

    /// Whether a tenant of this type may be moved under a parent of the given
    /// type. Only Branch-under-Brand reassignment is modeled; every other
    /// pairing is structurally rejected.
    pub fn reparentable_under(&self, parent: TenantType) -> bool {
        matches!((self, parent), (TenantType::Branch, TenantType::Brand))
    }
}

/// Tenant lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Archived,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Archived => "archived",
        }
    }
}

/// Tenant entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub tenant_key: String,
    pub tenant_type_code: String,
    pub parent_tenant_id: Option<Uuid>,
    pub status_code: String,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant. The key is normalized to lowercase.
    pub fn new(
        name: String,
        key: String,
        tenant_type: TenantType,
        parent_tenant_id: Option<Uuid>,
    ) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            tenant_name: name,
            tenant_key: key.to_lowercase(),
            tenant_type_code: tenant_type.as_str().to_string(),
            parent_tenant_id,
            status_code: TenantStatus::Active.as_str().to_string(),
            is_deleted: false,
            created_utc: Utc::now(),
        }
    }

    pub fn tenant_type(&self) -> Option<TenantType> {
        TenantType::parse(&self.tenant_type_code)
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted && self.status_code == TenantStatus::Active.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_normalized_to_lowercase() {
        let tenant = Tenant::new("Acme".into(), "ACME-Main".into(), TenantType::Brand, None);
        assert_eq!(tenant.tenant_key, "acme-main");
    }

    #[test]
    fn claim_key_follows_type() {
        assert_eq!(TenantType::Brand.claim_key(), "brand_id");
        assert_eq!(TenantType::Branch.claim_key(), "branch_id");
        assert_eq!(TenantType::System.claim_key(), "system_id");
    }

    #[test]
    fn only_branch_under_brand_is_reparentable() {
        assert!(TenantType::Branch.reparentable_under(TenantType::Brand));
        assert!(!TenantType::Branch.reparentable_under(TenantType::Branch));
        assert!(!TenantType::Brand.reparentable_under(TenantType::System));
        assert!(!TenantType::Department.reparentable_under(TenantType::Brand));
    }

    #[test]
    fn type_codes_round_trip() {
        for t in [
            TenantType::System,
            TenantType::Brand,
            TenantType::Branch,
            TenantType::Department,
            TenantType::Team,
            TenantType::Project,
            TenantType::Custom,
        ] {
            assert_eq!(TenantType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TenantType::parse("franchise"), None);
    }
}
