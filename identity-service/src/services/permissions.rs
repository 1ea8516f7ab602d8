//! Effective-permission resolution.

use std::collections::BTreeSet;

use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::graph::RoleIndex;
use crate::models::TenantType;
use crate::store::Database;

/// Permissions grantable at the platform root.
pub const SYSTEM_PERMISSIONS: &[&str] = &[
    "Bookings.Manage",
    "Bookings.View",
    "Branches.Edit",
    "Branches.View",
    "Brands.Edit",
    "Brands.ManageBranches",
    "Brands.View",
    "Customers.Manage",
    "Customers.View",
    "Reports.View",
    "Staff.Manage",
    "Staff.View",
    "System.ManageModules",
    "System.ManageRoles",
    "System.ManageTenants",
    "Users.Manage",
];

/// Permissions grantable to brand-level roles.
pub const BRAND_PERMISSIONS: &[&str] = &[
    "Bookings.Manage",
    "Bookings.View",
    "Branches.Edit",
    "Branches.View",
    "Brands.Edit",
    "Brands.ManageBranches",
    "Brands.View",
    "Customers.Manage",
    "Customers.View",
    "Reports.View",
    "Staff.Manage",
    "Staff.View",
];

/// Permissions grantable to branch-level roles and below.
pub const BRANCH_PERMISSIONS: &[&str] = &[
    "Bookings.Manage",
    "Bookings.View",
    "Branches.Edit",
    "Branches.View",
    "Customers.Manage",
    "Customers.View",
    "Staff.View",
];

/// The permissions a role scoped to the given tenant type may carry.
pub fn allowed_permissions_for(tenant_type: TenantType) -> &'static [&'static str] {
    match tenant_type {
        TenantType::System => SYSTEM_PERMISSIONS,
        TenantType::Brand => BRAND_PERMISSIONS,
        TenantType::Branch
        | TenantType::Department
        | TenantType::Team
        | TenantType::Project
        | TenantType::Custom => BRANCH_PERMISSIONS,
    }
}

/// Resolves the effective permission set a user holds in a tenant.
#[derive(Clone)]
pub struct PermissionResolver {
    db: Database,
}

impl PermissionResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load the full role graph into an in-memory index.
    pub async fn load_role_index(&self) -> Result<RoleIndex, IdentityError> {
        let roles = self.db.find_all_roles().await?;
        let permissions = self.db.find_all_role_permissions().await?;
        Ok(RoleIndex::from_rows(roles, permissions))
    }

    /// The union of permissions across the user's active roles in a tenant,
    /// including inherited role permissions. When `tenant_id` is None, or the
    /// user has no membership in the named tenant, system-wide memberships
    /// apply instead. A user with no applicable roles resolves to an empty
    /// set rather than an error.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> Result<BTreeSet<String>, IdentityError> {
        let index = self.load_role_index().await?;
        self.resolve_with_index(&index, user_id, tenant_id).await
    }

    /// Same as [`resolve`](Self::resolve) but reuses a caller-held role
    /// index, for flows that resolve permissions more than once.
    pub async fn resolve_with_index(
        &self,
        index: &RoleIndex,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> Result<BTreeSet<String>, IdentityError> {
        let memberships = match tenant_id {
            Some(tenant_id) => {
                let scoped = self
                    .db
                    .find_active_memberships_in_tenant(user_id, tenant_id)
                    .await?;
                if scoped.is_empty() {
                    self.db.find_system_memberships(user_id).await?
                } else {
                    scoped
                }
            }
            None => self.db.find_system_memberships(user_id).await?,
        };

        let role_ids: Vec<Uuid> = memberships
            .iter()
            .filter(|m| {
                index
                    .get(m.role_id)
                    .map(|r| r.is_usable())
                    .unwrap_or(false)
            })
            .map(|m| m.role_id)
            .collect();

        Ok(index.union_permissions(&role_ids))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_allow_list_is_subset_of_system() {
        for p in BRAND_PERMISSIONS {
            assert!(SYSTEM_PERMISSIONS.contains(p), "missing {}", p);
        }
    }

    #[test]
    fn branch_allow_list_is_subset_of_brand() {
        for p in BRANCH_PERMISSIONS {
            assert!(BRAND_PERMISSIONS.contains(p), "missing {}", p);
        }
    }

    #[test]
    fn sub_brand_types_share_the_branch_allow_list() {
        assert_eq!(
            allowed_permissions_for(TenantType::Department),
            BRANCH_PERMISSIONS
        );
        assert_eq!(allowed_permissions_for(TenantType::Team), BRANCH_PERMISSIONS);
        assert_eq!(
            allowed_permissions_for(TenantType::Custom),
            BRANCH_PERMISSIONS
        );
    }

    #[test]
    fn system_allow_list_covers_administration() {
        assert!(SYSTEM_PERMISSIONS.contains(&"System.ManageTenants"));
        assert!(SYSTEM_PERMISSIONS.contains(&"System.ManageRoles"));
        assert!(!BRAND_PERMISSIONS.contains(&"System.ManageTenants"));
    }
}
