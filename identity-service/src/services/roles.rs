//! Role management: permission grants, role inheritance, and role
//! assignment, with allow-list enforcement by tenant type.

use chrono::Utc;
use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::models::{OutboxEvent, Role, UserTenantRole};
use crate::services::permissions::allowed_permissions_for;
use crate::store::Database;

#[derive(Clone)]
pub struct RoleService {
    db: Database,
}

impl RoleService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a role, optionally scoped to a tenant. A role with no tenant is
    /// system-wide.
    pub async fn create_role(
        &self,
        role_name: String,
        tenant_id: Option<Uuid>,
    ) -> Result<Role, IdentityError> {
        if role_name.trim().is_empty() {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "Role name is required"
            )));
        }
        if let Some(tenant_id) = tenant_id {
            self.db
                .find_tenant_by_id(tenant_id)
                .await?
                .filter(|t| !t.is_deleted)
                .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Tenant not found")))?;
        }

        let role = Role::new(role_name, tenant_id);
        self.db.insert_role(&role).await?;
        tracing::info!(role_id = %role.role_id, name = %role.role_name, "Role created");
        Ok(role)
    }

    /// Grant a permission to a role. Idempotent; the change event is only
    /// recorded when the grant actually changed anything. The permission must
    /// be on the allow-list for the role's tenant type.
    pub async fn add_permission(
        &self,
        role_id: Uuid,
        permission: &str,
        actor_user_id: Option<Uuid>,
    ) -> Result<bool, IdentityError> {
        let role = self.require_role(role_id).await?;
        self.check_allow_list(&role, permission).await?;

        let event = self
            .permission_event(&role, permission, "added", actor_user_id)
            .await?;
        let changed = self.db.add_role_permission(role_id, permission, &event).await?;
        if changed {
            tracing::info!(role_id = %role_id, permission = %permission, "Permission added");
        }
        Ok(changed)
    }

    /// Revoke a permission from a role. Idempotent, event on change only.
    pub async fn remove_permission(
        &self,
        role_id: Uuid,
        permission: &str,
        actor_user_id: Option<Uuid>,
    ) -> Result<bool, IdentityError> {
        let role = self.require_role(role_id).await?;

        let event = self
            .permission_event(&role, permission, "removed", actor_user_id)
            .await?;
        let changed = self
            .db
            .remove_role_permission(role_id, permission, &event)
            .await?;
        if changed {
            tracing::info!(role_id = %role_id, permission = %permission, "Permission removed");
        }
        Ok(changed)
    }

    /// Set or clear a role's parent. A parent assignment that would close a
    /// cycle in the inheritance chain is rejected.
    pub async fn set_parent_role(
        &self,
        role_id: Uuid,
        parent_role_id: Option<Uuid>,
    ) -> Result<(), IdentityError> {
        self.require_role(role_id).await?;

        if let Some(parent_id) = parent_role_id {
            self.require_role(parent_id).await?;

            let roles = self.db.find_all_roles().await?;
            let permissions = self.db.find_all_role_permissions().await?;
            let index = crate::graph::RoleIndex::from_rows(roles, permissions);
            if index.would_create_cycle(role_id, parent_id) {
                return Err(IdentityError::Validation(anyhow::anyhow!(
                    "Parent assignment would create an inheritance cycle"
                )));
            }
        }

        self.db.set_role_parent(role_id, parent_role_id).await?;
        Ok(())
    }

    /// Assign a role to a user within a tenant (or system-wide when
    /// `tenant_id` is None). A tenant-scoped role can only be assigned within
    /// its own tenant. Duplicate assignments surface as conflicts.
    pub async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        role_id: Uuid,
        is_default: bool,
    ) -> Result<UserTenantRole, IdentityError> {
        let role = self.require_role(role_id).await?;

        self.db
            .find_user_by_id(user_id)
            .await?
            .filter(|u| u.is_usable())
            .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("User not found")))?;

        match (tenant_id, role.tenant_id) {
            (Some(assignment_tenant), Some(role_tenant)) if assignment_tenant != role_tenant => {
                return Err(IdentityError::Validation(anyhow::anyhow!(
                    "Role belongs to a different tenant"
                )));
            }
            (None, Some(_)) => {
                return Err(IdentityError::Validation(anyhow::anyhow!(
                    "A tenant-scoped role cannot be assigned system-wide"
                )));
            }
            _ => {}
        }

        if let Some(tenant_id) = tenant_id {
            let tenant = self
                .db
                .find_tenant_by_id(tenant_id)
                .await?
                .filter(|t| !t.is_deleted)
                .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Tenant not found")))?;

            // The role's full permission set, inherited included, must fit
            // the allow-list of the target tenant's type.
            let tenant_type = tenant.tenant_type().ok_or_else(|| {
                IdentityError::Validation(anyhow::anyhow!(
                    "Unknown tenant type: {}",
                    tenant.tenant_type_code
                ))
            })?;
            let allowed = allowed_permissions_for(tenant_type);
            let roles = self.db.find_all_roles().await?;
            let permissions = self.db.find_all_role_permissions().await?;
            let index = crate::graph::RoleIndex::from_rows(roles, permissions);
            for permission in index.all_permissions(role_id) {
                if !allowed.contains(&permission.as_str()) {
                    return Err(IdentityError::Validation(anyhow::anyhow!(
                        "Role {} carries permission {} which is not grantable in a {} tenant",
                        role.role_name,
                        permission,
                        tenant.tenant_type_code
                    )));
                }
            }
        }

        let membership = UserTenantRole::new(user_id, tenant_id, role_id, is_default);
        self.db.insert_membership(&membership).await?;
        tracing::info!(user_id = %user_id, role_id = %role_id, "Role assigned");
        Ok(membership)
    }

    async fn require_role(&self, role_id: Uuid) -> Result<Role, IdentityError> {
        self.db
            .find_role_by_id(role_id)
            .await?
            .filter(|r| r.is_usable())
            .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Role not found")))
    }

    /// A role scoped to a tenant may only carry permissions from that tenant
    /// type's allow-list. System-wide roles may carry anything.
    async fn check_allow_list(&self, role: &Role, permission: &str) -> Result<(), IdentityError> {
        let Some(tenant_id) = role.tenant_id else {
            return Ok(());
        };
        let tenant = self
            .db
            .find_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Tenant not found")))?;
        let tenant_type = tenant.tenant_type().ok_or_else(|| {
            IdentityError::Validation(anyhow::anyhow!(
                "Unknown tenant type: {}",
                tenant.tenant_type_code
            ))
        })?;

        if !allowed_permissions_for(tenant_type).contains(&permission) {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "Permission {} is not grantable to {} roles",
                permission,
                tenant.tenant_type_code
            )));
        }
        Ok(())
    }

    async fn permission_event(
        &self,
        role: &Role,
        permission: &str,
        change: &str,
        actor_user_id: Option<Uuid>,
    ) -> Result<OutboxEvent, IdentityError> {
        Ok(OutboxEvent::new(
            "role.permissions_changed",
            serde_json::json!({
                "role_id": role.role_id,
                "role_name": role.role_name,
                "tenant_id": role.tenant_id,
                "permission": permission,
                "change": change,
                "changed_utc": Utc::now(),
            }),
            actor_user_id,
        ))
    }
}
