//! Tenant hierarchy operations: creation, traversal, reparenting with
//! module-access inheritance, and soft deletion.

use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::graph::TenantIndex;
use crate::models::{OutboxEvent, Tenant, TenantModule, TenantType};
use crate::store::Database;

#[derive(Clone)]
pub struct TenantHierarchyService {
    db: Database,
}

impl TenantHierarchyService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load every non-deleted tenant into an in-memory index.
    pub async fn load_index(&self) -> Result<TenantIndex, IdentityError> {
        let tenants = self.db.find_all_tenants().await?;
        Ok(TenantIndex::from_rows(tenants))
    }

    /// Create a tenant under an optional parent. The key must be unique; the
    /// store surfaces a duplicate as a conflict.
    pub async fn create_tenant(
        &self,
        name: String,
        key: String,
        tenant_type: TenantType,
        parent_tenant_id: Option<Uuid>,
        actor_user_id: Option<Uuid>,
    ) -> Result<Tenant, IdentityError> {
        if name.trim().is_empty() || key.trim().is_empty() {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "Tenant name and key are required"
            )));
        }

        if let Some(parent_id) = parent_tenant_id {
            let parent = self
                .db
                .find_tenant_by_id(parent_id)
                .await?
                .filter(|t| !t.is_deleted)
                .ok_or_else(|| {
                    IdentityError::NotFound(anyhow::anyhow!("Parent tenant not found"))
                })?;
            tracing::debug!(parent = %parent.tenant_key, "Creating tenant under parent");
        }

        let tenant = Tenant::new(name, key, tenant_type, parent_tenant_id);
        let event = OutboxEvent::new(
            "tenant.created",
            serde_json::json!({
                "tenant_id": tenant.tenant_id,
                "tenant_key": tenant.tenant_key,
                "tenant_type": tenant.tenant_type_code,
                "parent_tenant_id": tenant.parent_tenant_id,
            }),
            actor_user_id,
        );
        self.db.insert_tenant_with_event(&tenant, &event).await?;

        tracing::info!(tenant_id = %tenant.tenant_id, key = %tenant.tenant_key, "Tenant created");
        Ok(tenant)
    }

    /// The ancestor chain of a tenant, nearest first.
    pub async fn get_ancestors(&self, tenant_id: Uuid) -> Result<Vec<Tenant>, IdentityError> {
        let index = self.load_index().await?;
        if index.get(tenant_id).is_none() {
            return Err(IdentityError::NotFound(anyhow::anyhow!("Tenant not found")));
        }
        Ok(index.ancestors(tenant_id).into_iter().cloned().collect())
    }

    /// Move a branch under a different brand. Validation covers identity,
    /// no-op, cycle, and type-pairing rules; on success the branch inherits
    /// the new brand's active module subscriptions, all in one transaction.
    pub async fn reparent(
        &self,
        tenant_id: Uuid,
        new_parent_id: Uuid,
        actor_user_id: Option<Uuid>,
    ) -> Result<(), IdentityError> {
        let index = self.load_index().await?;
        index.validate_reparent(tenant_id, new_parent_id)?;

        let old_parent_id = index
            .get(tenant_id)
            .and_then(|t| t.parent_tenant_id);

        // Module inheritance: every module active on the new parent must be
        // active on the moved tenant.
        let parent_modules = self.db.find_tenant_modules(new_parent_id).await?;
        let own_modules = self.db.find_tenant_modules(tenant_id).await?;

        let mut to_create: Vec<TenantModule> = Vec::new();
        let mut to_reactivate: Vec<Uuid> = Vec::new();
        for parent_module in parent_modules.iter().filter(|m| m.has_access()) {
            match own_modules
                .iter()
                .find(|m| m.module_code == parent_module.module_code)
            {
                None => to_create.push(TenantModule::new(
                    tenant_id,
                    parent_module.module_code.clone(),
                )),
                Some(own) if !own.has_access() => to_reactivate.push(own.tenant_module_id),
                Some(_) => {}
            }
        }

        let event = OutboxEvent::new(
            "tenant.reparented",
            serde_json::json!({
                "tenant_id": tenant_id,
                "old_parent_id": old_parent_id,
                "new_parent_id": new_parent_id,
                "modules_granted": to_create.iter().map(|m| m.module_code.clone()).collect::<Vec<_>>(),
            }),
            actor_user_id,
        );

        self.db
            .reparent_tenant(tenant_id, new_parent_id, &to_create, &to_reactivate, &event)
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            new_parent_id = %new_parent_id,
            granted = to_create.len(),
            reactivated = to_reactivate.len(),
            "Tenant reparented"
        );
        Ok(())
    }

    /// Soft-delete a tenant. Refused while non-deleted children remain.
    pub async fn soft_delete(
        &self,
        tenant_id: Uuid,
        actor_user_id: Option<Uuid>,
    ) -> Result<(), IdentityError> {
        let tenant = self
            .db
            .find_tenant_by_id(tenant_id)
            .await?
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Tenant not found")))?;

        let children = self.db.count_undeleted_children(tenant_id).await?;
        if children > 0 {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "Tenant has {} active child tenant(s); delete or move them first",
                children
            )));
        }

        let event = OutboxEvent::new(
            "tenant.deleted",
            serde_json::json!({ "tenant_id": tenant_id, "tenant_key": tenant.tenant_key }),
            actor_user_id,
        );
        self.db.soft_delete_tenant(tenant_id, &event).await?;

        tracing::info!(tenant_id = %tenant_id, "Tenant soft-deleted");
        Ok(())
    }
}
