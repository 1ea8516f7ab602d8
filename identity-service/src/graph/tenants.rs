//! Tenant hierarchy index: ancestor walks and reparent validation.

use std::collections::{HashMap, HashSet};

use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::models::Tenant;

/// Id-indexed snapshot of the tenant table.
#[derive(Debug, Default)]
pub struct TenantIndex {
    nodes: HashMap<Uuid, Tenant>,
}

impl TenantIndex {
    pub fn from_rows(rows: Vec<Tenant>) -> Self {
        Self {
            nodes: rows.into_iter().map(|t| (t.tenant_id, t)).collect(),
        }
    }

    pub fn get(&self, tenant_id: Uuid) -> Option<&Tenant> {
        self.nodes.get(&tenant_id)
    }

    /// Ordered ancestor chain, nearest parent first. Stops if the parent
    /// pointers ever loop back on themselves.
    pub fn ancestors(&self, tenant_id: Uuid) -> Vec<&Tenant> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([tenant_id]);

        let mut current = self.nodes.get(&tenant_id).and_then(|t| t.parent_tenant_id);
        while let Some(id) = current {
            if !visited.insert(id) {
                tracing::warn!(tenant_id = %tenant_id, "Cycle detected in tenant parent chain; stopping traversal");
                break;
            }
            match self.nodes.get(&id) {
                Some(tenant) => {
                    chain.push(tenant);
                    current = tenant.parent_tenant_id;
                }
                None => break,
            }
        }

        chain
    }

    /// Whether a tenant has children that are not soft-deleted.
    pub fn has_undeleted_children(&self, tenant_id: Uuid) -> bool {
        self.nodes
            .values()
            .any(|t| t.parent_tenant_id == Some(tenant_id) && !t.is_deleted)
    }

    /// Validate moving `tenant_id` under `new_parent_id`.
    ///
    /// Rejected: unknown ids, self-parenting, the current parent, a new parent
    /// whose ancestor chain contains the tenant (cycle), and any type pairing
    /// other than Branch under Brand.
    pub fn validate_reparent(
        &self,
        tenant_id: Uuid,
        new_parent_id: Uuid,
    ) -> Result<(), IdentityError> {
        let tenant = self
            .get(tenant_id)
            .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Tenant not found")))?;
        let new_parent = self
            .get(new_parent_id)
            .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Parent tenant not found")))?;

        if tenant_id == new_parent_id {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "A tenant cannot be its own parent"
            )));
        }

        if tenant.parent_tenant_id == Some(new_parent_id) {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "Tenant is already assigned to this parent"
            )));
        }

        if self
            .ancestors(new_parent_id)
            .iter()
            .any(|a| a.tenant_id == tenant_id)
        {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "Reassignment would create a cycle in the tenant hierarchy"
            )));
        }

        let tenant_type = tenant.tenant_type().ok_or_else(|| {
            IdentityError::Validation(anyhow::anyhow!(
                "Unknown tenant type: {}",
                tenant.tenant_type_code
            ))
        })?;
        let parent_type = new_parent.tenant_type().ok_or_else(|| {
            IdentityError::Validation(anyhow::anyhow!(
                "Unknown tenant type: {}",
                new_parent.tenant_type_code
            ))
        })?;

        if !tenant_type.reparentable_under(parent_type) {
            return Err(IdentityError::Validation(anyhow::anyhow!(
                "A {} tenant cannot be reassigned under a {} tenant",
                tenant_type.as_str(),
                parent_type.as_str()
            )));
        }

        Ok(())
    }
}
