//! Role graph index: recursive permission lookup over the single-parent
//! role hierarchy.

use std::collections::{BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use crate::models::{Role, RolePermission};

/// Id-indexed snapshot of the role and role-permission tables.
///
/// Parent-chain cycles are rejected on write, but reads still carry a visited
/// set so corrupted data (e.g. a bad bulk import) degrades to a truncated
/// result instead of an infinite loop.
#[derive(Debug, Default)]
pub struct RoleIndex {
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, BTreeSet<String>>,
}

impl RoleIndex {
    pub fn from_rows(roles: Vec<Role>, permissions: Vec<RolePermission>) -> Self {
        let mut index = Self {
            roles: roles.into_iter().map(|r| (r.role_id, r)).collect(),
            permissions: HashMap::new(),
        };
        for rp in permissions {
            index
                .permissions
                .entry(rp.role_id)
                .or_default()
                .insert(rp.permission);
        }
        index
    }

    pub fn get(&self, role_id: Uuid) -> Option<&Role> {
        self.roles.get(&role_id)
    }

    /// Own permissions unioned with every ancestor's, deduplicated.
    pub fn all_permissions(&self, role_id: Uuid) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut current = Some(role_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                tracing::warn!(role_id = %role_id, "Cycle detected in role hierarchy; stopping traversal");
                break;
            }
            if let Some(perms) = self.permissions.get(&id) {
                result.extend(perms.iter().cloned());
            }
            current = self.roles.get(&id).and_then(|r| r.parent_role_id);
        }

        result
    }

    /// Whether the role has a permission directly or through its parent chain.
    pub fn has_permission(&self, role_id: Uuid, permission: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(role_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                tracing::warn!(role_id = %role_id, "Cycle detected in role hierarchy; stopping traversal");
                return false;
            }
            if self
                .permissions
                .get(&id)
                .is_some_and(|p| p.contains(permission))
            {
                return true;
            }
            current = self.roles.get(&id).and_then(|r| r.parent_role_id);
        }

        false
    }

    /// Union of `all_permissions` across several roles.
    pub fn union_permissions<'a, I>(&self, role_ids: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a Uuid>,
    {
        let mut result = BTreeSet::new();
        for role_id in role_ids {
            result.extend(self.all_permissions(*role_id));
        }
        result
    }

    /// Whether setting `candidate_parent_id` as the parent of `role_id` would
    /// close a cycle. Walks the candidate's ancestor chain looking for the
    /// role itself.
    pub fn would_create_cycle(&self, role_id: Uuid, candidate_parent_id: Uuid) -> bool {
        if role_id == candidate_parent_id {
            return true;
        }

        let mut visited = HashSet::new();
        let mut current = Some(candidate_parent_id);
        while let Some(id) = current {
            if id == role_id {
                return true;
            }
            if !visited.insert(id) {
                // Existing corruption; refuse the write regardless.
                return true;
            }
            current = self.roles.get(&id).and_then(|r| r.parent_role_id);
        }

        false
    }
}
