//! Authentication-context claim assembly.
//!
//! The context is membership-driven: every active tenant membership
//! contributes one claim keyed by the tenant's type (`brand_id`,
//! `branch_id`, ...), so a user active in two brands carries two `brand_id`
//! claims. Permission claims are the deduplicated union across the distinct
//! roles of those memberships.

use std::collections::BTreeSet;

use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::graph::{RoleIndex, TenantIndex};
use crate::models::{TenantType, User};
use crate::services::signer::Claim;
use crate::store::Database;

#[derive(Clone)]
pub struct ClaimsBuilder {
    db: Database,
}

impl ClaimsBuilder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The full authentication context for a user: identity claims, one
    /// type-keyed claim per distinct active tenant membership, and the
    /// permission union across every role those memberships carry.
    pub async fn build_claims(&self, user: &User) -> Result<Vec<Claim>, IdentityError> {
        let mut claims = self.identity_and_tenant_claims(user).await?;

        let memberships = self.db.find_active_memberships(user.user_id).await?;
        let role_ids: BTreeSet<Uuid> = memberships.iter().map(|m| m.role_id).collect();

        let roles = self.db.find_all_roles().await?;
        let permissions = self.db.find_all_role_permissions().await?;
        let index = RoleIndex::from_rows(roles, permissions);

        let usable: Vec<Uuid> = role_ids
            .into_iter()
            .filter(|id| index.get(*id).map(|r| r.is_usable()).unwrap_or(false))
            .collect();
        for permission in index.union_permissions(&usable) {
            claims.push(Claim::new("permission", permission));
        }

        Ok(claims)
    }

    /// Identity claims plus the type-keyed tenant claims, without any
    /// permissions. Token issuance layers context-scoped permission claims
    /// on top of this.
    pub async fn identity_and_tenant_claims(
        &self,
        user: &User,
    ) -> Result<Vec<Claim>, IdentityError> {
        let memberships = self.db.find_active_memberships(user.user_id).await?;
        let tenants = self.db.find_all_tenants().await?;
        let index = TenantIndex::from_rows(tenants);

        let mut tenant_refs: Vec<(TenantType, Uuid)> = Vec::new();
        for membership in &memberships {
            let Some(tenant_id) = membership.tenant_id else {
                continue;
            };
            let Some(tenant) = index.get(tenant_id).filter(|t| t.is_active()) else {
                continue;
            };
            if let Some(tenant_type) = tenant.tenant_type() {
                tenant_refs.push((tenant_type, tenant_id));
            }
        }

        Ok(assemble_identity_claims(user, &tenant_refs))
    }
}

/// Pure assembly of the identity and tenant claims. Name claims are always
/// present, empty when unset; duplicate (type, tenant) pairs collapse.
pub fn assemble_identity_claims(user: &User, tenant_refs: &[(TenantType, Uuid)]) -> Vec<Claim> {
    let mut claims = vec![
        Claim::new("user_id", user.user_id.to_string()),
        Claim::new("email", user.email.clone()),
        Claim::new("given_name", user.given_name.clone().unwrap_or_default()),
        Claim::new("family_name", user.family_name.clone().unwrap_or_default()),
    ];

    let mut seen = BTreeSet::new();
    for (tenant_type, tenant_id) in tenant_refs {
        if seen.insert((*tenant_type, *tenant_id)) {
            claims.push(Claim::new(tenant_type.claim_key(), tenant_id.to_string()));
        }
    }

    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(
            "ana@example.com".to_string(),
            Some("Ana".to_string()),
            Some("Silva".to_string()),
        )
    }

    fn values(claims: &[Claim], key: &str) -> Vec<String> {
        claims
            .iter()
            .filter(|c| c.key == key)
            .map(|c| c.value.clone())
            .collect()
    }

    #[test]
    fn one_claim_per_membership_keyed_by_tenant_type() {
        let brand = Uuid::new_v4();
        let branch = Uuid::new_v4();
        let claims = assemble_identity_claims(
            &user(),
            &[(TenantType::Brand, brand), (TenantType::Branch, branch)],
        );

        assert_eq!(values(&claims, "brand_id"), vec![brand.to_string()]);
        assert_eq!(values(&claims, "branch_id"), vec![branch.to_string()]);
    }

    #[test]
    fn two_tenants_of_the_same_type_repeat_the_key() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let claims = assemble_identity_claims(
            &user(),
            &[(TenantType::Brand, a), (TenantType::Brand, b)],
        );
        assert_eq!(values(&claims, "brand_id").len(), 2);
    }

    #[test]
    fn duplicate_memberships_in_one_tenant_collapse() {
        let brand = Uuid::new_v4();
        let claims = assemble_identity_claims(
            &user(),
            &[(TenantType::Brand, brand), (TenantType::Brand, brand)],
        );
        assert_eq!(values(&claims, "brand_id").len(), 1);
    }

    #[test]
    fn name_claims_are_present_even_when_unset() {
        let u = User::new("b@example.com".to_string(), None, None);
        let claims = assemble_identity_claims(&u, &[]);
        assert_eq!(values(&claims, "given_name"), vec![String::new()]);
        assert_eq!(values(&claims, "family_name"), vec![String::new()]);
    }
}
