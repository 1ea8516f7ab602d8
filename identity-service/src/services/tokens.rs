//! Token issuance and refresh rotation.
//!
//! Access tokens are signed through the [`AccessTokenSigner`] port. Refresh
//! tokens are opaque 256-bit secrets; only their hash is stored, and each use
//! rotates the row forward via `replaced_by_token_id`. Presenting an already
//! rotated secret is treated as theft and revokes the whole chain.

use std::sync::Arc;

use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::{IssuedTokens, OutboxEvent, RefreshToken, User};
use crate::services::claims::ClaimsBuilder;
use crate::services::permissions::PermissionResolver;
use crate::services::signer::{AccessTokenSigner, Claim};
use crate::store::Database;

/// The tenant scope a token is issued for. Empty context issues a token with
/// system-wide permissions only.
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    pub tenant_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    db: Database,
    signer: Arc<dyn AccessTokenSigner>,
    claims: ClaimsBuilder,
    permissions: PermissionResolver,
    config: TokenConfig,
}

impl TokenIssuer {
    pub fn new(
        db: Database,
        signer: Arc<dyn AccessTokenSigner>,
        claims: ClaimsBuilder,
        permissions: PermissionResolver,
        config: TokenConfig,
    ) -> Self {
        Self {
            db,
            signer,
            claims,
            permissions,
            config,
        }
    }

    /// Issue an access/refresh token pair for a user in a tenant context.
    /// The user must hold an active membership covering the context; a
    /// context with no tenant falls back to system-wide memberships.
    pub async fn issue_tokens(
        &self,
        user: &User,
        context: &TenantContext,
        created_by_ip: &str,
    ) -> Result<IssuedTokens, IdentityError> {
        if !user.is_usable() {
            return Err(IdentityError::invalid_credentials());
        }

        let tenant_type_code = self.verify_membership(user.user_id, context).await?;
        let claims = self
            .assemble_payload(user, context, tenant_type_code.as_deref())
            .await?;
        let access_token = self
            .signer
            .sign(&claims, self.config.access_token_expiry_minutes)?;

        let secret = RefreshToken::generate_secret();
        let row = RefreshToken::new(
            user.user_id,
            &secret,
            context.tenant_id,
            tenant_type_code,
            context.role_id,
            self.config.refresh_token_expiry_days,
            created_by_ip.to_string(),
        );
        self.db.insert_refresh_token(&row).await?;

        tracing::info!(user_id = %user.user_id, tenant_id = ?context.tenant_id, "Tokens issued");
        Ok(IssuedTokens {
            access_token,
            refresh_token: secret,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiry_minutes * 60,
        })
    }

    /// Exchange a refresh token for a fresh pair, preserving the stored
    /// tenant context. Expired rows are deleted on sight. A revoked row means
    /// the secret was already spent; the whole rotation family is revoked and
    /// the compromise recorded.
    pub async fn refresh(
        &self,
        presented_secret: &str,
        created_by_ip: &str,
    ) -> Result<IssuedTokens, IdentityError> {
        let hash = RefreshToken::hash_token(presented_secret);
        let row = self
            .db
            .find_refresh_token_by_hash(&hash)
            .await?
            .ok_or_else(|| IdentityError::Unauthorized(anyhow::anyhow!("Invalid refresh token")))?;

        if row.is_expired() {
            self.db.delete_refresh_token(row.token_id).await?;
            return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                "Invalid refresh token"
            )));
        }

        if row.is_revoked() {
            let event = OutboxEvent::new(
                "token.family_revoked",
                serde_json::json!({
                    "user_id": row.user_id,
                    "token_id": row.token_id,
                    "reason": "refresh token reuse",
                }),
                None,
            );
            let revoked = self.db.revoke_token_family(row.token_id, &event).await?;
            tracing::warn!(
                user_id = %row.user_id,
                revoked,
                "Refresh token reuse detected; rotation family revoked"
            );
            return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                "Invalid refresh token"
            )));
        }

        let user = self
            .db
            .find_user_by_id(row.user_id)
            .await?
            .filter(|u| u.is_usable())
            .ok_or_else(|| IdentityError::Unauthorized(anyhow::anyhow!("Invalid refresh token")))?;

        let context = TenantContext {
            tenant_id: row.tenant_id,
            role_id: row.role_id,
        };
        // The membership snapshot on the row may have been revoked since
        // issuance; a stale context must not mint fresh scoped tokens.
        let tenant_type_code = self
            .verify_membership(user.user_id, &context)
            .await
            .map_err(|_| IdentityError::Unauthorized(anyhow::anyhow!("Invalid refresh token")))?;
        let claims = self
            .assemble_payload(&user, &context, tenant_type_code.as_deref())
            .await?;
        let access_token = self
            .signer
            .sign(&claims, self.config.access_token_expiry_minutes)?;

        let secret = RefreshToken::generate_secret();
        let new_row = RefreshToken::new(
            user.user_id,
            &secret,
            row.tenant_id,
            tenant_type_code,
            row.role_id,
            self.config.refresh_token_expiry_days,
            created_by_ip.to_string(),
        );
        self.db.rotate_refresh_token(row.token_id, &new_row).await?;

        tracing::info!(user_id = %user.user_id, "Refresh token rotated");
        Ok(IssuedTokens {
            access_token,
            refresh_token: secret,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiry_minutes * 60,
        })
    }

    /// Revoke a refresh token. Unknown or already revoked secrets succeed
    /// silently so logout never errors.
    pub async fn revoke(&self, presented_secret: &str) -> Result<(), IdentityError> {
        let hash = RefreshToken::hash_token(presented_secret);
        if let Some(row) = self.db.find_refresh_token_by_hash(&hash).await? {
            self.db.revoke_refresh_token(row.token_id).await?;
            tracing::info!(user_id = %row.user_id, "Refresh token revoked");
        }
        Ok(())
    }

    /// Revoke every refresh token a user holds, for password resets and
    /// account compromise.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<(), IdentityError> {
        self.db.revoke_all_user_tokens(user_id).await?;
        tracing::info!(user_id = %user_id, "All refresh tokens revoked");
        Ok(())
    }

    /// The access-token claim set: the user's membership context, the scope
    /// tenant and role, permissions resolved for that scope, and one module
    /// claim per active tenant module.
    async fn assemble_payload(
        &self,
        user: &User,
        context: &TenantContext,
        tenant_type_code: Option<&str>,
    ) -> Result<Vec<Claim>, IdentityError> {
        let mut claims = self.claims.identity_and_tenant_claims(user).await?;

        if let Some(tenant_id) = context.tenant_id {
            claims.push(Claim::new("tenant_id", tenant_id.to_string()));
        }
        if let Some(code) = tenant_type_code {
            claims.push(Claim::new("tenant_type", code.to_string()));
        }
        if let Some(role_id) = context.role_id {
            if let Some(role) = self.db.find_role_by_id(role_id).await? {
                claims.push(Claim::new("role", role.role_name));
            }
        }

        for permission in self
            .permissions
            .resolve(user.user_id, context.tenant_id)
            .await?
        {
            claims.push(Claim::new("permission", permission));
        }

        if let Some(tenant_id) = context.tenant_id {
            for module in self.db.find_tenant_modules(tenant_id).await? {
                if module.has_access() {
                    claims.push(Claim::new("module", module.module_code));
                }
            }
        }

        Ok(claims)
    }

    /// Check the user's membership against the requested context. Returns
    /// the tenant type code to snapshot on the refresh token row.
    async fn verify_membership(
        &self,
        user_id: Uuid,
        context: &TenantContext,
    ) -> Result<Option<String>, IdentityError> {
        match context.tenant_id {
            Some(tenant_id) => {
                let memberships = self
                    .db
                    .find_active_memberships_in_tenant(user_id, tenant_id)
                    .await?;
                let covered = match context.role_id {
                    Some(role_id) => memberships.iter().any(|m| m.role_id == role_id),
                    None => !memberships.is_empty(),
                };
                if !covered {
                    return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                        "No active membership for the requested tenant"
                    )));
                }
                let tenant = self
                    .db
                    .find_tenant_by_id(tenant_id)
                    .await?
                    .filter(|t| !t.is_deleted)
                    .ok_or_else(|| IdentityError::NotFound(anyhow::anyhow!("Tenant not found")))?;
                Ok(Some(tenant.tenant_type_code))
            }
            None => Ok(None),
        }
    }
}
