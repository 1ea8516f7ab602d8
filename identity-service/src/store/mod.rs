//! PostgreSQL store for the identity engine.
//!
//! Repository-style methods over a shared pool. Multi-statement operations
//! that must be atomic (reparenting with module inheritance, permission
//! changes with their outbox event, refresh-token rotation) own their
//! transaction here.

use chrono::Utc;
use identity_core::error::IdentityError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    Credential, OneTimePassword, OtpPurpose, OutboxEvent, RefreshToken, Role, RolePermission,
    Tenant, TenantModule, User, UserTenantRole,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> IdentityError {
    IdentityError::Database(anyhow::anyhow!(e))
}

/// Map an insert error, surfacing unique violations as conflicts.
fn insert_err(e: sqlx::Error) -> IdentityError {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some("23505") {
            return IdentityError::Conflict(anyhow::anyhow!("{}", db.message()));
        }
    }
    db_err(e)
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), IdentityError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                IdentityError::Database(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    // ==================== Tenant Operations ====================

    /// Find tenant by ID.
    pub async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, IdentityError> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Find tenant by its lowercase-normalized key.
    pub async fn find_tenant_by_key(&self, key: &str) -> Result<Option<Tenant>, IdentityError> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_key = LOWER($1)")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Load every non-deleted tenant.
    pub async fn find_all_tenants(&self) -> Result<Vec<Tenant>, IdentityError> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE is_deleted = false")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Insert a new tenant, recording its creation event in the same
    /// transaction.
    pub async fn insert_tenant_with_event(
        &self,
        tenant: &Tenant,
        event: &OutboxEvent,
    ) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        insert_tenant_tx(&mut tx, tenant).await?;
        insert_outbox_event_tx(&mut tx, event).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Insert a new tenant.
    pub async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        insert_tenant_tx(&mut tx, tenant).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Count non-deleted children of a tenant.
    pub async fn count_undeleted_children(&self, tenant_id: Uuid) -> Result<i64, IdentityError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tenants WHERE parent_tenant_id = $1 AND is_deleted = false",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.0)
    }

    /// Soft-delete a tenant, recording the event in the same transaction.
    pub async fn soft_delete_tenant(
        &self,
        tenant_id: Uuid,
        event: &OutboxEvent,
    ) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("UPDATE tenants SET is_deleted = true WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        insert_outbox_event_tx(&mut tx, event).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Reparent a tenant, applying module-access inheritance and recording the
    /// integration event in the same transaction.
    pub async fn reparent_tenant(
        &self,
        tenant_id: Uuid,
        new_parent_id: Uuid,
        modules_to_create: &[TenantModule],
        module_ids_to_reactivate: &[Uuid],
        event: &OutboxEvent,
    ) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("UPDATE tenants SET parent_tenant_id = $1 WHERE tenant_id = $2")
            .bind(new_parent_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for module in modules_to_create {
            sqlx::query(
                r#"
                INSERT INTO tenant_modules (tenant_module_id, tenant_id, module_code, is_active, expiry_utc, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (tenant_id, module_code) DO UPDATE SET is_active = true, expiry_utc = NULL
                "#,
            )
            .bind(module.tenant_module_id)
            .bind(module.tenant_id)
            .bind(&module.module_code)
            .bind(module.is_active)
            .bind(module.expiry_utc)
            .bind(module.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        for module_id in module_ids_to_reactivate {
            sqlx::query(
                "UPDATE tenant_modules SET is_active = true, expiry_utc = NULL WHERE tenant_module_id = $1",
            )
            .bind(module_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        insert_outbox_event_tx(&mut tx, event).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    // ==================== Tenant Module Operations ====================

    /// All module subscriptions for a tenant, including inactive/expired ones.
    pub async fn find_tenant_modules(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<TenantModule>, IdentityError> {
        sqlx::query_as::<_, TenantModule>(
            "SELECT * FROM tenant_modules WHERE tenant_id = $1 ORDER BY module_code",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Insert a module subscription.
    pub async fn insert_tenant_module(&self, module: &TenantModule) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            INSERT INTO tenant_modules (tenant_module_id, tenant_id, module_code, is_active, expiry_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(module.tenant_module_id)
        .bind(module.tenant_id)
        .bind(&module.module_code)
        .bind(module.is_active)
        .bind(module.expiry_utc)
        .bind(module.created_utc)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    // ==================== Role Operations ====================

    /// Find role by ID.
    pub async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, IdentityError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Load every non-deleted role.
    pub async fn find_all_roles(&self) -> Result<Vec<Role>, IdentityError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE is_deleted = false")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Load every role-permission pair for non-deleted roles.
    pub async fn find_all_role_permissions(&self) -> Result<Vec<RolePermission>, IdentityError> {
        sqlx::query_as::<_, RolePermission>(
            r#"
            SELECT rp.role_id, rp.permission FROM role_permissions rp
            JOIN roles r ON rp.role_id = r.role_id
            WHERE r.is_deleted = false
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Insert a new role.
    pub async fn insert_role(&self, role: &Role) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            INSERT INTO roles (role_id, role_name, tenant_id, parent_role_id, is_active, is_deleted, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(role.role_id)
        .bind(&role.role_name)
        .bind(role.tenant_id)
        .bind(role.parent_role_id)
        .bind(role.is_active)
        .bind(role.is_deleted)
        .bind(role.created_utc)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    /// Set (or clear) a role's parent.
    pub async fn set_role_parent(
        &self,
        role_id: Uuid,
        parent_role_id: Option<Uuid>,
    ) -> Result<(), IdentityError> {
        sqlx::query("UPDATE roles SET parent_role_id = $1 WHERE role_id = $2")
            .bind(parent_role_id)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Attach a permission to a role, recording the change event in the same
    /// transaction. Returns false (and records nothing) when the permission
    /// was already present.
    pub async fn add_role_permission(
        &self,
        role_id: Uuid,
        permission: &str,
        event: &OutboxEvent,
    ) -> Result<bool, IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            "INSERT INTO role_permissions (role_id, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let changed = result.rows_affected() > 0;
        if changed {
            insert_outbox_event_tx(&mut tx, event).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(changed)
    }

    /// Detach a permission from a role, recording the change event in the
    /// same transaction. Returns false when the permission was absent.
    pub async fn remove_role_permission(
        &self,
        role_id: Uuid,
        permission: &str,
        event: &OutboxEvent,
    ) -> Result<bool, IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND permission = $2",
        )
        .bind(role_id)
        .bind(permission)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let changed = result.rows_affected() > 0;
        if changed {
            insert_outbox_event_tx(&mut tx, event).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(changed)
    }

    // ==================== User Operations ====================

    /// Find user by ID.
    pub async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, IdentityError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Find user by email (case-insensitive).
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND is_deleted = false",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Insert a new user.
    pub async fn insert_user(&self, user: &User) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, given_name, family_name, is_active, is_deleted, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.given_name)
        .bind(&user.family_name)
        .bind(user.is_active)
        .bind(user.is_deleted)
        .bind(user.created_utc)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    // ==================== Credential Operations ====================

    /// Find the credential record for a user.
    pub async fn find_credential(&self, user_id: Uuid) -> Result<Option<Credential>, IdentityError> {
        sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Insert a credential record.
    pub async fn insert_credential(&self, credential: &Credential) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (user_id, password_hash, failed_access_count, lockout_end_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(credential.user_id)
        .bind(&credential.password_hash)
        .bind(credential.failed_access_count)
        .bind(credential.lockout_end_utc)
        .bind(credential.created_utc)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    /// Record a failed password attempt; returns the new failure count.
    pub async fn record_failed_access(&self, user_id: Uuid) -> Result<i32, IdentityError> {
        let row: (i32,) = sqlx::query_as(
            r#"
            UPDATE credentials SET failed_access_count = failed_access_count + 1
            WHERE user_id = $1
            RETURNING failed_access_count
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.0)
    }

    /// Clear the failure counter and any lockout.
    pub async fn reset_failed_access(&self, user_id: Uuid) -> Result<(), IdentityError> {
        sqlx::query(
            "UPDATE credentials SET failed_access_count = 0, lockout_end_utc = NULL WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Start a lockout window for a user.
    pub async fn set_lockout(
        &self,
        user_id: Uuid,
        until: chrono::DateTime<Utc>,
    ) -> Result<(), IdentityError> {
        sqlx::query("UPDATE credentials SET lockout_end_utc = $1 WHERE user_id = $2")
            .bind(until)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ==================== Membership Operations ====================

    /// Active memberships for a user across all tenants.
    pub async fn find_active_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserTenantRole>, IdentityError> {
        sqlx::query_as::<_, UserTenantRole>(
            "SELECT * FROM user_tenant_roles WHERE user_id = $1 AND is_active = true",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Active memberships for a user within one tenant.
    pub async fn find_active_memberships_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<UserTenantRole>, IdentityError> {
        sqlx::query_as::<_, UserTenantRole>(
            "SELECT * FROM user_tenant_roles WHERE user_id = $1 AND tenant_id = $2 AND is_active = true",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Active system-wide memberships (no tenant scope) for a user.
    pub async fn find_system_memberships(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<UserTenantRole>, IdentityError> {
        sqlx::query_as::<_, UserTenantRole>(
            "SELECT * FROM user_tenant_roles WHERE user_id = $1 AND tenant_id IS NULL AND is_active = true",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Insert a membership. When it is flagged default, any previous default
    /// for the user is cleared in the same transaction so at most one exists.
    pub async fn insert_membership(
        &self,
        membership: &UserTenantRole,
    ) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if membership.is_default {
            sqlx::query(
                "UPDATE user_tenant_roles SET is_default = false WHERE user_id = $1 AND is_default = true",
            )
            .bind(membership.user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            r#"
            INSERT INTO user_tenant_roles (membership_id, user_id, tenant_id, role_id, is_default, is_active, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.user_id)
        .bind(membership.tenant_id)
        .bind(membership.role_id)
        .bind(membership.is_default)
        .bind(membership.is_active)
        .bind(membership.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(insert_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    // ==================== Refresh Token Operations ====================

    /// Find a refresh token row by the hash of the presented secret.
    pub async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, IdentityError> {
        sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_hash_text = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Find a refresh token row by ID.
    pub async fn find_refresh_token_by_id(
        &self,
        token_id: Uuid,
    ) -> Result<Option<RefreshToken>, IdentityError> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Insert a refresh token row.
    pub async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token_hash_text, tenant_id, tenant_type_code, role_id, expiry_utc, revoked_utc, replaced_by_token_id, created_by_ip, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(token.token_id)
        .bind(token.user_id)
        .bind(&token.token_hash_text)
        .bind(token.tenant_id)
        .bind(&token.tenant_type_code)
        .bind(token.role_id)
        .bind(token.expiry_utc)
        .bind(token.revoked_utc)
        .bind(token.replaced_by_token_id)
        .bind(&token.created_by_ip)
        .bind(token.created_utc)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;
        Ok(())
    }

    /// Rotate: revoke the old token, link it forward, and persist the new one
    /// in a single transaction. The presented row is re-checked under lock so
    /// two concurrent rotations of the same token cannot both succeed.
    pub async fn rotate_refresh_token(
        &self,
        old_token_id: Uuid,
        new_token: &RefreshToken,
    ) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let locked = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_id = $1 FOR UPDATE",
        )
        .bind(old_token_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| IdentityError::Unauthorized(anyhow::anyhow!("Invalid refresh token")))?;

        if !locked.is_active() {
            return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                "Invalid refresh token"
            )));
        }

        sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW(), replaced_by_token_id = $1 WHERE token_id = $2",
        )
        .bind(new_token.token_id)
        .bind(old_token_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token_hash_text, tenant_id, tenant_type_code, role_id, expiry_utc, revoked_utc, replaced_by_token_id, created_by_ip, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(new_token.token_id)
        .bind(new_token.user_id)
        .bind(&new_token.token_hash_text)
        .bind(new_token.tenant_id)
        .bind(&new_token.tenant_type_code)
        .bind(new_token.role_id)
        .bind(new_token.expiry_utc)
        .bind(new_token.revoked_utc)
        .bind(new_token.replaced_by_token_id)
        .bind(&new_token.created_by_ip)
        .bind(new_token.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(insert_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Revoke a single token.
    pub async fn revoke_refresh_token(&self, token_id: Uuid) -> Result<(), IdentityError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE token_id = $1 AND revoked_utc IS NULL",
        )
        .bind(token_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Delete an expired token row outright.
    pub async fn delete_refresh_token(&self, token_id: Uuid) -> Result<(), IdentityError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_id = $1")
            .bind(token_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Revoke an entire rotation family starting at a token, following the
    /// `replaced_by_token_id` chain forward, and record the compromise event
    /// in the same transaction. Returns the number of tokens revoked.
    pub async fn revoke_token_family(
        &self,
        start_token_id: Uuid,
        event: &OutboxEvent,
    ) -> Result<usize, IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut revoked = 0usize;
        let mut visited = std::collections::HashSet::new();
        let mut current = Some(start_token_id);

        while let Some(token_id) = current {
            if !visited.insert(token_id) {
                break;
            }

            let row = sqlx::query_as::<_, RefreshToken>(
                "SELECT * FROM refresh_tokens WHERE token_id = $1 FOR UPDATE",
            )
            .bind(token_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            let Some(row) = row else { break };

            if row.revoked_utc.is_none() {
                sqlx::query("UPDATE refresh_tokens SET revoked_utc = NOW() WHERE token_id = $1")
                    .bind(token_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                revoked += 1;
            }

            current = row.replaced_by_token_id;
        }

        insert_outbox_event_tx(&mut tx, event).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(revoked)
    }

    /// Revoke every active refresh token a user holds.
    pub async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<(), IdentityError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ==================== OTP Operations ====================

    /// Invalidate every valid code for (user, purpose) and store the new one,
    /// atomically, so at most one valid code exists at a time.
    pub async fn replace_otp(&self, otp: &OneTimePassword) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            UPDATE otp_codes SET used_utc = NOW()
            WHERE user_id = $1 AND purpose_code = $2 AND used_utc IS NULL AND expiry_utc > NOW()
            "#,
        )
        .bind(otp.user_id)
        .bind(&otp.purpose_code)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO otp_codes (otp_id, user_id, purpose_code, code_hash_text, expiry_utc, used_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(otp.otp_id)
        .bind(otp.user_id)
        .bind(&otp.purpose_code)
        .bind(&otp.code_hash_text)
        .bind(otp.expiry_utc)
        .bind(otp.used_utc)
        .bind(otp.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(insert_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// The newest valid (unused, unexpired) code for (user, purpose).
    pub async fn find_latest_valid_otp(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<Option<OneTimePassword>, IdentityError> {
        sqlx::query_as::<_, OneTimePassword>(
            r#"
            SELECT * FROM otp_codes
            WHERE user_id = $1 AND purpose_code = $2 AND used_utc IS NULL AND expiry_utc > NOW()
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Mark one code as used.
    pub async fn consume_otp(&self, otp_id: Uuid) -> Result<(), IdentityError> {
        sqlx::query("UPDATE otp_codes SET used_utc = NOW() WHERE otp_id = $1")
            .bind(otp_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Invalidate every valid code for (user, purpose).
    pub async fn invalidate_otps(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            UPDATE otp_codes SET used_utc = NOW()
            WHERE user_id = $1 AND purpose_code = $2 AND used_utc IS NULL AND expiry_utc > NOW()
            "#,
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ==================== Outbox Operations ====================

    /// Undispatched events, oldest first.
    pub async fn find_undispatched_events(
        &self,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, IdentityError> {
        sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT * FROM outbox_events
            WHERE dispatched_utc IS NULL
            ORDER BY created_utc
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Mark an event delivered.
    pub async fn mark_event_dispatched(&self, event_id: Uuid) -> Result<(), IdentityError> {
        sqlx::query("UPDATE outbox_events SET dispatched_utc = NOW() WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

async fn insert_tenant_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant: &Tenant,
) -> Result<(), IdentityError> {
    sqlx::query(
        r#"
        INSERT INTO tenants (tenant_id, tenant_name, tenant_key, tenant_type_code, parent_tenant_id, status_code, is_deleted, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(tenant.tenant_id)
    .bind(&tenant.tenant_name)
    .bind(&tenant.tenant_key)
    .bind(&tenant.tenant_type_code)
    .bind(tenant.parent_tenant_id)
    .bind(&tenant.status_code)
    .bind(tenant.is_deleted)
    .bind(tenant.created_utc)
    .execute(&mut **tx)
    .await
    .map_err(insert_err)?;
    Ok(())
}

/// Append an outbox event within an open transaction.
async fn insert_outbox_event_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &OutboxEvent,
) -> Result<(), IdentityError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (event_id, event_name, payload, actor_user_id, created_utc, dispatched_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.event_id)
    .bind(&event.event_name)
    .bind(&event.payload)
    .bind(event.actor_user_id)
    .bind(event.created_utc)
    .bind(event.dispatched_utc)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}
