//! Refresh token model - opaque rotating tokens stored hashed at rest.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Refresh token entity. The plaintext secret is handed to the caller once;
/// only its hash is persisted. `replaced_by_token_id` forms the rotation
/// chain, newest token forward.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash_text: String,
    pub tenant_id: Option<Uuid>,
    pub tenant_type_code: Option<String>,
    pub role_id: Option<Uuid>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub replaced_by_token_id: Option<Uuid>,
    pub created_by_ip: String,
    pub created_utc: DateTime<Utc>,
}

impl RefreshToken {
    /// Create a new token row for a freshly generated secret.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        secret: &str,
        tenant_id: Option<Uuid>,
        tenant_type_code: Option<String>,
        role_id: Option<Uuid>,
        expiry_days: i64,
        created_by_ip: String,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash_text: Self::hash_token(secret),
            tenant_id,
            tenant_type_code,
            role_id,
            expiry_utc: Utc::now() + Duration::days(expiry_days),
            revoked_utc: None,
            replaced_by_token_id: None,
            created_by_ip,
            created_utc: Utc::now(),
        }
    }

    /// 256-bit cryptographically random secret, base64-encoded.
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        BASE64.encode(bytes)
    }

    /// Hash a presented secret for lookup/storage.
    pub fn hash_token(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    /// Not revoked and not expired.
    pub fn is_active(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }
}

/// Token pair returned to the caller after login or rotation.
#[derive(Debug, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}
