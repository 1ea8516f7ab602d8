//! One-time password lifecycle: generation, verification, invalidation.
//! At most one valid code exists per (user, purpose); generating a new code
//! retires its predecessor, and a code is spent the moment it verifies.

use chrono::Duration;
use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::config::OtpConfig;
use crate::models::{OneTimePassword, OtpPurpose};
use crate::store::Database;

#[derive(Clone)]
pub struct OtpService {
    db: Database,
    config: OtpConfig,
}

impl OtpService {
    pub fn new(db: Database, config: OtpConfig) -> Self {
        Self { db, config }
    }

    /// Generate and persist a fresh 6-digit code, invalidating any valid
    /// predecessor for the same purpose. `ttl` overrides the configured
    /// lifetime when given. Returns the plaintext code for delivery; only
    /// its hash is stored.
    pub async fn generate(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        ttl: Option<Duration>,
    ) -> Result<String, IdentityError> {
        let ttl = ttl.unwrap_or_else(|| Duration::seconds(self.config.ttl_seconds));
        let code = OneTimePassword::generate_code();
        let otp = OneTimePassword::new(user_id, purpose, &code, ttl);
        self.db.replace_otp(&otp).await?;
        tracing::info!(user_id = %user_id, purpose = %purpose.as_str(), "OTP generated");
        Ok(code)
    }

    /// Verify a presented code. With `consume_on_success` the code is spent
    /// the moment it matches; a wrong code leaves the stored one intact for
    /// another attempt within its TTL.
    pub async fn verify(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        presented_code: &str,
        consume_on_success: bool,
    ) -> Result<bool, IdentityError> {
        let Some(otp) = self.db.find_latest_valid_otp(user_id, purpose).await? else {
            return Ok(false);
        };

        if !otp.matches(presented_code) {
            tracing::warn!(user_id = %user_id, purpose = %purpose.as_str(), "OTP mismatch");
            return Ok(false);
        }

        if consume_on_success {
            self.db.consume_otp(otp.otp_id).await?;
        }
        tracing::info!(user_id = %user_id, purpose = %purpose.as_str(), "OTP verified");
        Ok(true)
    }

    /// Invalidate every outstanding code for (user, purpose).
    pub async fn invalidate(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<(), IdentityError> {
        self.db.invalidate_otps(user_id, purpose).await
    }
}
