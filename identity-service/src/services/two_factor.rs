//! Two-step login: password verification gates a short-lived temp token, the
//! temp token plus a one-time code gate the real token pair. Repeated
//! password failures lock the account for a fixed window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use identity_core::error::IdentityError;
use uuid::Uuid;

use crate::config::LockoutConfig;
use crate::models::{IssuedTokens, OtpPurpose};
use crate::services::otp::OtpService;
use crate::services::ports::{OtpNotifier, PasswordVerifier};
use crate::services::signer::JwtSigner;
use crate::services::tokens::{TenantContext, TokenIssuer};
use crate::store::Database;

/// Outcome of the password step.
#[derive(Debug)]
pub enum TwoFactorStart {
    /// Password accepted; a code was sent and the temp token carries the
    /// session to the OTP step.
    AwaitingOtp {
        temp_token: String,
        expires_in_seconds: i64,
    },
    /// Account is locked until the given instant.
    Locked { until: DateTime<Utc> },
    /// Credentials rejected.
    Rejected,
}

#[derive(Clone)]
pub struct TwoFactorFlow {
    db: Database,
    signer: JwtSigner,
    otp: OtpService,
    tokens: TokenIssuer,
    password_verifier: Arc<dyn PasswordVerifier>,
    otp_notifier: Arc<dyn OtpNotifier>,
    config: LockoutConfig,
}

impl TwoFactorFlow {
    pub fn new(
        db: Database,
        signer: JwtSigner,
        otp: OtpService,
        tokens: TokenIssuer,
        password_verifier: Arc<dyn PasswordVerifier>,
        otp_notifier: Arc<dyn OtpNotifier>,
        config: LockoutConfig,
    ) -> Self {
        Self {
            db,
            signer,
            otp,
            tokens,
            password_verifier,
            otp_notifier,
            config,
        }
    }

    /// Password step. Unknown accounts and wrong passwords both come back as
    /// [`TwoFactorStart::Rejected`] so the response never reveals whether an
    /// email is registered.
    pub async fn start(&self, email: &str, password: &str) -> Result<TwoFactorStart, IdentityError> {
        let Some(user) = self
            .db
            .find_user_by_email(email)
            .await?
            .filter(|u| u.is_usable())
        else {
            tracing::warn!("Login attempt for unknown or disabled account");
            return Ok(TwoFactorStart::Rejected);
        };

        let Some(credential) = self.db.find_credential(user.user_id).await? else {
            tracing::warn!(user_id = %user.user_id, "Login attempt for account without credentials");
            return Ok(TwoFactorStart::Rejected);
        };

        if credential.is_locked_out() {
            let until = credential.lockout_end_utc.unwrap_or_else(Utc::now);
            tracing::warn!(user_id = %user.user_id, until = %until, "Login attempt on locked account");
            return Ok(TwoFactorStart::Locked { until });
        }
        if credential.lockout_expired() {
            self.db.reset_failed_access(user.user_id).await?;
        }

        let ok = self
            .password_verifier
            .verify(password, &credential.password_hash)
            .await?;
        if !ok {
            let failures = self.db.record_failed_access(user.user_id).await?;
            if failures >= self.config.max_failed_attempts {
                let until = Utc::now() + Duration::minutes(self.config.lockout_minutes);
                self.db.set_lockout(user.user_id, until).await?;
                tracing::warn!(user_id = %user.user_id, failures, "Account locked");
                return Ok(TwoFactorStart::Locked { until });
            }
            return Ok(TwoFactorStart::Rejected);
        }

        self.db.reset_failed_access(user.user_id).await?;

        let code = self
            .otp
            .generate(user.user_id, OtpPurpose::Login, None)
            .await?;
        // Delivery failure is not safety-critical; the code stays valid and
        // the user can restart if it never arrives.
        if let Err(e) = self
            .otp_notifier
            .send_code(user.user_id, &user.email, &code)
            .await
        {
            tracing::warn!(user_id = %user.user_id, error = %e, "OTP delivery failed");
        }

        let temp_token = self.signer.sign_temp_token(user.user_id, &user.email)?;
        tracing::info!(user_id = %user.user_id, "Password accepted, awaiting OTP");
        Ok(TwoFactorStart::AwaitingOtp {
            temp_token,
            expires_in_seconds: self.signer.temp_token_expiry_minutes() * 60,
        })
    }

    /// OTP step. The temp token must verify, carry the temp marker, and name
    /// the same user the code belongs to; only then is the code checked and
    /// spent, and the real token pair issued for the requested context.
    pub async fn complete(
        &self,
        temp_token: &str,
        user_id: Uuid,
        code: &str,
        context: &TenantContext,
        created_by_ip: &str,
    ) -> Result<IssuedTokens, IdentityError> {
        let (token_user_id, _email) = self.signer.verify_temp_token(temp_token)?;
        if token_user_id != user_id {
            tracing::warn!(user_id = %user_id, "Temp token subject mismatch");
            return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                "Invalid or expired token"
            )));
        }

        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .filter(|u| u.is_usable())
            .ok_or_else(IdentityError::invalid_credentials)?;

        let verified = self
            .otp
            .verify(user_id, OtpPurpose::Login, code, true)
            .await?;
        if !verified {
            return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                "Invalid or expired one-time code"
            )));
        }

        self.db.reset_failed_access(user_id).await?;
        let issued = self.tokens.issue_tokens(&user, context, created_by_ip).await?;
        tracing::info!(user_id = %user_id, "Two-factor login complete");
        Ok(issued)
    }
}
