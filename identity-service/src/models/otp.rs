//! One-time password model. At most one valid code exists per (user, purpose);
//! generating a new code invalidates older ones.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// OTP purpose codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    PasswordReset,
    EmailVerification,
    PhoneVerification,
    TransactionApproval,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::PasswordReset => "password_reset",
            OtpPurpose::EmailVerification => "email_verification",
            OtpPurpose::PhoneVerification => "phone_verification",
            OtpPurpose::TransactionApproval => "transaction_approval",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "login" => Some(OtpPurpose::Login),
            "password_reset" => Some(OtpPurpose::PasswordReset),
            "email_verification" => Some(OtpPurpose::EmailVerification),
            "phone_verification" => Some(OtpPurpose::PhoneVerification),
            "transaction_approval" => Some(OtpPurpose::TransactionApproval),
            _ => None,
        }
    }
}

/// OTP entity. Codes are stored hashed.
#[derive(Debug, Clone, FromRow)]
pub struct OneTimePassword {
    pub otp_id: Uuid,
    pub user_id: Uuid,
    pub purpose_code: String,
    pub code_hash_text: String,
    pub expiry_utc: DateTime<Utc>,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl OneTimePassword {
    /// Create a new OTP row for a freshly generated code.
    pub fn new(user_id: Uuid, purpose: OtpPurpose, code: &str, ttl: Duration) -> Self {
        Self {
            otp_id: Uuid::new_v4(),
            user_id,
            purpose_code: purpose.as_str().to_string(),
            code_hash_text: Self::hash_code(code),
            expiry_utc: Utc::now() + ttl,
            used_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Generate a uniformly random 6-digit numeric code.
    pub fn generate_code() -> String {
        use rand::Rng;
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }

    /// Hash a code for storage/comparison.
    pub fn hash_code(code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_used(&self) -> bool {
        self.used_utc.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    /// Unused and unexpired.
    pub fn is_valid(&self) -> bool {
        !self.is_used() && !self.is_expired()
    }

    /// Whether a presented code matches this row.
    pub fn matches(&self, code: &str) -> bool {
        Self::hash_code(code) == self.code_hash_text
    }
}
