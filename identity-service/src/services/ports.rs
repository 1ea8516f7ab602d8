//! Outbound ports. Password hashing, OTP delivery, and event transport live
//! behind traits so the engine stays independent of the hosting process.

use async_trait::async_trait;
use identity_core::error::IdentityError;
use uuid::Uuid;

/// Verifies a plaintext password against a stored hash.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, password: &str, password_hash: &str) -> Result<bool, IdentityError>;
}

/// Delivers a one-time code to the user out of band.
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send_code(&self, user_id: Uuid, email: &str, code: &str)
        -> Result<(), IdentityError>;
}

/// Publishes integration events drained from the outbox.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<(), IdentityError>;
}
