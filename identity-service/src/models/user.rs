//! User aggregate and the credential record used by the password/lockout
//! subsystem. The two are deliberately separate tables: the domain user owns
//! name and status, the credential owns hash and failure tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, given_name: Option<String>, family_name: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            given_name,
            family_name,
            is_active: true,
            is_deleted: false,
            created_utc: Utc::now(),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

/// Password credential and lockout state for one user.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub user_id: Uuid,
    pub password_hash: String,
    pub failed_access_count: i32,
    pub lockout_end_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Credential {
    pub fn new(user_id: Uuid, password_hash: String) -> Self {
        Self {
            user_id,
            password_hash,
            failed_access_count: 0,
            lockout_end_utc: None,
            created_utc: Utc::now(),
        }
    }

    /// Whether the account is currently locked out.
    pub fn is_locked_out(&self) -> bool {
        self.lockout_end_utc.is_some_and(|end| end > Utc::now())
    }

    /// A lockout that has passed its end is spent and should be cleared.
    pub fn lockout_expired(&self) -> bool {
        self.lockout_end_utc.is_some_and(|end| end <= Utc::now())
    }
}
