//! Row-mapped entities for the identity engine.
//!
//! Relations are stored by id and walked through explicit lookups; no entity
//! holds a live reference to another.

pub mod membership;
pub mod otp;
pub mod outbox;
pub mod refresh_token;
pub mod role;
pub mod tenant;
pub mod tenant_module;
pub mod user;

pub use membership::UserTenantRole;
pub use otp::{OneTimePassword, OtpPurpose};
pub use outbox::OutboxEvent;
pub use refresh_token::{IssuedTokens, RefreshToken};
pub use role::{Role, RolePermission};
pub use tenant::{Tenant, TenantStatus, TenantType};
pub use tenant_module::TenantModule;
pub use user::{Credential, User};
