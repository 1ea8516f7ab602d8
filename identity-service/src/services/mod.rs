pub mod claims;
pub mod hierarchy;
pub mod otp;
pub mod outbox;
pub mod permissions;
pub mod ports;
pub mod roles;
pub mod signer;
pub mod tokens;
pub mod two_factor;

pub use claims::ClaimsBuilder;
pub use hierarchy::TenantHierarchyService;
pub use otp::OtpService;
pub use outbox::OutboxDispatcher;
pub use permissions::PermissionResolver;
pub use ports::{EventPublisher, OtpNotifier, PasswordVerifier};
pub use roles::RoleService;
pub use signer::{AccessTokenSigner, Claim, JwtSigner};
pub use tokens::{TenantContext, TokenIssuer};
pub use two_factor::{TwoFactorFlow, TwoFactorStart};
