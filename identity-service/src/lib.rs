//! identity-service: the tenant-scoped authorization and credential-issuance
//! engine behind the booking platform's identity backend.
//!
//! The crate is the core only. HTTP/gRPC transport, outbound email/SMS
//! delivery, the message broker, and password hashing live behind ports and
//! are supplied by the embedding service.

pub mod config;
pub mod db;
pub mod graph;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::services::{
    ClaimsBuilder, EventPublisher, JwtSigner, OtpNotifier, OtpService, OutboxDispatcher,
    PasswordVerifier, PermissionResolver, RoleService, TenantHierarchyService, TokenIssuer,
    TwoFactorFlow,
};
use crate::store::Database;

/// Wired-up engine: every component sharing one store and one set of ports.
#[derive(Clone)]
pub struct IdentityEngine {
    pub hierarchy: TenantHierarchyService,
    pub roles: RoleService,
    pub permissions: PermissionResolver,
    pub claims: ClaimsBuilder,
    pub tokens: TokenIssuer,
    pub otp: OtpService,
    pub two_factor: TwoFactorFlow,
    pub outbox: OutboxDispatcher,
}

impl IdentityEngine {
    /// Assemble the engine from its store, signer, ports, and configuration.
    pub fn new(
        db: Database,
        signer: JwtSigner,
        password_verifier: Arc<dyn PasswordVerifier>,
        otp_notifier: Arc<dyn OtpNotifier>,
        event_publisher: Arc<dyn EventPublisher>,
        config: &IdentityConfig,
    ) -> Self {
        let permissions = PermissionResolver::new(db.clone());
        let claims = ClaimsBuilder::new(db.clone());
        let tokens = TokenIssuer::new(
            db.clone(),
            Arc::new(signer.clone()),
            claims.clone(),
            permissions.clone(),
            config.tokens.clone(),
        );
        let otp = OtpService::new(db.clone(), config.otp.clone());
        let two_factor = TwoFactorFlow::new(
            db.clone(),
            signer,
            otp.clone(),
            tokens.clone(),
            password_verifier,
            otp_notifier,
            config.lockout.clone(),
        );

        Self {
            hierarchy: TenantHierarchyService::new(db.clone()),
            roles: RoleService::new(db.clone()),
            permissions,
            claims,
            tokens,
            otp,
            two_factor,
            outbox: OutboxDispatcher::new(db, event_publisher),
        }
    }
}
