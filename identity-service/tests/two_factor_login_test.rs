//! End-to-end two-step login: password, one-time code, token pair, lockout.

mod common;

use identity_service::models::TenantType;
use identity_service::services::{TenantContext, TwoFactorStart};

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn full_login_issues_tokens() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "sol", TenantType::Brand, None).await;
    let user = common::seed_user(&db, "login@example.com").await;
    let role = common::seed_role(&db, "Owner", Some(brand.tenant_id)).await;
    engine
        .roles
        .assign_role_to_user(user.user_id, Some(brand.tenant_id), role.role_id, true)
        .await
        .unwrap();

    let started = engine
        .two_factor
        .start("login@example.com", "correct horse")
        .await
        .unwrap();
    let temp_token = match started {
        TwoFactorStart::AwaitingOtp { temp_token, expires_in_seconds } => {
            assert_eq!(expires_in_seconds, 10 * 60);
            temp_token
        }
        other => panic!("expected AwaitingOtp, got {:?}", other),
    };

    let code = codes.last().expect("a code was delivered");
    let context = TenantContext {
        tenant_id: Some(brand.tenant_id),
        role_id: Some(role.role_id),
    };
    let issued = engine
        .two_factor
        .complete(&temp_token, user.user_id, &code, &context, "10.0.0.1")
        .await
        .unwrap();

    assert!(!issued.access_token.is_empty());
    assert!(!issued.refresh_token.is_empty());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn wrong_password_is_rejected_without_leaking_accounts() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, codes, _events) = common::engine(db.clone());

    common::seed_user(&db, "victim@example.com").await;

    let started = engine
        .two_factor
        .start("victim@example.com", "wrong")
        .await
        .unwrap();
    assert!(matches!(started, TwoFactorStart::Rejected));

    // Unknown accounts look identical.
    let started = engine
        .two_factor
        .start("ghost@example.com", "wrong")
        .await
        .unwrap();
    assert!(matches!(started, TwoFactorStart::Rejected));

    assert!(codes.last().is_none());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn repeated_failures_lock_the_account() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    common::seed_user(&db, "locked@example.com").await;

    for _ in 0..4 {
        let started = engine
            .two_factor
            .start("locked@example.com", "wrong")
            .await
            .unwrap();
        assert!(matches!(started, TwoFactorStart::Rejected));
    }

    // Fifth failure crosses the threshold.
    let started = engine
        .two_factor
        .start("locked@example.com", "wrong")
        .await
        .unwrap();
    assert!(matches!(started, TwoFactorStart::Locked { .. }));

    // Even the right password bounces while the window is open.
    let started = engine
        .two_factor
        .start("locked@example.com", "correct horse")
        .await
        .unwrap();
    assert!(matches!(started, TwoFactorStart::Locked { .. }));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn temp_token_must_name_the_otp_owner() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, codes, _events) = common::engine(db.clone());

    let alice = common::seed_user(&db, "alice@example.com").await;
    let mallory = common::seed_user(&db, "mallory@example.com").await;

    let started = engine
        .two_factor
        .start("alice@example.com", "correct horse")
        .await
        .unwrap();
    let temp_token = match started {
        TwoFactorStart::AwaitingOtp { temp_token, .. } => temp_token,
        other => panic!("expected AwaitingOtp, got {:?}", other),
    };
    let code = codes.last().unwrap();

    // Alice's temp token cannot complete as Mallory.
    let result = engine
        .two_factor
        .complete(&temp_token, mallory.user_id, &code, &TenantContext::default(), "10.0.0.1")
        .await;
    assert!(result.is_err());

    // A wrong code fails; the real one still works afterwards.
    let result = engine
        .two_factor
        .complete(&temp_token, alice.user_id, "000000", &TenantContext::default(), "10.0.0.1")
        .await;
    assert!(result.is_err());

    let role = common::seed_role(&db, "Admin", None).await;
    engine
        .roles
        .assign_role_to_user(alice.user_id, None, role.role_id, true)
        .await
        .unwrap();
    engine
        .two_factor
        .complete(&temp_token, alice.user_id, &code, &TenantContext::default(), "10.0.0.1")
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn a_full_access_token_never_passes_the_otp_gate() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let user = common::seed_user(&db, "stolen@example.com").await;
    let role = common::seed_role(&db, "Admin", None).await;
    engine
        .roles
        .assign_role_to_user(user.user_id, None, role.role_id, true)
        .await
        .unwrap();

    let issued = engine
        .tokens
        .issue_tokens(&user, &TenantContext::default(), "10.0.0.1")
        .await
        .unwrap();

    // The access token lacks the temp marker, so it cannot stand in for the
    // password step.
    let result = engine
        .two_factor
        .complete(&issued.access_token, user.user_id, "123456", &TenantContext::default(), "10.0.0.1")
        .await;
    assert!(result.is_err());
}
