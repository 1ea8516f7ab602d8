//! Role management, permission resolution, and the change-event trail.

mod common;

use identity_core::error::IdentityError;
use identity_service::models::TenantType;

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn permission_changes_are_idempotent_and_audited() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "lumen", TenantType::Brand, None).await;
    let role = common::seed_role(&db, "Coordinator", Some(brand.tenant_id)).await;

    assert!(engine
        .roles
        .add_permission(role.role_id, "Bookings.View", None)
        .await
        .unwrap());
    // Second grant changes nothing and records nothing.
    assert!(!engine
        .roles
        .add_permission(role.role_id, "Bookings.View", None)
        .await
        .unwrap());

    assert!(engine
        .roles
        .remove_permission(role.role_id, "Bookings.View", None)
        .await
        .unwrap());
    assert!(!engine
        .roles
        .remove_permission(role.role_id, "Bookings.View", None)
        .await
        .unwrap());

    let events = db.find_undispatched_events(50).await.unwrap();
    let changes: Vec<_> = events
        .iter()
        .filter(|e| e.event_name == "role.permissions_changed")
        .collect();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].payload["change"], "added");
    assert_eq!(changes[1].payload["change"], "removed");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn allow_list_blocks_out_of_scope_grants() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "helix", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "helix-east", TenantType::Branch, Some(brand.tenant_id)).await;
    let branch_role = common::seed_role(&db, "Greeter", Some(branch.tenant_id)).await;

    // Brand-level administration is out of reach for a branch role.
    let result = engine
        .roles
        .add_permission(branch_role.role_id, "Brands.ManageBranches", None)
        .await;
    assert!(matches!(result, Err(IdentityError::Validation(_))));

    // System administration is out of reach for any tenant-scoped role.
    let result = engine
        .roles
        .add_permission(branch_role.role_id, "System.ManageTenants", None)
        .await;
    assert!(matches!(result, Err(IdentityError::Validation(_))));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn role_inheritance_resolves_through_the_chain() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "verve", TenantType::Brand, None).await;
    let base = common::seed_role(&db, "Staff", Some(brand.tenant_id)).await;
    let manager = common::seed_role(&db, "Manager", Some(brand.tenant_id)).await;

    engine
        .roles
        .add_permission(base.role_id, "Bookings.View", None)
        .await
        .unwrap();
    engine
        .roles
        .add_permission(manager.role_id, "Staff.Manage", None)
        .await
        .unwrap();
    engine
        .roles
        .set_parent_role(manager.role_id, Some(base.role_id))
        .await
        .unwrap();

    let user = common::seed_user(&db, "mgr@example.com").await;
    engine
        .roles
        .assign_role_to_user(user.user_id, Some(brand.tenant_id), manager.role_id, true)
        .await
        .unwrap();

    let resolved = engine
        .permissions
        .resolve(user.user_id, Some(brand.tenant_id))
        .await
        .unwrap();
    assert!(resolved.contains("Bookings.View"));
    assert!(resolved.contains("Staff.Manage"));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn cyclic_parent_assignments_are_rejected() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let a = common::seed_role(&db, "A", None).await;
    let b = common::seed_role(&db, "B", None).await;

    engine.roles.set_parent_role(b.role_id, Some(a.role_id)).await.unwrap();

    let result = engine.roles.set_parent_role(a.role_id, Some(b.role_id)).await;
    assert!(matches!(result, Err(IdentityError::Validation(_))));

    let result = engine.roles.set_parent_role(a.role_id, Some(a.role_id)).await;
    assert!(matches!(result, Err(IdentityError::Validation(_))));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn system_memberships_apply_where_no_tenant_membership_exists() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "atlas", TenantType::Brand, None).await;
    let support = common::seed_role(&db, "Platform Support", None).await;
    engine
        .roles
        .add_permission(support.role_id, "System.ManageTenants", None)
        .await
        .unwrap();

    let user = common::seed_user(&db, "support@example.com").await;
    engine
        .roles
        .assign_role_to_user(user.user_id, None, support.role_id, true)
        .await
        .unwrap();

    // No brand membership, so the system-wide role carries into the brand.
    let resolved = engine
        .permissions
        .resolve(user.user_id, Some(brand.tenant_id))
        .await
        .unwrap();
    assert!(resolved.contains("System.ManageTenants"));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn assignment_rejects_roles_whose_inherited_permissions_exceed_the_tenant() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "ridge", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "ridge-01", TenantType::Branch, Some(brand.tenant_id)).await;

    // A branch role inheriting a brand-only permission through its parent.
    let brand_role = common::seed_role(&db, "Brand Ops", Some(brand.tenant_id)).await;
    engine
        .roles
        .add_permission(brand_role.role_id, "Brands.ManageBranches", None)
        .await
        .unwrap();
    let branch_role = common::seed_role(&db, "Branch Ops", Some(branch.tenant_id)).await;
    engine
        .roles
        .set_parent_role(branch_role.role_id, Some(brand_role.role_id))
        .await
        .unwrap();

    let user = common::seed_user(&db, "gate@example.com").await;
    let result = engine
        .roles
        .assign_role_to_user(user.user_id, Some(branch.tenant_id), branch_role.role_id, false)
        .await;
    assert!(matches!(result, Err(IdentityError::Validation(_))));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn authentication_context_spans_all_memberships() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "plume", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "plume-01", TenantType::Branch, Some(brand.tenant_id)).await;

    let brand_admin = common::seed_role(&db, "BrandAdmin", Some(brand.tenant_id)).await;
    let branch_staff = common::seed_role(&db, "BranchStaff", Some(branch.tenant_id)).await;
    engine
        .roles
        .add_permission(brand_admin.role_id, "Brands.Edit", None)
        .await
        .unwrap();
    engine
        .roles
        .add_permission(branch_staff.role_id, "Bookings.View", None)
        .await
        .unwrap();

    let user = common::seed_user(&db, "both@example.com").await;
    engine
        .roles
        .assign_role_to_user(user.user_id, Some(brand.tenant_id), brand_admin.role_id, true)
        .await
        .unwrap();
    engine
        .roles
        .assign_role_to_user(user.user_id, Some(branch.tenant_id), branch_staff.role_id, false)
        .await
        .unwrap();

    let claims = engine.claims.build_claims(&user).await.unwrap();
    let values = |key: &str| {
        claims
            .iter()
            .filter(|c| c.key == key)
            .map(|c| c.value.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(values("brand_id"), vec![brand.tenant_id.to_string()]);
    assert_eq!(values("branch_id"), vec![branch.tenant_id.to_string()]);
    let permissions = values("permission");
    assert!(permissions.contains(&"Brands.Edit".to_string()));
    assert!(permissions.contains(&"Bookings.View".to_string()));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn a_user_with_no_roles_resolves_to_an_empty_set() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let user = common::seed_user(&db, "nobody@example.com").await;
    let resolved = engine.permissions.resolve(user.user_id, None).await.unwrap();
    assert!(resolved.is_empty());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn duplicate_role_assignment_is_a_conflict() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "kite", TenantType::Brand, None).await;
    let role = common::seed_role(&db, "Host", Some(brand.tenant_id)).await;
    let user = common::seed_user(&db, "dup@example.com").await;

    engine
        .roles
        .assign_role_to_user(user.user_id, Some(brand.tenant_id), role.role_id, false)
        .await
        .unwrap();
    let result = engine
        .roles
        .assign_role_to_user(user.user_id, Some(brand.tenant_id), role.role_id, false)
        .await;
    assert!(matches!(result, Err(IdentityError::Conflict(_))));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn a_new_default_membership_clears_the_previous_one() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "prism", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "prism-east", TenantType::Branch, Some(brand.tenant_id)).await;
    let user = common::seed_user(&db, "switcher@example.com").await;
    let brand_role = common::seed_role(&db, "Owner", Some(brand.tenant_id)).await;
    let branch_role = common::seed_role(&db, "Manager", Some(branch.tenant_id)).await;

    engine
        .roles
        .assign_role_to_user(user.user_id, Some(brand.tenant_id), brand_role.role_id, true)
        .await
        .unwrap();
    engine
        .roles
        .assign_role_to_user(user.user_id, Some(branch.tenant_id), branch_role.role_id, true)
        .await
        .unwrap();

    let memberships = db.find_active_memberships(user.user_id).await.unwrap();
    assert_eq!(memberships.len(), 2);
    let defaults: Vec<_> = memberships.iter().filter(|m| m.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].tenant_id, Some(branch.tenant_id));
}
