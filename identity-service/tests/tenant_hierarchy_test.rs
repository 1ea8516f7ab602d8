//! Tenant creation, traversal, reparenting, and soft deletion.

mod common;

use identity_core::error::IdentityError;
use identity_service::models::{TenantModule, TenantType};

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn ancestors_walk_to_the_root() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let system = common::seed_tenant(&db, "platform", TenantType::System, None).await;
    let brand =
        common::seed_tenant(&db, "zen", TenantType::Brand, Some(system.tenant_id)).await;
    let branch =
        common::seed_tenant(&db, "zen-north", TenantType::Branch, Some(brand.tenant_id)).await;

    let ancestors = engine.hierarchy.get_ancestors(branch.tenant_id).await.unwrap();
    let ids: Vec<_> = ancestors.iter().map(|t| t.tenant_id).collect();
    assert_eq!(ids, vec![brand.tenant_id, system.tenant_id]);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn duplicate_tenant_keys_are_conflicts() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    engine
        .hierarchy
        .create_tenant("Zen".to_string(), "ZEN".to_string(), TenantType::Brand, None, None)
        .await
        .unwrap();
    // Keys normalize to lowercase, so a differently cased duplicate collides.
    let result = engine
        .hierarchy
        .create_tenant("Zen 2".to_string(), "zen".to_string(), TenantType::Brand, None, None)
        .await;
    assert!(matches!(result, Err(IdentityError::Conflict(_))));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn reparent_moves_a_branch_and_inherits_modules() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let old_brand = common::seed_tenant(&db, "alpha", TenantType::Brand, None).await;
    let new_brand = common::seed_tenant(&db, "beta", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "alpha-01", TenantType::Branch, Some(old_brand.tenant_id)).await;

    db.insert_tenant_module(&TenantModule::new(new_brand.tenant_id, "Payroll".to_string()))
        .await
        .unwrap();
    db.insert_tenant_module(&TenantModule::new(new_brand.tenant_id, "Bookings".to_string()))
        .await
        .unwrap();

    engine
        .hierarchy
        .reparent(branch.tenant_id, new_brand.tenant_id, None)
        .await
        .unwrap();

    let moved = db.find_tenant_by_id(branch.tenant_id).await.unwrap().unwrap();
    assert_eq!(moved.parent_tenant_id, Some(new_brand.tenant_id));

    let modules = db.find_tenant_modules(branch.tenant_id).await.unwrap();
    let codes: Vec<_> = modules
        .iter()
        .filter(|m| m.has_access())
        .map(|m| m.module_code.as_str())
        .collect();
    assert!(codes.contains(&"Payroll"));
    assert!(codes.contains(&"Bookings"));

    let events = db.find_undispatched_events(50).await.unwrap();
    assert!(events.iter().any(|e| e.event_name == "tenant.reparented"));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn reparent_rejects_invalid_moves() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "gamma", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "gamma-01", TenantType::Branch, Some(brand.tenant_id)).await;
    let department = common::seed_tenant(
        &db,
        "gamma-01-desk",
        TenantType::Department,
        Some(branch.tenant_id),
    )
    .await;

    // Already there.
    assert!(engine
        .hierarchy
        .reparent(branch.tenant_id, brand.tenant_id, None)
        .await
        .is_err());
    // Itself.
    assert!(engine
        .hierarchy
        .reparent(branch.tenant_id, branch.tenant_id, None)
        .await
        .is_err());
    // A descendant.
    assert!(engine
        .hierarchy
        .reparent(branch.tenant_id, department.tenant_id, None)
        .await
        .is_err());
    // Only a branch moves, and only under a brand.
    assert!(engine
        .hierarchy
        .reparent(brand.tenant_id, branch.tenant_id, None)
        .await
        .is_err());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn soft_delete_refuses_tenants_with_children() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, _events) = common::engine(db.clone());

    let brand = common::seed_tenant(&db, "delta", TenantType::Brand, None).await;
    let branch =
        common::seed_tenant(&db, "delta-01", TenantType::Branch, Some(brand.tenant_id)).await;

    let result = engine.hierarchy.soft_delete(brand.tenant_id, None).await;
    assert!(matches!(result, Err(IdentityError::Validation(_))));

    engine.hierarchy.soft_delete(branch.tenant_id, None).await.unwrap();
    engine.hierarchy.soft_delete(brand.tenant_id, None).await.unwrap();

    let gone = db.find_tenant_by_id(brand.tenant_id).await.unwrap().unwrap();
    assert!(gone.is_deleted);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn outbox_dispatch_is_ordered_and_resumable() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;
    let (_keys, engine, _codes, events) = common::engine(db.clone());

    engine
        .hierarchy
        .create_tenant("One".to_string(), "one".to_string(), TenantType::Brand, None, None)
        .await
        .unwrap();
    engine
        .hierarchy
        .create_tenant("Two".to_string(), "two".to_string(), TenantType::Brand, None, None)
        .await
        .unwrap();

    // Broker outage: nothing dispatches, rows stay pending.
    events.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(engine.outbox.dispatch_pending(10).await.unwrap(), 0);
    assert_eq!(db.find_undispatched_events(10).await.unwrap().len(), 2);

    // Recovery drains in creation order.
    events.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(engine.outbox.dispatch_pending(10).await.unwrap(), 2);
    assert!(db.find_undispatched_events(10).await.unwrap().is_empty());

    let published = events.events.lock().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].1["tenant_key"], "one");
    assert_eq!(published[1].1["tenant_key"], "two");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn a_row_on_column_defaults_counts_as_active() {
    let db = common::setup_db().await;
    common::cleanup(&db).await;

    let tenant_id = uuid::Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tenants (tenant_id, tenant_name, tenant_key, tenant_type_code) \
         VALUES ($1, 'Bare', 'bare', 'brand')",
    )
    .bind(tenant_id)
    .execute(db.pool())
    .await
    .unwrap();

    let tenant = db.find_tenant_by_id(tenant_id).await.unwrap().unwrap();
    assert!(tenant.is_active());
}
