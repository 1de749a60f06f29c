//! The five concrete end-to-end scenarios against the seed topology:
//! Org1⊃{Wks1⊃{Res1,Res2}, Wks2⊃{Res3,Res4}}; Org2⊃{Wks3⊃{Res5}, Wks4⊃{Res6}};
//! users 1-5.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tvm::config::VendingConfig;
use tvm::error::TvmError;
use tvm::identity::{RequestContext, StaticEmailProvider};
use tvm::scope::{EntityScope, EntityType, Scope, UserScope};
use tvm::store::memory::InMemoryQuerier;
use tvm::store::Querier;
use tvm::vending::{Principal, VendingMachine};

fn es(t: EntityType, id: i64, s: Scope) -> EntityScope {
    EntityScope::new(t, id, s)
}

async fn build_machine() -> VendingMachine<InMemoryQuerier> {
    let store = InMemoryQuerier::new();

    store.seed_workspace(1, 1).await;
    store.seed_workspace(2, 1).await;
    store.seed_workspace(3, 2).await;
    store.seed_workspace(4, 2).await;
    store.seed_resource(1, 1, 1).await;
    store.seed_resource(2, 1, 1).await;
    store.seed_resource(3, 2, 1).await;
    store.seed_resource(4, 2, 1).await;
    store.seed_resource(5, 3, 2).await;
    store.seed_resource(6, 4, 2).await;

    let rwa = |user_id: i64, entity_type: EntityType, entity_id: i64| {
        vec![Scope::Read, Scope::Write, Scope::Admin]
            .into_iter()
            .map(move |scope| UserScope { user_id, entity_type, entity_id, scope })
            .collect::<Vec<_>>()
    };

    // User 1: Org1 R/W/A, self R/W/A.
    let mut user1 = rwa(1, EntityType::Organization, 1);
    user1.extend(rwa(1, EntityType::User, 1));
    store.seed_user(1, "user1@example.com", user1).await;

    // User 3: Org1 R/W, Org2 R/W, Res1 R/W/A, Res3 R/W/A, self R/W/A.
    let mut user3 = vec![
        UserScope { user_id: 3, entity_type: EntityType::Organization, entity_id: 1, scope: Scope::Read },
        UserScope { user_id: 3, entity_type: EntityType::Organization, entity_id: 1, scope: Scope::Write },
        UserScope { user_id: 3, entity_type: EntityType::Organization, entity_id: 2, scope: Scope::Read },
        UserScope { user_id: 3, entity_type: EntityType::Organization, entity_id: 2, scope: Scope::Write },
    ];
    user3.extend(rwa(3, EntityType::Resource, 1));
    user3.extend(rwa(3, EntityType::Resource, 3));
    user3.extend(rwa(3, EntityType::User, 3));
    store.seed_user(3, "user3@example.com", user3).await;

    // User 4: Wks3 R/W, self R/W/A.
    let mut user4 = vec![
        UserScope { user_id: 4, entity_type: EntityType::Workspace, entity_id: 3, scope: Scope::Read },
        UserScope { user_id: 4, entity_type: EntityType::Workspace, entity_id: 3, scope: Scope::Write },
    ];
    user4.extend(rwa(4, EntityType::User, 4));
    store.seed_user(4, "user4@example.com", user4).await;

    // User 5: Res5 R, Res6 R, self R/W/A.
    let mut user5 = vec![
        UserScope { user_id: 5, entity_type: EntityType::Resource, entity_id: 5, scope: Scope::Read },
        UserScope { user_id: 5, entity_type: EntityType::Resource, entity_id: 6, scope: Scope::Read },
    ];
    user5.extend(rwa(5, EntityType::User, 5));
    store.seed_user(5, "user5@example.com", user5).await;

    VendingMachine::new(Arc::new(store), VendingConfig::default())
}

async fn login_token(machine: &VendingMachine<InMemoryQuerier>, email: &str) -> String {
    let provider = StaticEmailProvider::new(email);
    machine
        .exchange(&provider, &RequestContext::default(), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn scenario_1_user1_has_org1_and_inherited_access_but_not_sibling_or_self() {
    let machine = build_machine().await;
    let t1 = login_token(&machine, "user1@example.com").await;
    let c = CancellationToken::new();

    machine.verify(&t1, es(EntityType::Organization, 1, Scope::Admin), &c).await.unwrap();
    assert_eq!(
        machine.verify(&t1, es(EntityType::Organization, 2, Scope::Read), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
    machine.verify(&t1, es(EntityType::Workspace, 1, Scope::Write), &c).await.unwrap();
    machine.verify(&t1, es(EntityType::Resource, 2, Scope::Write), &c).await.unwrap();
    assert_eq!(
        machine.verify(&t1, es(EntityType::User, 2, Scope::Read), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
}

#[tokio::test]
async fn scenario_2_user3_mixed_grants_across_two_orgs() {
    let machine = build_machine().await;
    let t3 = login_token(&machine, "user3@example.com").await;
    let c = CancellationToken::new();

    assert_eq!(
        machine.verify(&t3, es(EntityType::Organization, 1, Scope::Admin), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
    machine.verify(&t3, es(EntityType::Workspace, 2, Scope::Read), &c).await.unwrap();
    machine.verify(&t3, es(EntityType::Resource, 1, Scope::Admin), &c).await.unwrap();
    assert_eq!(
        machine.verify(&t3, es(EntityType::Resource, 2, Scope::Admin), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
    machine.verify(&t3, es(EntityType::Resource, 5, Scope::Write), &c).await.unwrap();
}

#[tokio::test]
async fn scenario_3_user4_workspace_grant_has_no_upward_inheritance() {
    let machine = build_machine().await;
    let t4 = login_token(&machine, "user4@example.com").await;
    let c = CancellationToken::new();

    assert_eq!(
        machine.verify(&t4, es(EntityType::Workspace, 3, Scope::Admin), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
    machine.verify(&t4, es(EntityType::Resource, 5, Scope::Write), &c).await.unwrap();
    assert_eq!(
        machine.verify(&t4, es(EntityType::Organization, 2, Scope::Read), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
}

#[tokio::test]
async fn scenario_4_user5_resource_read_only() {
    let machine = build_machine().await;
    let t5 = login_token(&machine, "user5@example.com").await;
    let c = CancellationToken::new();

    machine.verify(&t5, es(EntityType::Resource, 5, Scope::Read), &c).await.unwrap();
    assert_eq!(
        machine.verify(&t5, es(EntityType::Resource, 5, Scope::Write), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
    assert_eq!(
        machine.verify(&t5, es(EntityType::Workspace, 3, Scope::Read), &c).await.unwrap_err(),
        TvmError::InsufficientPermissions
    );
}

#[tokio::test]
async fn scenario_5_issue_bounds_and_self_check() {
    let store = InMemoryQuerier::new();
    store.seed_user(3, "user3@example.com", vec![UserScope {
        user_id: 3,
        entity_type: EntityType::Organization,
        entity_id: 1,
        scope: Scope::Write,
    }]).await;
    let config = VendingConfig { max_token_duration_secs: 24 * 3600, ..VendingConfig::default() };
    let machine = VendingMachine::new(Arc::new(store), config);
    let c = CancellationToken::new();

    let err = machine
        .issue("svc", 3, Principal::new(EntityType::Organization, 1), vec![], Duration::from_secs(25 * 3600), &c)
        .await
        .unwrap_err();
    assert_eq!(err, TvmError::DurationExceedsMaxAllowed);

    let err = machine
        .issue(
            "svc",
            3,
            Principal::new(EntityType::Organization, 1),
            vec![es(EntityType::Organization, 1, Scope::Admin)],
            Duration::from_secs(3600),
            &c,
        )
        .await
        .unwrap_err();
    assert_eq!(err, TvmError::InsufficientPermissions);
}

#[tokio::test]
async fn scenario_6_expiry_then_reap() {
    let store = Arc::new(InMemoryQuerier::new());
    store.seed_user(1, "a@example.com", vec![]).await;
    let machine = VendingMachine::new(store.clone(), VendingConfig::default());
    let c = CancellationToken::new();

    let token = machine
        .issue("svc", 1, Principal::new(EntityType::User, 1), vec![], Duration::from_secs(1), &c)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(
        machine.verify(&token, es(EntityType::User, 1, Scope::Read), &c).await.unwrap_err(),
        TvmError::TokenExpired
    );

    store.delete_expired_tokens(chrono::Utc::now()).await.unwrap();
    assert_eq!(
        machine.verify(&token, es(EntityType::User, 1, Scope::Read), &c).await.unwrap_err(),
        TvmError::TokenNotFound
    );
}
