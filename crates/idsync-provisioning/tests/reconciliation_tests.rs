//! Reconciliation Engine Tests
//!
//! Pull and push against an in-memory connector and entity store:
//! - Unmatching rules (ASSIGN, PROVISION, IGNORE, UNLINK) on pull
//! - Matching rules (UPDATE, DEPROVISION, UNASSIGN, LINK, UNLINK) and
//!   ambiguity policies
//! - Delete deltas, dry runs and structurally invalid provisions
//! - Incremental pull with sync tokens, full pull with pagination
//! - Push with every matching and unmatching rule, and filters

mod common;

use std::sync::Arc;
use std::time::Duration;

use idsync_connector::{
    full_capabilities, AttributeSet, CorrelationRule, ExternalResource, Item, Mapping, ObjectClass,
    Provision, SyncDelta,
};
use idsync_core::{AnyTypeKind, Entity, EntityStore};
use idsync_provisioning::reconciliation::DRY_RUN;
use idsync_provisioning::{
    AmbiguityPolicy, MatchingRule, ProvisioningConfig, ProvisioningError, PullOptions, PushFilter,
    PushOptions, ReconciliationStatus, ResourceOperation, UnmatchingRule,
};

use common::{remote_user, resource, user_provision, Fixture, MemoryConnector, LDAP};

const DB: &str = "resource-db";

fn pull(matching: MatchingRule, unmatching: UnmatchingRule) -> PullOptions {
    PullOptions::default().with_rules(matching, unmatching)
}

async fn fixture_with_ldap() -> (Fixture, Arc<MemoryConnector>) {
    let fixture = Fixture::new();
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    fixture.register(resource(LDAP), Arc::clone(&ldap)).await;
    (fixture, ldap)
}

async fn stored_user(fixture: &Fixture, name: &str) -> Option<Entity> {
    fixture.store.find_by_name(AnyTypeKind::User, name).await.unwrap()
}

// =============================================================================
// Pull: unmatched
// =============================================================================

#[tokio::test]
async fn test_unmatched_assign_creates_and_links() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Assign),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Create);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.rule.as_deref(), Some("ASSIGN"));
    assert_eq!(result.propagation.len(), 1);
    assert!(result.propagation[0].is_success());

    let user = stored_user(&fixture, "rossini").await.unwrap();
    assert_eq!(result.key, Some(user.key));
    assert!(user.has_resource(&Fixture::key(LDAP)));
    assert_eq!(
        user.plain_attr("email").unwrap().values_as_strings(),
        vec!["rossini@example.com"]
    );
    assert_eq!(ldap.creates(), 0);
}

#[tokio::test]
async fn test_unmatched_provision_does_not_link() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("verdi", remote_user("verdi", "verdi@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Provision),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Create);
    assert_eq!(result.status, ReconciliationStatus::Success);
    let user = stored_user(&fixture, "verdi").await.unwrap();
    assert!(!user.has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_unmatched_ignore_performs_no_mutation() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Ignore);
    assert!(result.propagation.is_empty());
    assert!(fixture.store.is_empty().await);
    assert_eq!(ldap.writes(), 0);
}

#[tokio::test]
async fn test_unmatched_unlink_is_a_noop() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Unlink),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Ignore);
    assert_eq!(result.rule.as_deref(), Some("UNLINK"));
    assert!(result.propagation.is_empty());
    assert!(fixture.store.is_empty().await);
    assert_eq!(ldap.writes(), 0);
}

#[tokio::test]
async fn test_dry_run_reports_without_changes() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Assign).dry_run(),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Create);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.message.as_deref(), Some(DRY_RUN));
    assert!(fixture.store.is_empty().await);
    assert_eq!(ldap.writes(), 0);
}

#[tokio::test]
async fn test_create_disallowed_is_ignored() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));
    let mut options = pull(MatchingRule::Update, UnmatchingRule::Assign);
    options.perform_create = false;

    let result = fixture
        .service
        .reconcile(&Fixture::key(LDAP), "USER", &SyncDelta::create_or_update(object), &options)
        .await;

    assert_eq!(result.operation, ResourceOperation::Create);
    assert_eq!(result.status, ReconciliationStatus::Ignore);
    assert!(fixture.store.is_empty().await);
}

// =============================================================================
// Pull: matched
// =============================================================================

#[tokio::test]
async fn test_matched_update_propagates_to_other_resources() {
    let fixture = Fixture::new();
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    let db = Arc::new(MemoryConnector::new("db"));
    fixture.register(resource(LDAP), Arc::clone(&ldap)).await;
    fixture.register(resource(DB), Arc::clone(&db)).await;

    let user = fixture
        .store
        .save(
            Entity::user("rossini")
                .with_unique("email", "old@example.com")
                .with_resource(LDAP)
                .with_resource(DB),
        )
        .await
        .unwrap();
    db.seed("rossini", remote_user("rossini", "old@example.com"));
    let object = ldap.seed("rossini", remote_user("rossini", "new@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Update);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.key, Some(user.key));

    let stored = stored_user(&fixture, "rossini").await.unwrap();
    assert_eq!(
        stored.plain_attr("email").unwrap().values_as_strings(),
        vec!["new@example.com"]
    );
    assert!(stored.last_change_date.is_some());

    // The pulled resource is left alone, the other one follows.
    assert_eq!(ldap.writes(), 0);
    assert_eq!(db.updates(), 1);
    assert_eq!(
        db.object("rossini").unwrap().attributes.get_strings("mail"),
        vec!["new@example.com"]
    );
}

#[tokio::test]
async fn test_matched_unassign_deletes_remote_and_unlinks() {
    let (fixture, ldap) = fixture_with_ldap().await;
    fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP))
        .await
        .unwrap();
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Unassign, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Delete);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(ldap.deletes(), 1);
    assert!(ldap.object("rossini").is_none());
    let stored = stored_user(&fixture, "rossini").await.unwrap();
    assert!(!stored.has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_matched_deprovision_deletes_remote_and_keeps_link() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP))
        .await
        .unwrap();
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Deprovision, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Delete);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.rule.as_deref(), Some("DEPROVISION"));
    assert_eq!(result.propagation.len(), 1);
    assert!(result.propagation[0].is_success());
    assert_eq!(ldap.deletes(), 1);
    assert!(ldap.object("rossini").is_none());

    let stored = stored_user(&fixture, "rossini").await.unwrap();
    assert_eq!(stored.key, user.key);
    assert!(stored.has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_matched_unlink_drops_link_without_propagation() {
    let (fixture, ldap) = fixture_with_ldap().await;
    fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP))
        .await
        .unwrap();
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Unlink, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.rule.as_deref(), Some("UNLINK"));
    assert!(result.propagation.is_empty());
    let stored = stored_user(&fixture, "rossini").await.unwrap();
    assert!(!stored.has_resource(&Fixture::key(LDAP)));
    assert_eq!(ldap.writes(), 0);
    assert!(ldap.object("rossini").is_some());
}

#[tokio::test]
async fn test_matched_link_adds_resource_without_propagation() {
    let (fixture, ldap) = fixture_with_ldap().await;
    fixture.store.save(Entity::user("rossini")).await.unwrap();
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Link, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Success);
    assert!(result.propagation.is_empty());
    let stored = stored_user(&fixture, "rossini").await.unwrap();
    assert!(stored.has_resource(&Fixture::key(LDAP)));
    assert_eq!(ldap.writes(), 0);
}

// =============================================================================
// Pull: ambiguity
// =============================================================================

async fn correlated_fixture() -> (Fixture, Arc<MemoryConnector>, Entity, Entity) {
    let fixture = Fixture::new();
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    let provision = user_provision().with_correlation_rule(CorrelationRule {
        int_attr_names: vec!["email".to_string()],
    });
    fixture
        .register(
            ExternalResource::new(LDAP, full_capabilities()).with_provision(provision),
            Arc::clone(&ldap),
        )
        .await;

    let first = fixture
        .store
        .save(Entity::user("first").with_unique("email", "shared@example.com"))
        .await
        .unwrap();
    let second = fixture
        .store
        .save(Entity::user("second").with_unique("email", "shared@example.com"))
        .await
        .unwrap();
    (fixture, ldap, first, second)
}

#[tokio::test]
async fn test_first_match_updates_only_first() {
    let (fixture, ldap, first, second) = correlated_fixture().await;
    let object = ldap.seed(
        "shared",
        remote_user("shared", "shared@example.com").with("givenName", "Gioachino"),
    );

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Ignore)
                .with_ambiguity(AmbiguityPolicy::FirstMatch),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Update);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.key, Some(first.key));

    let first = fixture.store.find(AnyTypeKind::User, first.key).await.unwrap().unwrap();
    let second_now = fixture.store.find(AnyTypeKind::User, second.key).await.unwrap().unwrap();
    assert_eq!(
        first.plain_attr("firstname").unwrap().values_as_strings(),
        vec!["Gioachino"]
    );
    assert_eq!(second_now, second);
}

#[tokio::test]
async fn test_last_match_updates_only_last() {
    let (fixture, ldap, first, second) = correlated_fixture().await;
    let object = ldap.seed(
        "shared",
        remote_user("shared", "shared@example.com").with("givenName", "Gioachino"),
    );

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Ignore)
                .with_ambiguity(AmbiguityPolicy::LastMatch),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Update);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.key, Some(second.key));

    let first_now = fixture.store.find(AnyTypeKind::User, first.key).await.unwrap().unwrap();
    let second = fixture.store.find(AnyTypeKind::User, second.key).await.unwrap().unwrap();
    assert_eq!(
        second.plain_attr("firstname").unwrap().values_as_strings(),
        vec!["Gioachino"]
    );
    assert_eq!(first_now, first);
}

#[tokio::test]
async fn test_ambiguous_match_ignored_by_default() {
    let (fixture, ldap, first, second) = correlated_fixture().await;
    let object = ldap.seed(
        "shared",
        remote_user("shared", "shared@example.com").with("givenName", "Gioachino"),
    );

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::create_or_update(object),
            &pull(MatchingRule::Update, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Ignore);
    assert_eq!(result.message.as_deref(), Some("2 entities match"));
    for entity in [first, second] {
        let now = fixture.store.find(AnyTypeKind::User, entity.key).await.unwrap().unwrap();
        assert_eq!(now, entity);
    }
}

// =============================================================================
// Pull: deletes
// =============================================================================

#[tokio::test]
async fn test_delete_delta_deletes_entity_and_other_accounts() {
    let fixture = Fixture::new();
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    let db = Arc::new(MemoryConnector::new("db"));
    fixture.register(resource(LDAP), Arc::clone(&ldap)).await;
    fixture.register(resource(DB), Arc::clone(&db)).await;
    fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP).with_resource(DB))
        .await
        .unwrap();
    db.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::delete("rossini"),
            &PullOptions::default(),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Delete);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert!(stored_user(&fixture, "rossini").await.is_none());
    assert_eq!(db.deletes(), 1);
    assert_eq!(db.object_count(), 0);
    assert_eq!(ldap.writes(), 0);
}

#[tokio::test]
async fn test_delete_delta_without_match_is_ignored() {
    let (fixture, ldap) = fixture_with_ldap().await;

    let result = fixture
        .service
        .reconcile(
            &Fixture::key(LDAP),
            "USER",
            &SyncDelta::delete("nobody"),
            &PullOptions::default(),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Delete);
    assert_eq!(result.status, ReconciliationStatus::Ignore);
    assert_eq!(ldap.writes(), 0);
}

// =============================================================================
// Pull: jobs
// =============================================================================

#[tokio::test]
async fn test_pull_incremental_resumes_from_token() {
    let mut config = ProvisioningConfig::default();
    config.pull_page_size = 1;
    let fixture = Fixture::with_config(config);
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    fixture.register(resource(LDAP), Arc::clone(&ldap)).await;

    for name in ["rossini", "verdi"] {
        let object = ldap.seed(name, remote_user(name, &format!("{name}@example.com")));
        ldap.push_change(SyncDelta::create_or_update(object));
    }
    let options = pull(MatchingRule::Update, UnmatchingRule::Assign);

    let report = fixture
        .service
        .pull_incremental(&Fixture::key(LDAP), "USER", &options)
        .await
        .unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report.count(ResourceOperation::Create, ReconciliationStatus::Success), 2);
    assert!(report.finished_at.is_some());
    assert_eq!(fixture.store.len().await, 2);

    let again = fixture
        .service
        .pull_incremental(&Fixture::key(LDAP), "USER", &options)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_dry_run_pull_keeps_token() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let object = ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));
    ldap.push_change(SyncDelta::create_or_update(object));
    let options = pull(MatchingRule::Update, UnmatchingRule::Assign).dry_run();

    for _ in 0..2 {
        let report = fixture
            .service
            .pull_incremental(&Fixture::key(LDAP), "USER", &options)
            .await
            .unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.dry_run);
    }
    assert!(fixture.store.is_empty().await);
}

#[tokio::test]
async fn test_pull_full_walks_every_page() {
    let mut config = ProvisioningConfig::default();
    config.pull_page_size = 2;
    let fixture = Fixture::with_config(config);
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    fixture.register(resource(LDAP), Arc::clone(&ldap)).await;
    for name in ["rossini", "verdi", "puccini"] {
        ldap.seed(name, remote_user(name, &format!("{name}@example.com")));
    }

    let report = fixture
        .service
        .pull_full(
            &Fixture::key(LDAP),
            "USER",
            &pull(MatchingRule::Update, UnmatchingRule::Assign),
        )
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.failures().count(), 0);
    for name in ["rossini", "verdi", "puccini"] {
        assert!(stored_user(&fixture, name).await.is_some());
    }
}

#[tokio::test]
async fn test_pull_full_stops_on_repeated_cookie() {
    let (fixture, ldap) = fixture_with_ldap().await;
    ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));
    ldap.set_repeat_cookie(true);

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        fixture.service.pull_full(
            &Fixture::key(LDAP),
            "USER",
            &pull(MatchingRule::Ignore, UnmatchingRule::Ignore),
        ),
    )
    .await
    .expect("pull must stop on a repeated cookie")
    .unwrap();

    assert_eq!(ldap.searches(), 2);
    assert_eq!(report.len(), 2);
    assert_eq!(report.failures().count(), 0);
    assert!(fixture.store.is_empty().await);
}

#[tokio::test]
async fn test_provision_without_connector_key_aborts() {
    let fixture = Fixture::new();
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    let provision = Provision::new(
        "USER",
        ObjectClass::account(),
        Mapping::new(vec![Item::new("email", "mail")]),
    );
    fixture
        .register(
            ExternalResource::new(LDAP, full_capabilities()).with_provision(provision),
            Arc::clone(&ldap),
        )
        .await;
    ldap.seed("rossini", AttributeSet::new().with("mail", "rossini@example.com"));

    let err = fixture
        .service
        .pull_full(&Fixture::key(LDAP), "USER", &PullOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::MissingConnectorKey { .. }));
    assert!(err.is_structural());
    assert!(fixture.store.is_empty().await);
}

#[tokio::test]
async fn test_unknown_resource_is_a_failure_result() {
    let fixture = Fixture::new();

    let result = fixture
        .service
        .reconcile(
            &Fixture::key("resource-missing"),
            "USER",
            &SyncDelta::delete("rossini"),
            &PullOptions::default(),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Failure);
    assert!(result.message.unwrap().contains("resource-missing"));
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test]
async fn test_push_unmatched_assign_creates_remote_and_links() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture
        .store
        .save(Entity::user("rossini").with_unique("email", "rossini@example.com"))
        .await
        .unwrap();

    let result = fixture
        .service
        .push(&Fixture::key(LDAP), &user, &PushOptions::default())
        .await;

    assert_eq!(result.operation, ResourceOperation::Create);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.uid.as_deref(), Some("rossini"));
    assert!(!result.has_propagation_failures());
    assert_eq!(ldap.creates(), 1);
    assert_eq!(
        ldap.object("rossini").unwrap().attributes.get_strings("mail"),
        vec!["rossini@example.com"]
    );
    let stored = stored_user(&fixture, "rossini").await.unwrap();
    assert!(stored.has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_push_matched_link_only_links() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();
    ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .push(&Fixture::key(LDAP), &user, &PushOptions::default())
        .await;

    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.rule.as_deref(), Some("LINK"));
    assert_eq!(ldap.writes(), 0);
    assert!(stored_user(&fixture, "rossini")
        .await
        .unwrap()
        .has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_push_unmatched_unlink_drops_link() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP))
        .await
        .unwrap();

    let result = fixture
        .service
        .push(
            &Fixture::key(LDAP),
            &user,
            &PushOptions::default().with_rules(MatchingRule::Link, UnmatchingRule::Unlink),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.rule.as_deref(), Some("UNLINK"));
    assert_eq!(ldap.writes(), 0);
    assert!(!stored_user(&fixture, "rossini")
        .await
        .unwrap()
        .has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_push_unmatched_unlink_of_unlinked_entity_is_ignored() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();

    let result = fixture
        .service
        .push(
            &Fixture::key(LDAP),
            &user,
            &PushOptions::default().with_rules(MatchingRule::Link, UnmatchingRule::Unlink),
        )
        .await;

    assert_eq!(result.status, ReconciliationStatus::Ignore);
    assert_eq!(result.message.as_deref(), Some("not linked"));
    assert_eq!(ldap.writes(), 0);
}

#[tokio::test]
async fn test_push_matched_update_writes_changed_values() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture
        .store
        .save(
            Entity::user("rossini")
                .with_unique("email", "new@example.com")
                .with_resource(LDAP),
        )
        .await
        .unwrap();
    ldap.seed("rossini", remote_user("rossini", "old@example.com"));

    let result = fixture
        .service
        .push(
            &Fixture::key(LDAP),
            &user,
            &PushOptions::default().with_rules(MatchingRule::Update, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Update);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(result.propagation.len(), 1);
    assert!(result.propagation[0].is_success());
    assert_eq!(ldap.updates(), 1);
    assert_eq!(
        ldap.object("rossini").unwrap().attributes.get_strings("mail"),
        vec!["new@example.com"]
    );
}

#[tokio::test]
async fn test_push_matched_deprovision_keeps_link() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP))
        .await
        .unwrap();
    ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .push(
            &Fixture::key(LDAP),
            &user,
            &PushOptions::default().with_rules(MatchingRule::Deprovision, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Delete);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(ldap.deletes(), 1);
    assert!(ldap.object("rossini").is_none());
    assert!(stored_user(&fixture, "rossini")
        .await
        .unwrap()
        .has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_push_matched_unassign_deletes_remote_and_unlinks() {
    let (fixture, ldap) = fixture_with_ldap().await;
    let user = fixture
        .store
        .save(Entity::user("rossini").with_resource(LDAP))
        .await
        .unwrap();
    ldap.seed("rossini", remote_user("rossini", "rossini@example.com"));

    let result = fixture
        .service
        .push(
            &Fixture::key(LDAP),
            &user,
            &PushOptions::default().with_rules(MatchingRule::Unassign, UnmatchingRule::Ignore),
        )
        .await;

    assert_eq!(result.operation, ResourceOperation::Delete);
    assert_eq!(result.status, ReconciliationStatus::Success);
    assert_eq!(ldap.deletes(), 1);
    assert!(ldap.object("rossini").is_none());
    assert!(!stored_user(&fixture, "rossini")
        .await
        .unwrap()
        .has_resource(&Fixture::key(LDAP)));
}

#[tokio::test]
async fn test_push_all_honours_filter() {
    let (fixture, ldap) = fixture_with_ldap().await;
    fixture
        .store
        .save(
            Entity::user("rossini")
                .with_unique("email", "new@example.com")
                .with_resource(LDAP),
        )
        .await
        .unwrap();
    fixture
        .store
        .save(Entity::user("verdi").with_unique("email", "verdi@example.com"))
        .await
        .unwrap();
    ldap.seed("rossini", remote_user("rossini", "old@example.com"));

    let options = PushOptions::default()
        .with_rules(MatchingRule::Update, UnmatchingRule::Ignore)
        .with_filter(PushFilter {
            realm: None,
            linked_only: true,
        });
    let report = fixture
        .service
        .push_all(&Fixture::key(LDAP), "USER", &options)
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    assert_eq!(report.count(ResourceOperation::Update, ReconciliationStatus::Success), 1);
    assert_eq!(ldap.updates(), 1);
    assert_eq!(
        ldap.object("rossini").unwrap().attributes.get_strings("mail"),
        vec!["new@example.com"]
    );
    assert!(ldap.object("verdi").is_none());
}
