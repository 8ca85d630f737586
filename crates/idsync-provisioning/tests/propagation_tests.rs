//! Propagation Tests
//!
//! End-to-end propagation through the service:
//! - Priority tiers run in ascending order
//! - Connector timeouts become failed statuses without blocking others
//! - Values already present remotely are not duplicated
//! - Async mode hands back handles for no-priority tasks
//! - Resources no task can be built for still report a failed status

mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use idsync_connector::{full_capabilities, ExternalResource, Item, Mapping, ObjectClass, Provision};
use idsync_core::{AnyTypeKind, Entity, EntityStore};
use idsync_provisioning::{
    ExecStatus, OutboundOptions, PropagationByResource, ProvisioningConfig, Qualifier,
    ResourceOperation,
};

use common::{remote_user, resource, Fixture, MemoryConnector, LDAP};

fn creates_on(resources: &[&str]) -> PropagationByResource {
    let mut by_resource = PropagationByResource::new();
    by_resource.add_all(
        ResourceOperation::Create,
        resources.iter().map(|r| Fixture::key(r)),
    );
    by_resource
}

#[tokio::test]
async fn test_priorities_run_in_ascending_order() {
    let fixture = Fixture::new();
    let journal = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [("p3", 3), ("p1", 1), ("p2", 2)] {
        let connector = MemoryConnector::new(name).with_journal(Arc::clone(&journal));
        fixture
            .register(resource(name).with_priority(priority), Arc::new(connector))
            .await;
    }
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();

    let statuses = fixture
        .service
        .provision(&user, &creates_on(&["p3", "p1", "p2"]), &OutboundOptions::new())
        .await;

    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.status == ExecStatus::Success));
    assert_eq!(*journal.lock().unwrap(), vec!["p1", "p2", "p3"]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_only_the_slow_resource() {
    let fixture = Fixture::new();
    let slow = Arc::new(MemoryConnector::new("slow").with_delay(Duration::from_secs(31)));
    let fast = Arc::new(MemoryConnector::new("fast"));
    fixture
        .register(resource("resource-slow").with_priority(1), Arc::clone(&slow))
        .await;
    fixture
        .register(resource("resource-fast").with_priority(2), Arc::clone(&fast))
        .await;
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();

    let statuses = fixture
        .service
        .provision(
            &user,
            &creates_on(&["resource-slow", "resource-fast"]),
            &OutboundOptions::new(),
        )
        .await;

    let slow_status = statuses
        .iter()
        .find(|s| s.resource == Fixture::key("resource-slow"))
        .unwrap();
    assert_eq!(slow_status.status, ExecStatus::Failure);
    assert_eq!(slow_status.message.as_deref(), Some("Request timeout"));

    let fast_status = statuses
        .iter()
        .find(|s| s.resource == Fixture::key("resource-fast"))
        .unwrap();
    assert!(fast_status.is_success());
    assert_eq!(fast.creates(), 1);
    assert_eq!(slow.object_count(), 0);
}

#[tokio::test]
async fn test_existing_remote_values_not_duplicated() {
    let fixture = Fixture::new();
    let ldap = Arc::new(MemoryConnector::new("ldap"));
    fixture.register(resource(LDAP), Arc::clone(&ldap)).await;
    let user = fixture
        .store
        .save(
            Entity::user("rossini")
                .with_unique("email", "a@x.com")
                .with_resource(LDAP),
        )
        .await
        .unwrap();
    ldap.seed("rossini", remote_user("rossini", "a@x.com"));

    let statuses = fixture
        .service
        .provision(&user, &creates_on(&[LDAP]), &OutboundOptions::new())
        .await;

    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].is_success());
    assert_eq!(statuses[0].operation, ResourceOperation::Update);
    assert_eq!(ldap.creates(), 0);
    assert_eq!(ldap.updates(), 0);
    assert_eq!(
        ldap.object("rossini").unwrap().attributes.get_strings("mail"),
        vec!["a@x.com"]
    );
}

#[tokio::test]
async fn test_async_mode_returns_handles() {
    let mut config = ProvisioningConfig::default();
    config.async_propagation = true;
    let fixture = Fixture::with_config(config);
    let ordered = Arc::new(MemoryConnector::new("ordered"));
    let loose = Arc::new(MemoryConnector::new("loose"));
    fixture
        .register(resource("resource-ordered").with_priority(1), Arc::clone(&ordered))
        .await;
    fixture
        .register(resource("resource-loose"), Arc::clone(&loose))
        .await;
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();

    let plan = fixture
        .service
        .build_propagation_tasks(
            &user,
            &creates_on(&["resource-ordered", "resource-loose"]),
            None,
            &OutboundOptions::new(),
            &[],
        )
        .await;
    assert_eq!(plan.tasks.len(), 2);

    let outcome = fixture.service.execute(plan).await;
    assert_eq!(outcome.statuses.len(), 1);
    assert_eq!(outcome.pending.len(), 1);
    assert_eq!(ordered.creates(), 1);

    let statuses = outcome.wait_all().await;
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.is_success()));
    assert_eq!(loose.creates(), 1);
}

#[tokio::test]
async fn test_excluded_resource_gets_no_task() {
    let fixture = Fixture::new();
    fixture
        .register(resource(LDAP), Arc::new(MemoryConnector::new("ldap")))
        .await;
    fixture
        .register(resource("resource-db"), Arc::new(MemoryConnector::new("db")))
        .await;
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();

    let plan = fixture
        .service
        .build_propagation_tasks(
            &user,
            &creates_on(&[LDAP, "resource-db"]),
            None,
            &OutboundOptions::new(),
            &[Fixture::key(LDAP)],
        )
        .await;

    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].resource, Fixture::key("resource-db"));
    assert!(plan.failures.is_empty());
}

#[tokio::test]
async fn test_every_requested_resource_gets_a_status() {
    let fixture = Fixture::new();
    let ok = Arc::new(MemoryConnector::new("ok"));
    let keyless = Arc::new(MemoryConnector::new("keyless"));
    fixture.register(resource("resource-ok"), Arc::clone(&ok)).await;
    fixture
        .register(
            ExternalResource::new("resource-keyless", full_capabilities()).with_provision(
                Provision::new(
                    "USER",
                    ObjectClass::account(),
                    Mapping::new(vec![Item::new("email", "mail")]),
                ),
            ),
            Arc::clone(&keyless),
        )
        .await;
    let user = fixture.store.save(Entity::user("rossini")).await.unwrap();

    let statuses = fixture
        .service
        .provision(
            &user,
            &creates_on(&["resource-ok", "resource-keyless", "resource-unregistered"]),
            &OutboundOptions::new(),
        )
        .await;

    assert_eq!(statuses.len(), 3);
    let status_of = |name: &str| {
        statuses
            .iter()
            .find(|s| s.resource == Fixture::key(name))
            .unwrap()
    };
    assert!(status_of("resource-ok").is_success());

    let keyless_status = status_of("resource-keyless");
    assert_eq!(keyless_status.status, ExecStatus::Failure);
    assert_eq!(keyless_status.operation, ResourceOperation::Create);
    assert!(keyless_status
        .message
        .as_deref()
        .unwrap()
        .contains("no connector key mapping"));

    let unregistered = status_of("resource-unregistered");
    assert_eq!(unregistered.status, ExecStatus::Failure);
    assert_eq!(
        unregistered.message.as_deref(),
        Some("Resource not found: resource-unregistered")
    );
    assert_eq!(unregistered.entity_key, user.key);

    assert_eq!(ok.creates(), 1);
    assert_eq!(keyless.writes(), 0);
}

#[tokio::test]
async fn test_same_attribute_values_are_a_union_in_any_item_order() {
    let fixture = Fixture::new();
    let user = Entity::user("rossini")
        .with_unique("email", "rossini@example.com")
        .with_unique("firstname", "Gioacchino");

    let mut merged = Vec::new();
    for (name, items) in [
        ("resource-forward", vec![Item::new("email", "mail"), Item::new("firstname", "mail")]),
        ("resource-reverse", vec![Item::new("firstname", "mail"), Item::new("email", "mail")]),
    ] {
        let mut mapping = vec![Item::new("username", "uid").connector_key()];
        mapping.extend(items);
        fixture
            .register(
                ExternalResource::new(name, full_capabilities()).with_provision(Provision::new(
                    "USER",
                    ObjectClass::account(),
                    Mapping::new(mapping),
                )),
                Arc::new(MemoryConnector::new(name)),
            )
            .await;
        let prepared = fixture
            .service
            .prepare_outbound(&user, &Fixture::key(name), &OutboundOptions::new())
            .await
            .unwrap();
        merged.push(
            prepared
                .attributes
                .get_strings("mail")
                .into_iter()
                .collect::<BTreeSet<_>>(),
        );
    }

    let expected: BTreeSet<String> = ["rossini@example.com", "Gioacchino"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(merged[0], expected);
    assert_eq!(merged[1], expected);
}

#[tokio::test]
async fn test_resolve_membership_expression() {
    let fixture = Fixture::new();

    let reference = fixture
        .service
        .resolve("memberships[admins].email", AnyTypeKind::User)
        .unwrap();

    assert_eq!(
        reference.qualifier,
        Some(Qualifier::Membership("admins".to_string()))
    );
    assert_eq!(reference.kind, AnyTypeKind::User);
}
