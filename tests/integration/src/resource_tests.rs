//! Resource caches refreshed through a shared manager.

use std::collections::HashMap;
use std::sync::Arc;

use meshsync::prelude::*;
use meshsync::resources::{
    ArgumentType, ClientKind, ClientRow, ClientType, ConfigGroupKind, ConfigGroupRow, Location,
    RateLimitKind, RateLimitRow,
};
use meshsync_integration_tests::{seed_grid, TableStore};

fn rule(name: &str) -> RateLimitRow {
    RateLimitRow::new(
        name,
        "",
        r#"{"priority":1,"amounts":[{"maxAmount":10,"validDurationSecs":1}],
            "labels":{"env":{"type":"EXACT","value":"prod"}}}"#,
    )
}

fn client(host: &str, client_type: &str) -> ClientRow {
    ClientRow {
        host: host.to_string(),
        client_type: client_type.to_string(),
        version: "1.18.0".to_string(),
        location: Location::default(),
        stats: vec![],
        create_time: Timestamp::from_secs(1),
    }
}

fn group(name: &str) -> ConfigGroupRow {
    ConfigGroupRow {
        name: name.to_string(),
        create_by: "ops".to_string(),
        ..Default::default()
    }
}

struct Plane {
    manager: CacheManager,
    rate_limits: RateLimitCache,
    clients: ClientCache,
    groups: ConfigGroupCache,
    rule_store: Arc<TableStore<RateLimitKind>>,
    client_store: Arc<TableStore<ClientKind>>,
    group_store: Arc<TableStore<ConfigGroupKind>>,
}

fn plane() -> Plane {
    let rule_store: Arc<TableStore<RateLimitKind>> = Arc::new(TableStore::default());
    let client_store: Arc<TableStore<ClientKind>> = Arc::new(TableStore::default());
    let group_store: Arc<TableStore<ConfigGroupKind>> = Arc::new(TableStore::default());

    let rate_limits = RateLimitCache::initialize(CacheConfig::new(), rule_store.clone()).unwrap();
    let clients = ClientCache::initialize(CacheConfig::new(), client_store.clone()).unwrap();
    let groups = ConfigGroupCache::initialize(
        CacheConfig::new().with_index_mode(IndexMode::CopyOnWrite),
        group_store.clone(),
    )
    .unwrap();

    let manager = CacheManager::new();
    manager.register(rate_limits.cache().clone()).unwrap();
    manager.register(clients.cache().clone()).unwrap();
    manager.register(groups.cache().clone()).unwrap();

    Plane {
        manager,
        rate_limits,
        clients,
        groups,
        rule_store,
        client_store,
        group_store,
    }
}

#[tokio::test]
async fn first_load_of_every_resource() {
    let plane = plane();
    seed_grid(&plane.rule_store, 5, 3, |p, r| rule(&format!("rule-{p}-{r}")));
    plane.client_store.put("c-1", "10.0.0.1", client("10.0.0.1", "SDK"));
    plane.group_store.put("g-1", "default", group("app"));

    assert_eq!(plane.manager.pending().len(), 3);
    let results = plane.manager.refresh_all().await;
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(plane.manager.is_ready());

    assert_eq!(plane.rate_limits.rule_count(), 15);
    assert_eq!(plane.rate_limits.revision_count(), 5);
    assert_eq!(plane.rate_limits.rules_for_service("parent-1").len(), 3);
    assert_eq!(plane.rate_limits.last_revision("parent-1"), "last-revision-1");

    let found = plane.rate_limits.find_rule("parent-4", "rule-4-2").unwrap();
    let arguments = &found.payload().rule.arguments;
    assert_eq!(arguments.len(), 1);
    assert_eq!(arguments[0].argument_type, ArgumentType::Custom);
    assert_eq!(arguments[0].key, "env");

    assert_eq!(
        plane.clients.get_client("c-1").unwrap().payload().client_type,
        ClientType::Sdk
    );
    assert_eq!(plane.groups.get_group("default", "app").unwrap().payload().owner, "ops");
}

#[tokio::test]
async fn incremental_changes_reach_queries() {
    let plane = plane();
    seed_grid(&plane.rule_store, 2, 2, |p, r| rule(&format!("rule-{p}-{r}")));
    for i in 0..4 {
        plane
            .client_store
            .put(&format!("c-{i}"), "10.0.0.9", client("10.0.0.9", "AGENT"));
    }
    plane.manager.refresh_all().await;

    plane.rule_store.tick(1);
    plane.rule_store.delete("id-0-0");
    plane.rule_store.set_revision("parent-0", "last-revision-0b");
    plane.client_store.tick(1);
    plane.client_store.delete("c-2");
    plane.group_store.put("g-9", "staging", group("late-group"));
    plane.manager.refresh_all().await;

    assert!(plane.rate_limits.find_rule("parent-0", "rule-0-0").is_none());
    assert_eq!(plane.rate_limits.last_revision("parent-0"), "last-revision-0b");

    let filters: HashMap<String, String> =
        [("host".to_string(), "10.0.0.9".to_string())].into_iter().collect();
    let page = plane.clients.clients_by_filter(&filters, 0, 10).unwrap();
    let ids: Vec<_> = page.items.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["c-0", "c-1", "c-3"]);

    let groups = plane.groups.query_groups("staging", "late*", 0, 10).unwrap();
    assert_eq!(groups.total, 1);
}

#[tokio::test]
async fn broken_rule_json_is_isolated() {
    let plane = plane();
    plane.rule_store.put("ok", "svc", rule("ok"));
    plane
        .rule_store
        .put("broken", "svc", RateLimitRow::new("broken", "", r#"{"amounts": 5}"#));
    plane.rule_store.set_revision("svc", "r1");

    let results = plane.manager.refresh_all().await;
    let (_, rate_limit_result) = results
        .iter()
        .find(|(resource, _)| resource.as_str() == ResourceType::RATE_LIMIT)
        .unwrap();
    assert!(rate_limit_result.is_ok());

    assert_eq!(plane.rate_limits.rule_count(), 1);
    assert_eq!(plane.rate_limits.last_revision("svc"), "r1");
    assert_eq!(plane.rate_limits.cache().stats().malformed_records(), 1);
}

#[tokio::test]
async fn one_store_down_does_not_stall_others() {
    let plane = plane();
    plane.rule_store.put("ok", "svc", rule("ok"));
    plane.client_store.go_offline();

    let results = plane.manager.refresh_all().await;
    let failed: Vec<_> = results
        .iter()
        .filter(|(_, r)| r.is_err())
        .map(|(resource, _)| resource.as_str().to_string())
        .collect();
    assert_eq!(failed, vec![ResourceType::CLIENT.to_string()]);
    assert_eq!(plane.manager.pending(), vec![ClientKind::resource_type()]);
    assert_eq!(plane.rate_limits.rule_count(), 1);

    plane.client_store.restore();
    plane.manager.refresh_all().await;
    assert!(plane.manager.is_ready());
}

#[tokio::test]
async fn invalid_queries_surface_as_errors() {
    let plane = plane();
    plane.manager.refresh_all().await;

    let filters: HashMap<String, String> =
        [("location".to_string(), "east".to_string())].into_iter().collect();
    let err = plane.clients.clients_by_filter(&filters, 0, 10).unwrap_err();
    assert!(matches!(err, SyncError::InvalidQuery { .. }));
    assert!(!err.is_retryable());

    assert!(plane.groups.query_groups("default", "", 0, 1000).is_err());
}
