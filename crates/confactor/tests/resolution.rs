//! End-to-end resolution scenarios against the in-memory registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use confactor::builder::{BuildOptions, Config, build};
use confactor::endpoint::Endpoint;
use confactor::registry::{MemoryRegistry, ServiceInstance};
use confactor::spec::{SpecTree, service, value};
use confactor::value::Value;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn sample_spec() -> SpecTree {
    SpecTree::new()
        .with("value", value().optional())
        .with("hardcoded", "hello world")
        .with("value_with_default", value().default(123))
        .with("nested", SpecTree::new().with("value", value().optional()))
        .with(
            "db",
            SpecTree::new().with(
                "credentials",
                SpecTree::new().with("username", value().default("rootato")),
            ),
        )
}

/// Wait until the value at `path` matches `expected`, waking on change
/// events rather than polling blindly.
async fn await_value(config: &Config, path: &str, expected: Value) {
    let mut rx = config.subscribe();
    for _ in 0..50 {
        if config.get(path).as_ref() == Some(&expected) {
            return;
        }
        let _ = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    }
    panic!(
        "value at '{}' never became {:?}, currently {:?}",
        path,
        expected,
        config.get(path)
    );
}

async fn assert_ready(config: &Config) {
    tokio::time::timeout(Duration::from_secs(2), config.ready())
        .await
        .expect("completion gate should have opened");
}

async fn assert_pending(config: &Config) {
    assert!(
        tokio::time::timeout(Duration::from_millis(100), config.ready())
            .await
            .is_err(),
        "completion gate should still be pending, missing: {:?}",
        config.missing()
    );
}

#[tokio::test]
async fn test_hardcoded_value_passes_through() {
    let config = build(&sample_spec(), BuildOptions::new().env(HashMap::new()))
        .await
        .unwrap();
    assert_ready(&config).await;

    assert_eq!(config.get("hardcoded"), Some(Value::from("hello world")));
}

#[tokio::test]
async fn test_env_var_sets_value() {
    let config = build(
        &sample_spec(),
        BuildOptions::new().env(env(&[("VALUE", "tomato")])),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    assert_eq!(config.get("value"), Some(Value::from("tomato")));
}

#[tokio::test]
async fn test_nested_env_var_sets_value() {
    let config = build(
        &sample_spec(),
        BuildOptions::new().env(env(&[("NESTED_VALUE", "potato")])),
    )
    .await
    .unwrap();

    assert_eq!(config.get("nested.value"), Some(Value::from("potato")));
}

#[tokio::test]
async fn test_defaults_apply_without_sources() {
    let config = build(&sample_spec(), BuildOptions::new().env(HashMap::new()))
        .await
        .unwrap();
    assert_ready(&config).await;

    assert_eq!(config.get("value"), None);
    assert_eq!(config.get("value_with_default"), Some(Value::Int(123)));
    assert_eq!(
        config.get("db.credentials.username"),
        Some(Value::from("rootato"))
    );
}

#[tokio::test]
async fn test_env_coerces_by_default_type() {
    let config = build(
        &sample_spec(),
        BuildOptions::new().env(env(&[
            ("VALUE_WITH_DEFAULT", "999"),
            ("DB_CREDENTIALS_USERNAME", "rootato"),
        ])),
    )
    .await
    .unwrap();

    assert_eq!(config.get("value_with_default"), Some(Value::Int(999)));
    assert_eq!(
        config.get("db.credentials.username"),
        Some(Value::from("rootato"))
    );
}

#[tokio::test]
async fn test_env_prefix_applies() {
    let config = build(
        &sample_spec(),
        BuildOptions::new()
            .env_prefix("myapp")
            .env(env(&[("MYAPP_DB_CREDENTIALS_USERNAME", "sausages")])),
    )
    .await
    .unwrap();

    assert_eq!(
        config.get("db.credentials.username"),
        Some(Value::from("sausages"))
    );
}

#[tokio::test]
async fn test_service_from_env_vars() {
    let spec = SpecTree::new().with("db", service("12factorial-test"));
    let config = build(
        &spec,
        BuildOptions::new().env(env(&[
            ("DB_ADDRESS", "10.128.64.32"),
            ("DB_PORT", "5432"),
        ])),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    let db = config.endpoint("db").unwrap();
    assert_eq!(db.address(), Some("10.128.64.32".to_string()));
    assert_eq!(db.port(), Some(5432));
    assert_eq!(db.authority(), Some("10.128.64.32:5432".to_string()));
    assert_eq!(db.build_uri("foo"), Some("10.128.64.32:5432/foo".to_string()));
}

#[tokio::test]
async fn test_env_wins_over_reachable_registry() {
    let registry = MemoryRegistry::new();
    registry.set_key("myapp/value", "from-registry");
    registry.register_service("postgres", ServiceInstance::new("10.9.9.9", 1));

    let spec = SpecTree::new()
        .with("value", value())
        .with("db", service("postgres"));
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry), "myapp")
            .env(env(&[
                ("VALUE", "from-env"),
                ("DB_ADDRESS", "10.128.8.21"),
                ("DB_PORT", "8401"),
            ])),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    assert_eq!(config.get("value"), Some(Value::from("from-env")));
    assert_eq!(
        config.endpoint("db").unwrap().authority(),
        Some("10.128.8.21:8401".to_string())
    );
    // Env-resolved leaves never open registry watches.
    assert_eq!(config.watch_count(), 0);
}

#[tokio::test]
async fn test_registry_value_applied_then_reverts_on_failure() {
    let registry = MemoryRegistry::new();
    registry.set_key("myapp/value", "saussignac");

    let spec = SpecTree::new().with("value", value().default("fluster"));
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry.clone()), "myapp")
            .env(HashMap::new()),
    )
    .await
    .unwrap();

    assert_ready(&config).await;
    await_value(&config, "value", Value::from("saussignac")).await;

    registry.fail_key("myapp/value");
    await_value(&config, "value", Value::from("fluster")).await;
}

#[tokio::test]
async fn test_missing_registry_key_falls_back_to_default() {
    let registry = MemoryRegistry::new();

    let spec = SpecTree::new().with("value", value().default("fluster"));
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry), "myotherapp")
            .env(HashMap::new()),
    )
    .await
    .unwrap();

    assert_ready(&config).await;
    assert_eq!(config.get("value"), Some(Value::from("fluster")));
}

#[tokio::test]
async fn test_unreachable_registry_degrades_to_env_and_defaults() {
    let spec = SpecTree::new()
        .with("myvalue", value())
        .with("fallback", value().default("plan-b"))
        .with("myservice", service("foo"));
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(MemoryRegistry::unreachable()), "myservice")
            .env(env(&[
                ("MYVALUE", "frustrum"),
                ("MYSERVICE_ADDRESS", "10.128.8.21"),
                ("MYSERVICE_PORT", "8401"),
            ])),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    assert_eq!(config.get("myvalue"), Some(Value::from("frustrum")));
    assert_eq!(config.get("fallback"), Some(Value::from("plan-b")));
    let myservice = config.endpoint("myservice").unwrap();
    assert_eq!(myservice.address(), Some("10.128.8.21".to_string()));
    assert_eq!(myservice.port(), Some(8401));
    assert_eq!(config.watch_count(), 0);
}

#[tokio::test]
async fn test_service_resolves_from_registry() {
    let registry = MemoryRegistry::new();
    registry.register_service(
        "12factorial-test",
        ServiceInstance::new("10.128.64.32", 1234),
    );

    let spec = SpecTree::new().with("myservice", service("12factorial-test"));
    let config = build(
        &spec,
        BuildOptions::new()
            .registry_without_prefix(Arc::new(registry))
            .env(HashMap::new()),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    let myservice = config.endpoint("myservice").unwrap();
    assert_eq!(myservice.authority(), Some("10.128.64.32:1234".to_string()));
    assert_eq!(
        myservice.build_uri("foo"),
        Some("10.128.64.32:1234/foo".to_string())
    );
}

#[tokio::test]
async fn test_service_extension_from_registry_and_env() {
    let registry = MemoryRegistry::new();
    registry.register_service(
        "12factorial-extension-test",
        ServiceInstance::new("10.128.31.32", 9876),
    );
    registry.set_key("12factorial/myservice/username", "copper king");

    let spec = SpecTree::new().with(
        "myservice",
        service("12factorial-extension-test").extend(
            SpecTree::new()
                .with("password", value().sensitive())
                .with("username", value()),
        ),
    );
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry), "12factorial")
            .env(env(&[("MYSERVICE_PASSWORD", "babylonian")])),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    assert_eq!(
        config.endpoint("myservice").unwrap().authority(),
        Some("10.128.31.32:9876".to_string())
    );
    assert_eq!(
        config.get("myservice.password"),
        Some(Value::from("babylonian"))
    );
    await_value(&config, "myservice.username", Value::from("copper king")).await;
}

#[tokio::test]
async fn test_service_update_rebinds_existing_cell() {
    let registry = MemoryRegistry::new();
    registry.set_service_instances("postgres", vec![ServiceInstance::new("10.0.0.1", 5432)]);

    let spec = SpecTree::new().with("db", service("postgres"));
    let config = build(
        &spec,
        BuildOptions::new()
            .registry_without_prefix(Arc::new(registry.clone()))
            .env(HashMap::new()),
    )
    .await
    .unwrap();
    assert_ready(&config).await;

    // Hold the cell before the registry moves the service.
    let held = config.endpoint("db").unwrap();
    assert_eq!(held.authority(), Some("10.0.0.1:5432".to_string()));

    registry.set_service_instances("postgres", vec![ServiceInstance::new("10.0.0.2", 5433)]);
    await_value(
        &config,
        "db",
        Value::Endpoint(Endpoint::new("10.0.0.2", 5433)),
    )
    .await;

    // The previously held cell observes the update.
    assert_eq!(held.authority(), Some("10.0.0.2:5433".to_string()));
}

#[tokio::test]
async fn test_all_optional_spec_is_ready_immediately() {
    let registry = MemoryRegistry::new();
    let spec = SpecTree::new()
        .with("value", value().optional())
        .with("db", service("postgres").optional());
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry), "myapp")
            .env(HashMap::new()),
    )
    .await
    .unwrap();

    assert_ready(&config).await;
    assert!(config.missing().is_empty());
}

#[tokio::test]
async fn test_gate_waits_for_registry_leaf() {
    let registry = MemoryRegistry::new();

    let spec = SpecTree::new().with("value", value());
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry.clone()), "myapp")
            .env(HashMap::new()),
    )
    .await
    .unwrap();

    assert_pending(&config).await;
    assert_eq!(config.missing(), vec!["value".to_string()]);

    registry.set_key("myapp/value", "saussignac");
    assert_ready(&config).await;
    assert_eq!(config.get("value"), Some(Value::from("saussignac")));
}

#[tokio::test]
async fn test_gate_pending_when_required_leaf_unresolvable() {
    // No env var, no registry, no default: an accepted caller error.
    // The gate never opens; an external timeout is the only bound.
    let spec = SpecTree::new().with("db", service("nowhere"));
    let config = build(&spec, BuildOptions::new().env(HashMap::new()))
        .await
        .unwrap();

    assert_pending(&config).await;
    assert!(!config.endpoint("db").unwrap().is_set());
    assert_eq!(config.missing(), vec!["db".to_string()]);
}

#[tokio::test]
async fn test_close_releases_watches() {
    let registry = MemoryRegistry::new();
    registry.set_key("myapp/value", "before");

    let spec = SpecTree::new().with("value", value());
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry.clone()), "myapp")
            .env(HashMap::new()),
    )
    .await
    .unwrap();
    assert_ready(&config).await;
    assert_eq!(config.watch_count(), 1);

    config.close();
    assert_eq!(config.watch_count(), 0);

    // Updates after close no longer reach the tree.
    registry.set_key("myapp/value", "after");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(config.get("value"), Some(Value::from("before")));
}

#[tokio::test]
async fn test_change_events_carry_previous_value() {
    let registry = MemoryRegistry::new();

    let spec = SpecTree::new().with("value", value());
    let config = build(
        &spec,
        BuildOptions::new()
            .registry(Arc::new(registry.clone()), "myapp")
            .env(HashMap::new()),
    )
    .await
    .unwrap();

    let mut rx = config.subscribe();
    registry.set_key("myapp/value", "first");

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event should arrive")
        .unwrap();
    assert_eq!(event.name, "value");
    assert_eq!(event.value, Some(Value::from("first")));
    assert_eq!(event.previous, None);

    registry.set_key("myapp/value", "second");
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event should arrive")
        .unwrap();
    assert_eq!(event.value, Some(Value::from("second")));
    assert_eq!(event.previous, Some(Value::from("first")));
}
