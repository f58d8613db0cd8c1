//! Integration tests for the shared configuration manager
use config_abstractions::{ChangeBus, ConfigStore, KeyValueBackend, PasswordHasher};
use config_impl::{
    Argon2PasswordHasher, BootstrapOutcome, HierarchicalStore, LocalChangeBus, MemoryBackend,
    SharedConfigManager, StoreHealth,
};
use futures::StreamExt;
use infrastructure_common::{ConfigError, HealthCheckable};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 可预测的哈希器，便于断言迁移结果
#[derive(Debug, Default)]
struct PrefixHasher {
    calls: AtomicUsize,
}

impl PasswordHasher for PrefixHasher {
    fn hash(&self, plaintext: &str) -> Result<String, ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("hashed:{}", plaintext))
    }

    fn name(&self) -> &str {
        "prefix"
    }
}

/// 共享同一存储和总线的测试环境
struct Cluster {
    backend: Arc<MemoryBackend>,
    bus: Arc<LocalChangeBus>,
    hasher: Arc<PrefixHasher>,
    baseline: tempfile::NamedTempFile,
}

impl Cluster {
    fn new(baseline: Value) -> Self {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(baseline.to_string().as_bytes()).unwrap();
        Self {
            backend: Arc::new(MemoryBackend::new()),
            bus: Arc::new(LocalChangeBus::new()),
            hasher: Arc::new(PrefixHasher::default()),
            baseline: file,
        }
    }

    fn store(&self) -> Arc<HierarchicalStore> {
        Arc::new(HierarchicalStore::new(self.backend.clone(), "config"))
    }

    fn manager(&self) -> SharedConfigManager {
        SharedConfigManager::new(self.store(), self.bus.clone(), self.hasher.clone())
            .with_baseline_path(self.baseline.path())
    }
}

fn scenario_baseline() -> Value {
    json!({
        "_version": "1",
        "workspaces": {"w1": {"users": {"alice": {"_password": "plain"}}}}
    })
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn test_bootstrap_scenario() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();

    let outcome = manager.validate(cluster.baseline.path()).await.unwrap();
    assert_eq!(
        outcome,
        BootstrapOutcome::Initialized {
            version: json!("1"),
            sections: 1,
            migrated_passwords: 1,
        }
    );

    assert_eq!(
        cluster.backend.get("config:_version").await.unwrap().as_deref(),
        Some("\"1\"")
    );
    assert_eq!(
        manager
            .get_fresh("workspaces:w1:users:alice:_password")
            .await
            .unwrap(),
        Some(json!("hashed:plain"))
    );
}

#[tokio::test]
async fn test_bootstrap_with_argon2() {
    let cluster = Cluster::new(scenario_baseline());
    let hasher = Arc::new(Argon2PasswordHasher::new());
    let manager = SharedConfigManager::new(cluster.store(), cluster.bus.clone(), hasher.clone());

    manager.validate(cluster.baseline.path()).await.unwrap();
    let stored = manager
        .get_fresh("workspaces:w1:users:alice:_password")
        .await
        .unwrap()
        .unwrap();
    let hash = stored.as_str().unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(hasher.verify(hash, "plain").unwrap());
}

#[tokio::test]
async fn test_validate_is_idempotent() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();

    manager.validate(cluster.baseline.path()).await.unwrap();
    let records = cluster.backend.len();
    let password = manager
        .get_fresh("workspaces:w1:users:alice:_password")
        .await
        .unwrap();

    let outcome = manager.validate(cluster.baseline.path()).await.unwrap();
    assert_eq!(
        outcome,
        BootstrapOutcome::AlreadyInitialized { version: json!("1") }
    );
    assert_eq!(cluster.backend.len(), records);
    assert_eq!(
        manager
            .get_fresh("workspaces:w1:users:alice:_password")
            .await
            .unwrap(),
        password
    );
    assert_eq!(cluster.hasher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_migration_across_workspaces() {
    let cluster = Cluster::new(json!({
        "_version": 3,
        "settings": {"theme": "light"},
        "workspaces": {
            "acme": {"users": {
                "bob": {"_password": "b0b", "role": "admin"},
                "carol": {"role": "viewer"}
            }},
            "globex": {"users": {"dave": {"_password": "d4ve"}}},
            "empty": {"users": {}}
        }
    }));
    let manager = cluster.manager();

    let outcome = manager.validate(cluster.baseline.path()).await.unwrap();
    assert_eq!(
        outcome,
        BootstrapOutcome::Initialized {
            version: json!(3),
            sections: 2,
            migrated_passwords: 2,
        }
    );

    let workspaces = manager.get_fresh("workspaces").await.unwrap().unwrap();
    assert_eq!(workspaces["acme"]["users"]["bob"]["_password"], json!("hashed:b0b"));
    assert_eq!(workspaces["acme"]["users"]["bob"]["role"], json!("admin"));
    assert_eq!(workspaces["acme"]["users"]["carol"], json!({"role": "viewer"}));
    assert_eq!(workspaces["globex"]["users"]["dave"]["_password"], json!("hashed:d4ve"));
    assert_eq!(
        manager.get_fresh("settings:theme").await.unwrap(),
        Some(json!("light"))
    );
}

#[tokio::test]
async fn test_invalid_baseline_leaves_store_untouched() {
    let cluster = Cluster::new(json!({"workspaces": {}}));
    let manager = cluster.manager();

    let err = manager.validate(cluster.baseline.path()).await.unwrap_err();
    assert!(matches!(err, ConfigError::BaselineInvalid { .. }));
    assert!(cluster.backend.is_empty());
}

#[tokio::test]
async fn test_init_mirrors_store() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();

    manager.init().await.unwrap();
    assert!(manager.is_subscribed());
    assert_eq!(manager.get("_version"), Some(json!("1")));
    assert_eq!(
        manager.get("workspaces:w1:users:alice:_password"),
        Some(json!("hashed:plain"))
    );
    assert_eq!(manager.mirror().generation(), 1);

    manager.shutdown();
    assert!(!manager.is_subscribed());
}

#[tokio::test]
async fn test_init_fails_when_store_is_down() {
    let cluster = Cluster::new(scenario_baseline());
    cluster.backend.set_available(false);
    let manager = cluster.manager();

    let err = manager.init().await.unwrap_err();
    assert!(err.is_connectivity());
    assert!(!manager.is_subscribed());
}

#[tokio::test]
async fn test_full_resync_matches_store() -> anyhow::Result<()> {
    let cluster = Cluster::new(scenario_baseline());
    let writer = cluster.manager();
    for i in 0..20 {
        writer
            .set(&format!("section{}", i), &json!({"index": i, "tags": ["a", "b"]}), None)
            .await?;
    }

    let reader = cluster.manager();
    reader.populate(None).await?;

    let store = cluster.store();
    let keys = store.members_of(&store.keyset_key()).await?;
    assert_eq!(keys.len(), 20);
    for key in keys {
        assert_eq!(reader.get(&key), store.get(&key).await?);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_round_trip_normalizes_expired_children() -> anyhow::Result<()> {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();
    manager
        .set("session", &json!({"token": "abc", "user": "alice"}), None)
        .await?;
    manager.set("session:token", &json!("abc"), Some(5)).await?;

    tokio::time::advance(Duration::from_secs(6)).await;
    manager.populate(Some("session")).await?;

    assert_eq!(
        manager.get("session"),
        Some(json!({"token": null, "user": "alice"}))
    );
    assert_eq!(
        manager.get_fresh("session").await?,
        Some(json!({"token": null, "user": "alice"}))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_ttl_applied_only_when_requested() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();

    manager.set("a:b", &json!(5), Some(10)).await.unwrap();
    assert_eq!(manager.ttl("a:b").await.unwrap(), Some(10));

    manager.set("a:c", &json!(5), None).await.unwrap();
    assert_eq!(manager.ttl("a:c").await.unwrap(), None);
}

#[tokio::test]
async fn test_change_propagates_between_managers() {
    let cluster = Cluster::new(scenario_baseline());
    let first = cluster.manager();
    let second = cluster.manager();
    first.init().await.unwrap();
    second.init().await.unwrap();

    first
        .set("workspaces:w1:users:alice:theme", &json!("dark"), None)
        .await
        .unwrap();

    let path = "workspaces:w1:users:alice:theme";
    assert!(eventually(|| second.get(path) == Some(json!("dark"))).await);
    assert!(eventually(|| first.get(path) == Some(json!("dark"))).await);
    assert_eq!(
        second.get("workspaces:w1:users:alice:_password"),
        Some(json!("hashed:plain"))
    );
}

#[tokio::test]
async fn test_failed_write_publishes_nothing() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();
    let mut events = cluster.bus.subscribe().await.unwrap();

    cluster.backend.set_available(false);
    let err = manager.set("a", &json!(1), None).await.unwrap_err();
    assert!(matches!(err, ConfigError::WriteFailed { .. }));
    assert!(err.is_connectivity());

    cluster.backend.set_available(true);
    manager.set("b", &json!(2), None).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.key, "b");
    assert_eq!(event.origin, manager.process_id());
}

#[tokio::test]
async fn test_clear_publishes_nothing() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();
    manager.set("a", &json!(1), None).await.unwrap();
    let mut events = cluster.bus.subscribe().await.unwrap();

    manager.clear("a").await.unwrap();
    assert_eq!(manager.get_fresh("a").await.unwrap(), None);
    manager.set("marker", &json!(true), None).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.key, "marker");
}

#[tokio::test]
async fn test_invalid_key_is_rejected() {
    let cluster = Cluster::new(scenario_baseline());
    let manager = cluster.manager();

    for key in ["", "a::b", "a:keys"] {
        assert!(matches!(
            manager.set(key, &json!(1), None).await,
            Err(ConfigError::InvalidKey { .. })
        ));
    }
    assert!(cluster.backend.is_empty());
}

#[tokio::test]
async fn test_store_health_follows_connectivity() {
    let cluster = Cluster::new(scenario_baseline());
    let health = Arc::new(StoreHealth::default());
    let store = HierarchicalStore::new(cluster.backend.clone(), "config")
        .with_lifecycle(health.clone());

    assert!(!health.check_health().await.is_healthy());
    store.set("a", &json!(1), None).await.unwrap();
    assert!(health.check_health().await.is_healthy());

    cluster.backend.set_available(false);
    assert!(store.get("a").await.is_err());
    assert!(health.check_health().await.is_unhealthy());
    assert!(!store.is_connected());
}
