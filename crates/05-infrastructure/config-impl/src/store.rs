//! 层级配置存储
//!
//! 在扁平键值后端上维护层级路径，命名空间为 `config` 时布局如下：
//!
//! - 路径 `P` 上的叶子值以 JSON 文本存放在 `config:P`
//! - 路径 `P` 上的对象被拆解，子项名登记在集合 `config:P:keys`，子项递归存放
//! - 顶层路径名登记在 `config:keys`，完整同步时据此枚举
//!
//! 因为 `keys` 用作集合后缀，路径段不能是 `keys`。

use crate::health::ConnectionStateTracker;
use crate::path_codec;
use async_trait::async_trait;
use config_abstractions::{ConfigStore, KeyValueBackend, StoreLifecycle};
use futures::future::BoxFuture;
use futures::FutureExt;
use infrastructure_common::ConfigError;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// 集合键后缀，同时是保留路径段
pub const KEYSET_SEGMENT: &str = "keys";

/// 层级配置存储
pub struct HierarchicalStore {
    backend: Arc<dyn KeyValueBackend>,
    namespace: String,
    tracker: ConnectionStateTracker,
}

impl std::fmt::Debug for HierarchicalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalStore")
            .field("backend", &self.backend.name())
            .field("namespace", &self.namespace)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl HierarchicalStore {
    /// 创建新的层级存储
    pub fn new(backend: Arc<dyn KeyValueBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            tracker: ConnectionStateTracker::new(None),
        }
    }

    /// 设置连接生命周期回调
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn StoreLifecycle>) -> Self {
        self.tracker = ConnectionStateTracker::new(Some(lifecycle));
        self
    }

    /// 存储是否处于已连接状态
    pub fn is_connected(&self) -> bool {
        self.tracker.is_connected()
    }

    fn record_key(&self, path: &str) -> String {
        format!("{}:{}", self.namespace, path)
    }

    fn index_key(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}:{}", self.namespace, KEYSET_SEGMENT)
        } else {
            format!("{}:{}:{}", self.namespace, path, KEYSET_SEGMENT)
        }
    }

    fn validate_path<'a>(&self, path: &'a str) -> Result<Vec<&'a str>, ConfigError> {
        match path_codec::split(path) {
            Some(segments) if !segments.contains(&KEYSET_SEGMENT) => Ok(segments),
            _ => Err(ConfigError::InvalidKey {
                key: path.to_string(),
            }),
        }
    }

    async fn raw_get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let result = self.backend.get(key).await;
        self.tracker.observe(&result);
        result
    }

    async fn raw_set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let result = self.backend.set(key, value).await;
        self.tracker.observe(&result);
        result
    }

    async fn raw_del(&self, keys: &[String]) -> Result<(), ConfigError> {
        let result = self.backend.del(keys).await;
        self.tracker.observe(&result);
        result
    }

    async fn raw_sadd(&self, set_key: &str, member: &str) -> Result<(), ConfigError> {
        let result = self.backend.sadd(set_key, member).await;
        self.tracker.observe(&result);
        result
    }

    async fn raw_srem(&self, set_key: &str, member: &str) -> Result<(), ConfigError> {
        let result = self.backend.srem(set_key, member).await;
        self.tracker.observe(&result);
        result
    }

    async fn raw_smembers(&self, set_key: &str) -> Result<Vec<String>, ConfigError> {
        let result = self.backend.smembers(set_key).await;
        self.tracker.observe(&result);
        result.map(|mut members| {
            members.sort();
            members
        })
    }

    async fn raw_expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, ConfigError> {
        let result = self.backend.expire(key, ttl_seconds).await;
        self.tracker.observe(&result);
        result
    }

    async fn raw_ttl(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        let result = self.backend.ttl(key).await;
        self.tracker.observe(&result);
        result
    }

    /// 读取节点：优先读叶子，否则按子键集合重建对象
    fn read_node<'a>(&'a self, path: String) -> BoxFuture<'a, Result<Option<Value>, ConfigError>> {
        async move {
            if let Some(raw) = self.raw_get(&self.record_key(&path)).await? {
                return Ok(Some(decode_leaf(raw)));
            }

            let children = self.raw_smembers(&self.index_key(&path)).await?;
            if children.is_empty() {
                return Ok(None);
            }

            let mut object = Map::new();
            for child in children {
                let child_path = format!("{}:{}", path, child);
                // 集合中登记但已无值的子项显式返回 null
                let value = self.read_node(child_path).await?.unwrap_or(Value::Null);
                object.insert(child, value);
            }
            Ok(Some(Value::Object(object)))
        }
        .boxed()
    }

    /// 收集子树下所有存储键（叶子与集合）
    fn collect_subtree<'a>(
        &'a self,
        path: String,
        keys: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<(), ConfigError>> {
        async move {
            keys.push(self.record_key(&path));
            let index = self.index_key(&path);
            let children = self.raw_smembers(&index).await?;
            keys.push(index);
            for child in children {
                self.collect_subtree(format!("{}:{}", path, child), keys)
                    .await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// 在父级集合中登记路径的每一段，并删除挡路的祖先叶子
    async fn register_ancestors(&self, segments: &[&str]) -> Result<(), ConfigError> {
        let mut stale_leaves = Vec::new();
        for depth in 0..segments.len() {
            let parent = path_codec::join(&segments[..depth]);
            self.raw_sadd(&self.index_key(&parent), segments[depth])
                .await?;
            if depth > 0 {
                stale_leaves.push(self.record_key(&parent));
            }
        }
        if !stale_leaves.is_empty() {
            self.raw_del(&stale_leaves).await?;
        }
        Ok(())
    }

    /// 写入子树，返回写入的所有存储键
    async fn write_subtree(&self, path: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
        let mut written = Vec::new();
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (relative, leaf) in path_codec::flatten(value) {
                    let relative_segments: Vec<&str> = relative.split(path_codec::DELIMITER).collect();
                    if relative_segments.contains(&KEYSET_SEGMENT) {
                        return Err(ConfigError::InvalidKey {
                            key: format!("{}:{}", path, relative),
                        });
                    }
                    let mut parent = path.to_string();
                    for segment in &relative_segments {
                        let index = self.index_key(&parent);
                        self.raw_sadd(&index, segment).await?;
                        written.push(index);
                        parent = format!("{}:{}", parent, segment);
                    }
                    let record = self.record_key(&parent);
                    self.raw_set(&record, &leaf.to_string()).await?;
                    written.push(record);
                }
            }
            leaf => {
                let record = self.record_key(path);
                self.raw_set(&record, &leaf.to_string()).await?;
                written.push(record);
            }
        }
        written.sort();
        written.dedup();
        Ok(written)
    }

    async fn expire_keys(&self, keys: &[String], ttl_seconds: u64) -> Result<(), ConfigError> {
        for key in keys {
            self.raw_expire(key, ttl_seconds).await?;
        }
        Ok(())
    }
}

/// 叶子按 JSON 解析，非 JSON 文本（外部工具写入）按字符串返回
fn decode_leaf(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[async_trait]
impl ConfigStore for HierarchicalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        self.validate_path(key)?;
        debug!("读取配置存储: {}", key);
        self.read_node(key.to_string()).await
    }

    async fn get_whole(&self) -> Result<Option<Value>, ConfigError> {
        Ok(self.raw_get(&self.namespace).await?.map(decode_leaf))
    }

    async fn set(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), ConfigError> {
        let segments = self.validate_path(key)?;
        debug!("写入配置存储: {}", key);

        // 路径级别后写者胜出：先清掉原子树
        let mut previous = Vec::new();
        self.collect_subtree(key.to_string(), &mut previous).await?;
        self.raw_del(&previous).await?;

        self.register_ancestors(&segments).await?;
        let written = self.write_subtree(key, value).await?;

        if let Some(ttl) = ttl_seconds {
            self.expire_keys(&written, ttl).await?;
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), ConfigError> {
        let segments = self.validate_path(key)?;
        debug!("清除配置存储: {}", key);

        let mut keys = Vec::new();
        self.collect_subtree(key.to_string(), &mut keys).await?;
        self.raw_del(&keys).await?;

        if let Some((last, parents)) = segments.split_last() {
            let parent = path_codec::join(parents);
            self.raw_srem(&self.index_key(&parent), last).await?;
        }
        Ok(())
    }

    async fn members_of(&self, set_key: &str) -> Result<Vec<String>, ConfigError> {
        self.raw_smembers(set_key).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), ConfigError> {
        self.validate_path(key)?;
        let mut keys = Vec::new();
        self.collect_subtree(key.to_string(), &mut keys).await?;
        let mut applied = 0usize;
        for store_key in &keys {
            if self.raw_expire(store_key, ttl_seconds).await? {
                applied += 1;
            }
        }
        if applied == 0 {
            warn!("设置过期时间时路径不存在: {}", key);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.validate_path(key)?;
        match self.raw_ttl(&self.record_key(key)).await? {
            Some(ttl) => Ok(Some(ttl)),
            None => self.raw_ttl(&self.index_key(key)).await,
        }
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn keyset_key(&self) -> String {
        self.index_key("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use serde_json::json;

    fn store() -> (Arc<MemoryBackend>, HierarchicalStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = HierarchicalStore::new(backend.clone(), "config");
        (backend, store)
    }

    #[tokio::test]
    async fn test_leaf_layout() {
        let (backend, store) = store();
        store
            .set("workspaces:acme:users:bob:_password", &json!("pw"), None)
            .await
            .unwrap();

        assert_eq!(
            backend
                .get("config:workspaces:acme:users:bob:_password")
                .await
                .unwrap()
                .as_deref(),
            Some("\"pw\"")
        );
        assert_eq!(backend.smembers("config:keys").await.unwrap(), vec!["workspaces"]);
        assert_eq!(
            backend.smembers("config:workspaces:acme:users:keys").await.unwrap(),
            vec!["bob"]
        );
    }

    #[tokio::test]
    async fn test_object_round_trip() {
        let (_, store) = store();
        let value = json!({"redis": {"host": "localhost", "port": 6379}, "flags": [1, 2], "none": null});
        store.set("store", &value, None).await.unwrap();
        assert_eq!(store.get("store").await.unwrap(), Some(value));
        assert_eq!(store.get("store:redis:port").await.unwrap(), Some(json!(6379)));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_nested_write_updates_parent_view() {
        let (_, store) = store();
        store
            .set("workspaces", &json!({"w1": {"users": {"alice": {"_password": "plain"}}}}), None)
            .await
            .unwrap();
        store
            .set("workspaces:w1:users:alice:_password", &json!("hashed"), None)
            .await
            .unwrap();
        assert_eq!(
            store.get("workspaces").await.unwrap(),
            Some(json!({"w1": {"users": {"alice": {"_password": "hashed"}}}}))
        );
    }

    #[tokio::test]
    async fn test_set_replaces_subtree_and_leaf_ancestors() {
        let (_, store) = store();
        store.set("a", &json!({"b": 1, "c": 2}), None).await.unwrap();
        store.set("a", &json!({"d": 3}), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"d": 3})));

        store.set("x", &json!(5), None).await.unwrap();
        store.set("x:y", &json!(true), None).await.unwrap();
        assert_eq!(store.get("x").await.unwrap(), Some(json!({"y": true})));
    }

    #[tokio::test]
    async fn test_clear_removes_subtree_and_membership() {
        let (backend, store) = store();
        store.set("a", &json!({"b": {"c": 1}, "d": 2}), None).await.unwrap();
        store.clear("a:b").await.unwrap();
        assert_eq!(store.get("a:b").await.unwrap(), None);
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"d": 2})));

        store.clear("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(backend.smembers("config:keys").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_child_reads_as_null() {
        let (_, store) = store();
        store.set("session", &json!({"token": "t", "user": "bob"}), None).await.unwrap();
        store.expire("session:token", 5).await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(6)).await;
        assert_eq!(
            store.get("session").await.unwrap(),
            Some(json!({"token": null, "user": "bob"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_on_set() {
        let (_, store) = store();
        store.set("a:b", &json!(5), Some(10)).await.unwrap();
        assert_eq!(store.ttl("a:b").await.unwrap(), Some(10));

        store.set("a:c", &json!(5), None).await.unwrap();
        assert_eq!(store.ttl("a:c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reserved_and_empty_segments_rejected() {
        let (_, store) = store();
        assert!(matches!(
            store.set("a:keys", &json!(1), None).await,
            Err(ConfigError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.set("a", &json!({"keys": 1}), None).await,
            Err(ConfigError::InvalidKey { .. })
        ));
        assert!(matches!(store.get("").await, Err(ConfigError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn test_whole_slot_and_non_json_leaf() {
        let (backend, store) = store();
        assert_eq!(store.get_whole().await.unwrap(), None);
        backend.set("config", r#"{"version": "2"}"#).await.unwrap();
        assert_eq!(store.get_whole().await.unwrap(), Some(json!({"version": "2"})));

        backend.sadd("config:keys", "raw").await.unwrap();
        backend.set("config:raw", "plain text").await.unwrap();
        assert_eq!(store.get("raw").await.unwrap(), Some(json!("plain text")));
    }
}
