//! 进程内配置镜像
//!
//! 镜像是存储内容在本进程的只读副本，读取不访问存储。每次同步按范围整体替换，
//! 不做差异合并。完整同步期间由变更事件触发的按路径同步优先于完整同步的结果。

use crate::barrier::JoinBarrier;
use crate::path_codec;
use config_abstractions::{ConfigChangeEvent, ConfigStore};
use infrastructure_common::ConfigError;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 完整同步的范围名，用于日志与错误
pub const FULL_SCOPE: &str = "*";

/// 进程内配置镜像
pub struct ConfigMirror {
    store: Arc<dyn ConfigStore>,
    tree: Arc<RwLock<Value>>,
    generation: watch::Sender<u64>,
    /// 按路径同步的序号
    scoped_seq: AtomicU64,
    /// 顶层名 -> 最近一次按路径同步的序号
    touched: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for ConfigMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigMirror")
            .field("namespace", &self.store.namespace())
            .field("generation", &*self.generation.borrow())
            .finish()
    }
}

impl ConfigMirror {
    /// 创建空镜像
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            store,
            tree: Arc::new(RwLock::new(Value::Object(Map::new()))),
            generation,
            scoped_seq: AtomicU64::new(0),
            touched: Mutex::new(HashMap::new()),
        }
    }

    /// 读取路径对应的镜像值
    pub fn get(&self, path: &str) -> Option<Value> {
        path_codec::lookup(&self.tree.read(), path).cloned()
    }

    /// 整棵镜像树的副本
    pub fn snapshot(&self) -> Value {
        self.tree.read().clone()
    }

    /// 已完成的完整同步次数
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// 订阅完整同步完成通知
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// 与存储同步
    ///
    /// `None` 按命名空间键集合完整同步；`Some(key)` 只重读该路径。
    /// 任一读取失败即返回 [`ConfigError::PopulateFailed`]，已投影的部分不回滚。
    pub async fn populate(&self, scope: Option<&str>) -> Result<(), ConfigError> {
        match scope {
            Some(key) => self
                .populate_key(key)
                .await
                .map_err(|e| ConfigError::populate_failed(key, e)),
            None => self
                .populate_all()
                .await
                .map_err(|e| ConfigError::populate_failed(FULL_SCOPE, e)),
        }
    }

    async fn populate_key(&self, key: &str) -> Result<(), ConfigError> {
        debug!("同步配置路径: {}", key);
        let value = self.store.get(key).await?;

        // 投影与登记在同一把写锁下完成，完整同步的裁剪看到的总是一致的状态
        let mut tree = self.tree.write();
        match value {
            Some(value) => {
                if !path_codec::unflatten_into(&mut tree, key, value) {
                    warn!("无效的配置路径，未写入镜像: {:?}", key);
                }
            }
            None => {
                path_codec::remove(&mut tree, key);
                debug!("配置路径已不存在，从镜像移除: {}", key);
            }
        }
        self.mark_touched(key);
        Ok(())
    }

    fn mark_touched(&self, key: &str) {
        let Some(top) = key.split(path_codec::DELIMITER).next() else {
            return;
        };
        let seq = self.scoped_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.touched.lock().insert(top.to_string(), seq);
    }

    /// `since` 之后被按路径同步过的顶层名
    fn touched_since(&self, since: u64, name: &str) -> bool {
        self.touched
            .lock()
            .get(name)
            .is_some_and(|seq| *seq > since)
    }

    async fn populate_all(&self) -> Result<(), ConfigError> {
        let started_at = self.scoped_seq.load(Ordering::SeqCst);
        let keys = self.store.members_of(&self.store.keyset_key()).await?;

        if keys.is_empty() {
            // 键集合为空时只走整体读取这一条路径
            debug!("键集合为空，读取整体配置槽");
            let whole = self.store.get_whole().await?;
            let mut next = match whole {
                Some(Value::Object(map)) => map,
                Some(other) => {
                    warn!("整体配置槽不是对象，已忽略: {}", other);
                    Map::new()
                }
                None => Map::new(),
            };

            let mut tree = self.tree.write();
            if let Value::Object(current) = &*tree {
                let names: Vec<String> = self.touched.lock().keys().cloned().collect();
                for name in names {
                    if !self.touched_since(started_at, &name) {
                        continue;
                    }
                    match current.get(&name) {
                        Some(value) => next.insert(name, value.clone()),
                        None => next.remove(&name),
                    };
                }
            }
            *tree = Value::Object(next);
            drop(tree);
            self.finish_full_sync();
            return Ok(());
        }

        info!("开始完整同步配置镜像，共 {} 个顶层键", keys.len());
        let (barrier, waiter) = JoinBarrier::new(keys.len());
        for key in &keys {
            let store = self.store.clone();
            let tree = self.tree.clone();
            let barrier = barrier.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let result = match store.get(&key).await {
                    Ok(Some(value)) => {
                        path_codec::unflatten_into(&mut tree.write(), &key, value);
                        Ok(())
                    }
                    Ok(None) => {
                        path_codec::remove(&mut tree.write(), &key);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                barrier.settle(result);
            });
        }
        drop(barrier);
        waiter.wait().await?;

        // 移除不在键集合中、且同步期间未被按路径同步过的顶层路径
        if let Value::Object(map) = &mut *self.tree.write() {
            map.retain(|name, _| keys.contains(name) || self.touched_since(started_at, name));
        }
        self.finish_full_sync();
        Ok(())
    }

    fn finish_full_sync(&self) {
        let event = ConfigChangeEvent::reloaded(self.store.namespace());
        self.generation.send_modify(|generation| *generation += 1);
        info!(
            "配置镜像完整同步完成 ({}:done, 第 {} 次): {:?}",
            self.store.namespace(),
            self.generation(),
            event.event_type
        );
    }
}
