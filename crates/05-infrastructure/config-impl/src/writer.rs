//! 受保护的配置写入
//!
//! 只有写入成功才发布变更事件，写入失败时其他进程不会收到通知。

use crate::notifier::ChangeNotifier;
use config_abstractions::ConfigStore;
use infrastructure_common::ConfigError;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// 配置写入器
#[derive(Clone)]
pub struct ConfigWriter {
    store: Arc<dyn ConfigStore>,
    notifier: Arc<ChangeNotifier>,
}

impl std::fmt::Debug for ConfigWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWriter")
            .field("namespace", &self.store.namespace())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl ConfigWriter {
    pub fn new(store: Arc<dyn ConfigStore>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { store, notifier }
    }

    /// 写入路径并发布变更事件；给定 `ttl_seconds` 时在发布后设置过期
    pub async fn set(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), ConfigError> {
        match self.store.set(key, value, None).await {
            Ok(()) => {}
            Err(e @ ConfigError::InvalidKey { .. }) => return Err(e),
            Err(e) => return Err(ConfigError::write_failed(key, e)),
        }
        debug!("配置已写入: {}", key);

        // 通知是尽力而为的，发布失败不影响写入结果
        if let Err(e) = self.notifier.publish(key).await {
            warn!("配置变更事件发布失败: {}, 原因: {}", key, e);
        }

        if let Some(ttl) = ttl_seconds {
            self.store
                .expire(key, ttl)
                .await
                .map_err(|e| ConfigError::write_failed(key, e))?;
            debug!("配置过期时间已设置: {} ({} 秒)", key, ttl);
        }
        Ok(())
    }
}
