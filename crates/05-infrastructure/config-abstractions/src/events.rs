//! 配置变更事件定义

use async_trait::async_trait;
use futures::stream::BoxStream;
use infrastructure_common::ConfigError;
use serde::{Deserialize, Serialize};

/// 配置变更事件
///
/// 仅作为缓存失效信号，只携带键；新值总是由订阅方从存储重新读取。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    /// 事件类型
    pub event_type: ConfigChangeEventType,
    /// 变更路径
    pub key: String,
    /// 发布事件的进程标识
    pub origin: String,
    /// 事件时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ConfigChangeEvent {
    /// 创建键变更事件
    pub fn changed(key: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            event_type: ConfigChangeEventType::Changed,
            key: key.into(),
            origin: origin.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建完整同步完成事件
    pub fn reloaded(origin: impl Into<String>) -> Self {
        Self {
            event_type: ConfigChangeEventType::Reloaded,
            key: String::new(),
            origin: origin.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 配置变更事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigChangeEventType {
    /// 配置项写入
    Changed,
    /// 镜像完整重建
    Reloaded,
}

/// 变更事件订阅流
pub type ChangeSubscription = BoxStream<'static, ConfigChangeEvent>;

/// 配置变更总线 trait
///
/// 连接同一存储的所有进程共享的通知通道，投递语义为尽力而为、至多一次。
#[async_trait]
pub trait ChangeBus: Send + Sync {
    /// 发布变更事件
    async fn publish(&self, event: &ConfigChangeEvent) -> Result<(), ConfigError>;

    /// 订阅变更事件，返回时订阅已生效
    async fn subscribe(&self) -> Result<ChangeSubscription, ConfigError>;

    /// 总线名称
    fn name(&self) -> &str;
}
