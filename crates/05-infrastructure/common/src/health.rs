//! 健康检查相关接口定义

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 健康状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "data")]
pub enum HealthStatus {
    /// 健康状态
    Healthy,
    /// 降级状态
    Degraded { message: String },
    /// 不健康状态
    Unhealthy { error: String },
}

impl HealthStatus {
    /// 创建健康状态
    pub fn healthy() -> Self {
        Self::Healthy
    }

    /// 创建降级状态
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::Degraded {
            message: message.into(),
        }
    }

    /// 创建不健康状态
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self::Unhealthy {
            error: error.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy { .. })
    }
}

/// 健康检查结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// 组件名称
    pub component_name: String,
    /// 健康状态
    pub status: HealthStatus,
    /// 状态变更时间
    pub changed_at: chrono::DateTime<chrono::Utc>,
    /// 额外信息
    pub additional_info: HashMap<String, String>,
}

impl HealthCheckResult {
    /// 创建新的健康检查结果
    pub fn new(component_name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component_name: component_name.into(),
            status,
            changed_at: chrono::Utc::now(),
            additional_info: HashMap::new(),
        }
    }

    /// 添加额外信息
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }
}

/// 健康检查 trait
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// 执行健康检查
    async fn check_health(&self) -> HealthStatus;

    /// 获取组件名称
    fn name(&self) -> &str;

    /// 获取检查超时时间
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// 按超时执行一次健康检查
pub async fn run_health_check(checker: &dyn HealthCheckable) -> HealthCheckResult {
    let status = match tokio::time::timeout(checker.timeout(), checker.check_health()).await {
        Ok(status) => status,
        Err(_) => HealthStatus::unhealthy("健康检查超时"),
    };
    HealthCheckResult::new(checker.name(), status)
}
