//! 配置存储连接状态跟踪

use async_trait::async_trait;
use config_abstractions::StoreLifecycle;
use infrastructure_common::{ConfigError, HealthCheckResult, HealthCheckable, HealthStatus};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

const STATE_UNKNOWN: u8 = 0;
const STATE_UP: u8 = 1;
const STATE_DOWN: u8 = 2;

/// 连接状态跟踪器
///
/// 根据命令结果推断连接状态，仅在状态切换时调用生命周期回调。
pub struct ConnectionStateTracker {
    state: AtomicU8,
    lifecycle: Option<Arc<dyn StoreLifecycle>>,
}

impl std::fmt::Debug for ConnectionStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateTracker")
            .field("state", &self.state.load(Ordering::SeqCst))
            .field("has_lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

impl ConnectionStateTracker {
    /// 创建新的状态跟踪器
    pub fn new(lifecycle: Option<Arc<dyn StoreLifecycle>>) -> Self {
        Self {
            state: AtomicU8::new(STATE_UNKNOWN),
            lifecycle,
        }
    }

    /// 根据命令结果更新状态；非连接类错误不影响连接状态
    pub fn observe<T>(&self, result: &Result<T, ConfigError>) {
        match result {
            Ok(_) => self.mark_up(),
            Err(e) if e.is_connectivity() => self.mark_down(e),
            Err(_) => {}
        }
    }

    fn mark_up(&self) {
        if self.state.swap(STATE_UP, Ordering::SeqCst) != STATE_UP {
            if let Some(lifecycle) = &self.lifecycle {
                lifecycle.on_connect();
            }
        }
    }

    fn mark_down(&self, error: &ConfigError) {
        if self.state.swap(STATE_DOWN, Ordering::SeqCst) != STATE_DOWN {
            if let Some(lifecycle) = &self.lifecycle {
                lifecycle.on_error(error);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_UP
    }
}

/// 配置存储健康状态
///
/// 作为存储生命周期回调的接收方，对外提供健康检查结果。
#[derive(Debug)]
pub struct StoreHealth {
    name: String,
    current: RwLock<HealthCheckResult>,
}

impl StoreHealth {
    /// 创建新的存储健康状态，初始为降级（尚未连接）
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let current = HealthCheckResult::new(name.clone(), HealthStatus::degraded("尚未连接"));
        Self {
            name,
            current: RwLock::new(current),
        }
    }

    /// 当前健康检查结果
    pub fn snapshot(&self) -> HealthCheckResult {
        self.current.read().clone()
    }
}

impl Default for StoreHealth {
    fn default() -> Self {
        Self::new("config-store")
    }
}

impl StoreLifecycle for StoreHealth {
    fn on_connect(&self) {
        info!("配置存储 [{}] 已连接", self.name);
        *self.current.write() = HealthCheckResult::new(self.name.clone(), HealthStatus::healthy())
            .with_info("state", "working");
    }

    fn on_error(&self, error: &ConfigError) {
        error!("配置存储 [{}] 不可用: {}", self.name, error);
        *self.current.write() = HealthCheckResult::new(
            self.name.clone(),
            HealthStatus::unhealthy(error.to_string()),
        )
        .with_info("state", "failure");
    }
}

#[async_trait]
impl HealthCheckable for StoreHealth {
    async fn check_health(&self) -> HealthStatus {
        let status = self.current.read().status.clone();
        debug!("配置存储 [{}] 健康状态: {:?}", self.name, status);
        status
    }

    fn name(&self) -> &str {
        &self.name
    }
}
