//! 配置变更通知器
//!
//! 写入成功后发布变更事件；订阅端收到事件后只重读该路径，写入方自己也会收到。
//! 订阅断开后按退避间隔重新订阅，恢复后做一次完整同步补上断开期间的变更。

use crate::mirror::ConfigMirror;
use config_abstractions::{ChangeBus, ConfigChangeEvent, ConfigChangeEventType};
use futures::StreamExt;
use infrastructure_common::ConfigError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 首次重新订阅前的等待时间
const RESUBSCRIBE_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// 重新订阅的最长等待时间
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(5);

/// 配置变更通知器
pub struct ChangeNotifier {
    bus: Arc<dyn ChangeBus>,
    origin: String,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("bus", &self.bus.name())
            .field("origin", &self.origin)
            .field("is_running", &self.is_running())
            .finish()
    }
}

impl ChangeNotifier {
    /// 创建通知器，`origin` 为本进程标识
    pub fn new(bus: Arc<dyn ChangeBus>, origin: impl Into<String>) -> Self {
        Self {
            bus,
            origin: origin.into(),
            handler_task: Mutex::new(None),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 发布路径变更事件
    pub async fn publish(&self, key: &str) -> Result<(), ConfigError> {
        let event = ConfigChangeEvent::changed(key, self.origin.clone());
        debug!("发布配置变更事件: {}", key);
        self.bus.publish(&event).await
    }

    /// 订阅变更并驱动镜像按路径同步；返回时订阅已生效
    pub async fn start(&self, mirror: Arc<ConfigMirror>) -> Result<(), ConfigError> {
        if self.is_running() {
            return Ok(());
        }

        info!("启动配置变更通知器 [{}]", self.bus.name());
        let mut events = self.bus.subscribe().await?;
        let bus = self.bus.clone();
        let origin = self.origin.clone();

        let handle = tokio::spawn(async move {
            loop {
                while let Some(event) = events.next().await {
                    if event.event_type != ConfigChangeEventType::Changed {
                        continue;
                    }
                    debug!(
                        "收到配置变更事件: {} (来自 {}, 本进程 {})",
                        event.key, event.origin, origin
                    );
                    if let Err(e) = mirror.populate(Some(&event.key)).await {
                        warn!("按变更事件同步镜像失败: {}", e);
                    }
                }

                warn!("配置变更订阅已断开 [{}]，准备重新订阅", bus.name());
                events = resubscribe(bus.as_ref()).await;
                if let Err(e) = mirror.populate(None).await {
                    warn!("重新订阅后完整同步失败: {}", e);
                }
            }
        });

        let mut task = self.handler_task.lock();
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        info!("配置变更通知器已启动");
        Ok(())
    }

    /// 停止订阅
    pub fn stop(&self) {
        if let Some(handle) = self.handler_task.lock().take() {
            info!("停止配置变更通知器");
            handle.abort();
        }
    }

    /// 是否正在运行
    pub fn is_running(&self) -> bool {
        self.handler_task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// 按退避间隔重试订阅，直到成功
async fn resubscribe(bus: &dyn ChangeBus) -> config_abstractions::ChangeSubscription {
    let mut delay = RESUBSCRIBE_INITIAL_DELAY;
    loop {
        tokio::time::sleep(delay).await;
        match bus.subscribe().await {
            Ok(events) => {
                info!("配置变更订阅已恢复 [{}]", bus.name());
                return events;
            }
            Err(e) => {
                warn!("重新订阅配置变更失败，{:?} 后重试: {}", delay, e);
                delay = (delay * 2).min(RESUBSCRIBE_MAX_DELAY);
            }
        }
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        if let Some(handle) = self.handler_task.get_mut().take() {
            handle.abort();
        }
    }
}
