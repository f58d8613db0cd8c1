//! 共享配置管理器
//!
//! 进程级的配置上下文：持有存储、镜像、通知器和初始化器，启动时构造一次后
//! 传给各个组件使用，同一进程内可以存在多个互不影响的实例。

use crate::backends::RedisBackend;
use crate::bootstrap::{BootstrapOutcome, Bootstrapper};
use crate::bus::RedisChangeBus;
use crate::health::StoreHealth;
use crate::mirror::ConfigMirror;
use crate::notifier::ChangeNotifier;
use crate::options::SharedConfigOptions;
use crate::path_codec;
use crate::store::HierarchicalStore;
use crate::writer::ConfigWriter;
use async_trait::async_trait;
use config_abstractions::{ChangeBus, ConfigProvider, ConfigStore, PasswordHasher, StoreLifecycle};
use infrastructure_common::{ConfigError, ConfigSection};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// 共享配置管理器
pub struct SharedConfigManager {
    /// 本进程标识，随变更事件发布
    process_id: String,
    store: Arc<dyn ConfigStore>,
    mirror: Arc<ConfigMirror>,
    notifier: Arc<ChangeNotifier>,
    writer: ConfigWriter,
    bootstrapper: Bootstrapper,
    baseline_path: PathBuf,
    health: Option<Arc<StoreHealth>>,
}

impl std::fmt::Debug for SharedConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConfigManager")
            .field("process_id", &self.process_id)
            .field("namespace", &self.store.namespace())
            .field("baseline_path", &self.baseline_path)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl SharedConfigManager {
    /// 用给定的存储、总线和密码哈希器创建管理器
    pub fn new(
        store: Arc<dyn ConfigStore>,
        bus: Arc<dyn ChangeBus>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let process_id = uuid::Uuid::new_v4().to_string();
        let mirror = Arc::new(ConfigMirror::new(store.clone()));
        let notifier = Arc::new(ChangeNotifier::new(bus, process_id.clone()));
        let writer = ConfigWriter::new(store.clone(), notifier.clone());
        let bootstrapper = Bootstrapper::new(store.clone(), writer.clone(), hasher);

        debug!("创建共享配置管理器: {}", process_id);
        Self {
            process_id,
            store,
            mirror,
            notifier,
            writer,
            bootstrapper,
            baseline_path: SharedConfigOptions::baseline_path_from_env(),
            health: None,
        }
    }

    /// 设置 `init` 使用的基线文件路径
    pub fn with_baseline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_path = path.into();
        self
    }

    /// 按启动选项连接 redis 存储与变更频道
    pub async fn connect_redis(
        options: &SharedConfigOptions,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Result<Self, ConfigError> {
        let health = Arc::new(StoreHealth::default());

        let backend = match RedisBackend::connect(&options.redis).await {
            Ok(backend) => backend,
            Err(e) => {
                health.on_error(&e);
                return Err(e);
            }
        };
        let store = HierarchicalStore::new(Arc::new(backend), options.namespace.clone())
            .with_lifecycle(health.clone());
        let bus = RedisChangeBus::connect(&options.redis, options.change_channel.clone()).await?;

        let mut manager = Self::new(Arc::new(store), Arc::new(bus), hasher)
            .with_baseline_path(options.baseline_path.clone());
        manager.health = Some(health);
        Ok(manager)
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn baseline_path(&self) -> &Path {
        &self.baseline_path
    }

    pub fn mirror(&self) -> &Arc<ConfigMirror> {
        &self.mirror
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// 存储健康状态，仅 `connect_redis` 创建的管理器提供
    pub fn health(&self) -> Option<&Arc<StoreHealth>> {
        self.health.as_ref()
    }

    /// 从镜像读取，不访问存储
    pub fn get(&self, path: &str) -> Option<Value> {
        self.mirror.get(path)
    }

    /// 直接从存储读取
    pub async fn get_fresh(&self, path: &str) -> Result<Option<Value>, ConfigError> {
        self.store.get(path).await
    }

    /// 写入配置并通知所有进程
    pub async fn set(
        &self,
        path: &str,
        value: &Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), ConfigError> {
        self.writer.set(path, value, ttl_seconds).await
    }

    /// 删除配置；不发布变更事件，其他进程在下次完整同步时才会看到删除
    pub async fn clear(&self, path: &str) -> Result<(), ConfigError> {
        self.store.clear(path).await
    }

    /// 剩余过期时间（秒）
    pub async fn ttl(&self, path: &str) -> Result<Option<u64>, ConfigError> {
        self.store.ttl(path).await
    }

    /// 检查存储初始化状态，必要时写入基线
    pub async fn validate(&self, baseline_path: &Path) -> Result<BootstrapOutcome, ConfigError> {
        self.bootstrapper.validate(baseline_path).await
    }

    /// 与存储同步镜像
    pub async fn populate(&self, scope: Option<&str>) -> Result<(), ConfigError> {
        self.mirror.populate(scope).await
    }

    /// 启动：初始化存储、订阅变更、完整同步镜像
    ///
    /// 先订阅再同步，避免同步期间发生的变更被遗漏。任一步骤失败即返回。
    pub async fn init(&self) -> Result<BootstrapOutcome, ConfigError> {
        info!("共享配置启动: {}", self.process_id);

        let outcome = self.validate(&self.baseline_path).await.map_err(|e| {
            error!("配置存储初始化失败: {}", e);
            e
        })?;
        self.notifier.start(self.mirror.clone()).await?;
        if let Err(e) = self.mirror.populate(None).await {
            error!("配置镜像首次同步失败: {}", e);
            self.notifier.stop();
            return Err(e);
        }

        info!("共享配置已就绪: {}", self.process_id);
        Ok(outcome)
    }

    /// 停止变更订阅
    pub fn shutdown(&self) {
        info!("共享配置关闭: {}", self.process_id);
        self.notifier.stop();
    }

    /// 是否正在接收变更通知
    pub fn is_subscribed(&self) -> bool {
        self.notifier.is_running()
    }

    /// 把镜像中的配置绑定到具体类型
    pub fn bind<T>(&self, path: &str) -> Result<T, ConfigError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self.get(path).ok_or_else(|| ConfigError::KeyNotFound {
            key: path.to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| ConfigError::TypeConversionError {
            message: format!("{}: {}", path, e),
        })
    }
}

/// 支持 `a.b.c` 与 `a:b:c` 两种写法
fn normalize_key(key: &str) -> String {
    key.replace('.', ":")
}

#[async_trait]
impl ConfigProvider for SharedConfigManager {
    async fn get_configuration(&self, key: &str) -> Result<Value, ConfigError> {
        let key = normalize_key(key);
        self.get(&key).ok_or(ConfigError::KeyNotFound { key })
    }

    async fn get_section(&self, section_name: &str) -> Result<ConfigSection, ConfigError> {
        let key = normalize_key(section_name);
        match self.get(&key) {
            Some(value) => {
                ConfigSection::from_value(&value).ok_or_else(|| ConfigError::TypeConversionError {
                    message: format!("配置节不是对象: {}", key),
                })
            }
            None => Err(ConfigError::KeyNotFound { key }),
        }
    }

    async fn reload(&self) -> Result<(), ConfigError> {
        self.populate(None).await
    }

    async fn contains_key(&self, key: &str) -> Result<bool, ConfigError> {
        Ok(self.get(&normalize_key(key)).is_some())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, ConfigError> {
        let mut keys: Vec<String> = path_codec::flatten(&self.mirror.snapshot())
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &str {
        "SharedConfigManager"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn supports_hot_reload(&self) -> bool {
        true
    }
}
