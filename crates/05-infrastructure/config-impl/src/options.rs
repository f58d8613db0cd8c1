//! 共享配置启动选项
//!
//! 存储连接信息在存储可用之前就需要，因此从基线文件的 `store.config.redis`
//! 节读取，再由 `ADSP_CONFIG__` 前缀的环境变量覆盖。

use infrastructure_common::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 基线文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "ADSP_CONFIG_PATH";

/// 默认基线文件路径
pub const DEFAULT_BASELINE_PATH: &str = "config/baseline.json";

/// 环境变量覆盖前缀
pub const ENV_PREFIX: &str = "ADSP_CONFIG";

/// Redis 连接选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub auth: Option<String>,
}

impl RedisOptions {
    /// 连接信息，口令原样传入，不经过 URL 编码
    pub fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                db: self.db,
                username: None,
                password: self.auth.clone().filter(|auth| !auth.is_empty()),
            },
        }
    }

    /// 不含口令的地址描述，用于日志
    pub fn endpoint(&self) -> String {
        format!("{}:{}#{}", self.host, self.port, self.db)
    }
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            auth: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

/// 共享配置启动选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfigOptions {
    /// 存储键命名空间
    pub namespace: String,
    /// 变更通知频道
    pub change_channel: String,
    /// 基线文件路径
    pub baseline_path: PathBuf,
    /// 存储连接
    pub redis: RedisOptions,
}

impl Default for SharedConfigOptions {
    fn default() -> Self {
        Self {
            namespace: "config".to_string(),
            change_channel: "config:change".to_string(),
            baseline_path: PathBuf::from(DEFAULT_BASELINE_PATH),
            redis: RedisOptions::default(),
        }
    }
}

impl SharedConfigOptions {
    /// 基线文件路径：优先读取 `ADSP_CONFIG_PATH`，否则使用默认路径
    pub fn baseline_path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BASELINE_PATH))
    }

    /// 从基线文件和环境变量加载启动选项，文件不存在时使用默认值
    pub fn load(baseline_path: &Path) -> Result<Self, ConfigError> {
        debug!("加载共享配置启动选项: {}", baseline_path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(baseline_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::ParseError {
                source: Box::new(e),
            })?;

        let redis = match settings.get::<RedisOptions>("store.config.redis") {
            Ok(redis) => redis,
            Err(config::ConfigError::NotFound(_)) => RedisOptions::default(),
            Err(e) => {
                return Err(ConfigError::ParseError {
                    source: Box::new(e),
                })
            }
        };

        let defaults = Self::default();
        let options = Self {
            namespace: settings
                .get_string("store.config.namespace")
                .unwrap_or(defaults.namespace),
            change_channel: settings
                .get_string("store.config.channel")
                .unwrap_or(defaults.change_channel),
            baseline_path: baseline_path.to_path_buf(),
            redis,
        };

        info!(
            "共享配置存储: redis @ {}, 命名空间: {}",
            options.redis.endpoint(),
            options.namespace
        );
        Ok(options)
    }
}
