//! 配置提供者抽象接口

use async_trait::async_trait;
use infrastructure_common::{ConfigError, ConfigSection};
use serde_json::Value;

/// 配置提供者 trait
///
/// 定义从不同数据源获取配置的统一接口
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// 获取配置值
    async fn get_configuration(&self, key: &str) -> Result<Value, ConfigError>;

    /// 获取配置节
    async fn get_section(&self, section_name: &str) -> Result<ConfigSection, ConfigError>;

    /// 重新加载配置
    async fn reload(&self) -> Result<(), ConfigError>;

    /// 检查配置键是否存在
    async fn contains_key(&self, key: &str) -> Result<bool, ConfigError>;

    /// 获取所有配置键
    async fn get_all_keys(&self) -> Result<Vec<String>, ConfigError>;

    /// 获取提供者名称
    fn name(&self) -> &str;

    /// 获取提供者优先级
    fn priority(&self) -> i32 {
        0
    }

    /// 是否支持热重载
    fn supports_hot_reload(&self) -> bool {
        false
    }
}

/// 密码哈希 trait
///
/// 基线迁移时把明文密码替换为哈希值
pub trait PasswordHasher: Send + Sync {
    /// 计算明文的哈希
    fn hash(&self, plaintext: &str) -> Result<String, ConfigError>;

    /// 哈希算法名称
    fn name(&self) -> &str;
}
