//! 键值存储后端抽象接口

use async_trait::async_trait;
use infrastructure_common::ConfigError;

/// 键值存储后端 trait
///
/// 对外部持久化键值存储的最小原语封装，任何提供这些原语的后端都可以接入。
/// 连接类失败必须以 [`ConfigError::StoreUnavailable`] 返回，其余命令失败以
/// [`ConfigError::StoreError`] 返回。
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// 读取字符串值，键不存在返回 `None`
    async fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;

    /// 写入字符串值，并清除原有过期时间
    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// 删除键（字符串或集合）
    async fn del(&self, keys: &[String]) -> Result<(), ConfigError>;

    /// 向集合添加成员
    async fn sadd(&self, set_key: &str, member: &str) -> Result<(), ConfigError>;

    /// 从集合移除成员
    async fn srem(&self, set_key: &str, member: &str) -> Result<(), ConfigError>;

    /// 枚举集合成员，集合不存在返回空列表
    async fn smembers(&self, set_key: &str) -> Result<Vec<String>, ConfigError>;

    /// 设置过期时间（秒），键不存在返回 `false`
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, ConfigError>;

    /// 剩余过期时间（秒），键不存在或未设置过期返回 `None`
    async fn ttl(&self, key: &str) -> Result<Option<u64>, ConfigError>;

    /// 后端名称
    fn name(&self) -> &str;
}
