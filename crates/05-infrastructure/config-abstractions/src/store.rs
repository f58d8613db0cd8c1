//! 配置存储适配器抽象接口

use async_trait::async_trait;
use infrastructure_common::ConfigError;
use serde_json::Value;

/// 配置存储 trait
///
/// 以冒号分隔的层级路径读写外部存储。对象值读取时由子键集合重建，
/// 集合中登记但没有值的直接子项以显式 `null` 返回，保证镜像形状稳定。
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 读取路径对应的值，不存在返回 `None`
    async fn get(&self, key: &str) -> Result<Option<Value>, ConfigError>;

    /// 读取整体配置槽（命名空间本身对应的记录），用于键集合为空时的兜底同步
    async fn get_whole(&self) -> Result<Option<Value>, ConfigError>;

    /// 写入路径，替换该路径下原有的整棵子树；给定 `ttl_seconds` 时同时设置过期
    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<u64>)
        -> Result<(), ConfigError>;

    /// 删除路径及其子树
    async fn clear(&self, key: &str) -> Result<(), ConfigError>;

    /// 枚举命名空间键集合成员
    async fn members_of(&self, set_key: &str) -> Result<Vec<String>, ConfigError>;

    /// 为路径下所有记录设置过期时间（秒）
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), ConfigError>;

    /// 读取路径剩余过期时间（秒）
    async fn ttl(&self, key: &str) -> Result<Option<u64>, ConfigError>;

    /// 命名空间，例如 `config`
    fn namespace(&self) -> &str;

    /// 命名空间顶层键集合，完整同步时枚举
    fn keyset_key(&self) -> String {
        format!("{}:keys", self.namespace())
    }
}

/// 存储连接生命周期回调
///
/// 每次底层连接状态切换只触发一次，用于对外上报健康状态，本层不做重试。
pub trait StoreLifecycle: Send + Sync {
    /// 后端变为可达
    fn on_connect(&self);

    /// 命令因连接问题失败
    fn on_error(&self, error: &ConfigError);
}
