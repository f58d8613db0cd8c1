//! Redis 键值后端

use crate::options::RedisOptions;
use async_trait::async_trait;
use config_abstractions::KeyValueBackend;
use infrastructure_common::ConfigError;
use redis::aio::ConnectionManager;
use redis::RedisError;
use tracing::{debug, info};

/// Redis 键值后端
///
/// 基于 `ConnectionManager` 的多路复用连接，断线后由连接管理器自动重连。
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    endpoint: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl RedisBackend {
    /// 按连接选项建立连接
    pub async fn connect(options: &RedisOptions) -> Result<Self, ConfigError> {
        let client = redis::Client::open(options.connection_info()).map_err(map_redis_error)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        info!("已连接配置存储 redis @ {}", options.endpoint());
        Ok(Self {
            connection,
            endpoint: options.endpoint(),
        })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, ConfigError> {
        let mut connection = self.connection.clone();
        cmd.query_async(&mut connection)
            .await
            .map_err(map_redis_error)
    }
}

/// 把 redis 错误映射为连接类或命令类错误
pub fn map_redis_error(err: RedisError) -> ConfigError {
    if err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
        || err.is_timeout()
    {
        ConfigError::store_unavailable(err.to_string())
    } else {
        ConfigError::store_error(err.to_string())
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.query(redis::cmd("SET").arg(key).arg(value)).await
    }

    async fn del(&self, keys: &[String]) -> Result<(), ConfigError> {
        if keys.is_empty() {
            return Ok(());
        }
        debug!("删除 {} 个存储键", keys.len());
        self.query::<i64>(redis::cmd("DEL").arg(keys)).await?;
        Ok(())
    }

    async fn sadd(&self, set_key: &str, member: &str) -> Result<(), ConfigError> {
        self.query::<i64>(redis::cmd("SADD").arg(set_key).arg(member))
            .await?;
        Ok(())
    }

    async fn srem(&self, set_key: &str, member: &str) -> Result<(), ConfigError> {
        self.query::<i64>(redis::cmd("SREM").arg(set_key).arg(member))
            .await?;
        Ok(())
    }

    async fn smembers(&self, set_key: &str) -> Result<Vec<String>, ConfigError> {
        self.query(redis::cmd("SMEMBERS").arg(set_key)).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, ConfigError> {
        let applied: i64 = self
            .query(redis::cmd("EXPIRE").arg(key).arg(ttl_seconds))
            .await?;
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        // -2 键不存在，-1 未设置过期
        let remaining: i64 = self.query(redis::cmd("TTL").arg(key)).await?;
        Ok(u64::try_from(remaining).ok())
    }

    fn name(&self) -> &str {
        "RedisBackend"
    }
}
