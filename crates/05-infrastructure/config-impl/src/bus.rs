//! 配置变更总线实现

use crate::backends::redis::map_redis_error;
use crate::options::RedisOptions;
use async_trait::async_trait;
use config_abstractions::{ChangeBus, ChangeSubscription, ConfigChangeEvent};
use futures::StreamExt;
use infrastructure_common::ConfigError;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 进程内广播缓冲大小
const LOCAL_CAPACITY: usize = 1024;

/// 进程内变更总线
///
/// 多个管理器共享同一个实例即可在单进程内模拟多进程通知。
#[derive(Debug, Clone)]
pub struct LocalChangeBus {
    sender: broadcast::Sender<ConfigChangeEvent>,
}

impl LocalChangeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOCAL_CAPACITY);
        Self { sender }
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeBus for LocalChangeBus {
    async fn publish(&self, event: &ConfigChangeEvent) -> Result<(), ConfigError> {
        // 没有订阅者时发送失败，对尽力而为的通知不算错误
        if self.sender.send(event.clone()).is_err() {
            debug!("变更事件无订阅者: {}", event.key);
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeSubscription, ConfigError> {
        let receiver = self.sender.subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("变更事件消费过慢，丢弃 {} 条事件", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "LocalChangeBus"
    }
}

/// Redis 发布订阅变更总线
///
/// 发布走共享的多路复用连接，每个订阅独占一条连接。
#[derive(Clone)]
pub struct RedisChangeBus {
    client: redis::Client,
    publisher: ConnectionManager,
    channel: String,
}

impl std::fmt::Debug for RedisChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisChangeBus")
            .field("channel", &self.channel)
            .finish()
    }
}

impl RedisChangeBus {
    /// 连接 redis 并绑定变更频道
    pub async fn connect(
        options: &RedisOptions,
        channel: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let client = redis::Client::open(options.connection_info()).map_err(bus_error)?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(bus_error)?;
        let channel = channel.into();

        info!("配置变更总线已连接: redis @ {}, 频道: {}", options.endpoint(), channel);
        Ok(Self {
            client,
            publisher,
            channel,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

fn bus_error(err: redis::RedisError) -> ConfigError {
    ConfigError::BusError {
        message: map_redis_error(err).to_string(),
    }
}

#[async_trait]
impl ChangeBus for RedisChangeBus {
    async fn publish(&self, event: &ConfigChangeEvent) -> Result<(), ConfigError> {
        let payload = serde_json::to_string(event)?;
        let mut connection = self.publisher.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut connection)
            .await
            .map_err(bus_error)?;
        debug!("变更事件已发布: {} (接收方 {})", event.key, receivers);
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeSubscription, ConfigError> {
        let connection = self.client.get_async_connection().await.map_err(bus_error)?;
        let mut pubsub = connection.into_pubsub();
        pubsub.subscribe(&self.channel).await.map_err(bus_error)?;
        info!("已订阅配置变更频道: {}", self.channel);

        let stream = pubsub.into_on_message().filter_map(|message| async move {
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("无法读取变更消息内容: {}", e);
                    return None;
                }
            };
            match serde_json::from_str::<ConfigChangeEvent>(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("忽略无法解析的变更消息: {} ({})", payload, e);
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "RedisChangeBus"
    }
}
