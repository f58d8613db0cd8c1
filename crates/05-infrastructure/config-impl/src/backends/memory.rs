//! 内存键值后端
//!
//! 单进程使用及测试用的后端，语义对齐 redis：`SET` 清除过期时间，
//! 字符串与集合类型不可混用，过期在访问时惰性清理。

use async_trait::async_trait;
use config_abstractions::KeyValueBackend;
use dashmap::DashMap;
use infrastructure_common::ConfigError;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
enum Record {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    record: Record,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 内存键值后端
#[derive(Debug)]
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
    available: AtomicBool,
}

impl MemoryBackend {
    /// 创建新的内存后端
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// 模拟连接断开或恢复；断开时所有命令返回 [`ConfigError::StoreUnavailable`]
    pub fn set_available(&self, available: bool) {
        debug!("内存后端可用状态: {}", available);
        self.available.store(available, Ordering::SeqCst);
    }

    /// 当前未过期的键数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), ConfigError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConfigError::store_unavailable("内存后端已断开"))
        }
    }

    /// 读取未过期条目，过期条目顺带删除
    fn live_entry(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.clone())?;
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }

    fn wrong_type(key: &str) -> ConfigError {
        ConfigError::store_error(format!(
            "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
            key
        ))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.ensure_available()?;
        match self.live_entry(key) {
            None => Ok(None),
            Some(Entry {
                record: Record::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.ensure_available()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                record: Record::Text(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), ConfigError> {
        self.ensure_available()?;
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn sadd(&self, set_key: &str, member: &str) -> Result<(), ConfigError> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut entry = self.entries.entry(set_key.to_string()).or_insert_with(|| Entry {
            record: Record::Set(BTreeSet::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                record: Record::Set(BTreeSet::new()),
                expires_at: None,
            };
        }
        match &mut entry.record {
            Record::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Record::Text(_) => Err(Self::wrong_type(set_key)),
        }
    }

    async fn srem(&self, set_key: &str, member: &str) -> Result<(), ConfigError> {
        self.ensure_available()?;
        let emptied = match self.entries.get_mut(set_key) {
            Some(mut entry) => match &mut entry.record {
                Record::Set(members) => {
                    members.remove(member);
                    members.is_empty()
                }
                Record::Text(_) => return Err(Self::wrong_type(set_key)),
            },
            None => false,
        };
        // redis 在集合为空时删除该键
        if emptied {
            self.entries.remove(set_key);
        }
        Ok(())
    }

    async fn smembers(&self, set_key: &str) -> Result<Vec<String>, ConfigError> {
        self.ensure_available()?;
        match self.live_entry(set_key) {
            None => Ok(Vec::new()),
            Some(Entry {
                record: Record::Set(members),
                ..
            }) => Ok(members.into_iter().collect()),
            Some(_) => Err(Self::wrong_type(set_key)),
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, ConfigError> {
        self.ensure_available()?;
        if self.live_entry(key).is_none() {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.ensure_available()?;
        let Some(entry) = self.live_entry(key) else {
            return Ok(None);
        };
        Ok(entry.expires_at.map(|at| {
            let remaining = at.saturating_duration_since(Instant::now());
            // 与 redis TTL 一样四舍五入到秒
            ((remaining.as_millis() + 500) / 1000) as u64
        }))
    }

    fn name(&self) -> &str {
        "MemoryBackend"
    }
}
