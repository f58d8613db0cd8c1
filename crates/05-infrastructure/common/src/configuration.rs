//! 配置节定义

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 配置节
///
/// 镜像树中某个对象节点的直接子项快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSection {
    /// 配置数据
    pub data: Map<String, Value>,
}

impl ConfigSection {
    /// 创建新的配置节
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    /// 从对象节点创建配置节，非对象返回 `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|data| Self { data: data.clone() })
    }

    /// 插入配置项
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// 获取配置项
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 绑定到具体类型
    pub fn bind<T>(&self) -> Result<T, ConfigError>
    where
        T: for<'de> Deserialize<'de>,
    {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| ConfigError::SerializationError { source: e })
    }
}
