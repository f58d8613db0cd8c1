//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("配置键不存在: {key}")]
    KeyNotFound { key: String },

    #[error("配置键无效: {key:?}")]
    InvalidKey { key: String },

    #[error("配置类型转换失败: {message}")]
    TypeConversionError { message: String },

    /// 存储连接不可用（由健康状态上报，本层不重试）
    #[error("配置存储不可用: {message}")]
    StoreUnavailable { message: String },

    /// 存储返回的非连接类错误
    #[error("配置存储命令失败: {message}")]
    StoreError { message: String },

    /// 基线配置文件不可读或格式错误，存储保持不变
    #[error("基线配置无效: {path}, 原因: {message}")]
    BaselineInvalid { path: String, message: String },

    /// 镜像同步失败，受影响的子树处于不确定状态
    #[error("配置镜像同步失败: {scope}, 原因: {source}")]
    PopulateFailed {
        scope: String,
        source: Box<ConfigError>,
    },

    /// 写入失败，未发布变更事件
    #[error("配置写入失败: {key}, 原因: {source}")]
    WriteFailed {
        key: String,
        source: Box<ConfigError>,
    },

    /// 并发汇合在全部子操作到达前被放弃
    #[error("并发汇合未完成: 期望 {expected}, 实际到达 {arrived}")]
    JoinIncomplete { expected: usize, arrived: usize },

    #[error("配置变更总线错误: {message}")]
    BusError { message: String },

    #[error("密码哈希失败: {message}")]
    HashError { message: String },
}

impl ConfigError {
    /// 创建存储不可用错误
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// 创建存储命令错误
    pub fn store_error(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    /// 创建基线配置无效错误
    pub fn baseline_invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BaselineInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 将错误包装为同步失败
    pub fn populate_failed(scope: impl Into<String>, source: ConfigError) -> Self {
        Self::PopulateFailed {
            scope: scope.into(),
            source: Box::new(source),
        }
    }

    /// 将错误包装为写入失败
    pub fn write_failed(key: impl Into<String>, source: ConfigError) -> Self {
        Self::WriteFailed {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// 是否为连接类错误
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::StoreUnavailable { .. } => true,
            Self::PopulateFailed { source, .. } | Self::WriteFailed { source, .. } => {
                source.is_connectivity()
            }
            _ => false,
        }
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
