//! # Configuration Abstractions
//!
//! 共享配置抽象层，定义镜像同步各协作方的接口。
//!
//! ## 核心接口
//!
//! - [`KeyValueBackend`] - 外部键值存储原语
//! - [`ConfigStore`] - 层级路径存储适配器
//! - [`ChangeBus`] - 配置变更通知总线
//! - [`ConfigProvider`] - 配置提供者接口
//! - [`PasswordHasher`] - 密码哈希接口

pub mod backend;
pub mod events;
pub mod provider;
pub mod store;

pub use backend::*;
pub use events::*;
pub use provider::*;
pub use store::*;
