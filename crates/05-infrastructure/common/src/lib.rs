//! # Infrastructure Common
//!
//! 共享配置子系统的公共类型。
//!
//! ## 核心组件
//!
//! - [`ConfigError`] - 配置子系统统一错误类型
//! - [`HealthCheckable`] - 健康检查 trait
//! - [`ConfigSection`] - 配置节

pub mod configuration;
pub mod errors;
pub mod health;

pub use configuration::*;
pub use errors::*;
pub use health::*;
