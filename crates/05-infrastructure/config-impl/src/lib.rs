//! # Shared Configuration Implementation
//!
//! 多进程共享的层级配置：权威数据在外部键值存储中，每个进程维护一份本地镜像，
//! 通过变更通知保持最终一致。
//!
//! ## 主要组件
//!
//! - [`SharedConfigManager`] - 进程级配置上下文，读写与启动入口
//! - [`HierarchicalStore`] - 在扁平键值后端上维护层级路径
//! - [`ConfigMirror`] - 进程内镜像与同步
//! - [`ChangeNotifier`] - 变更事件的发布与订阅
//! - [`Bootstrapper`] - 存储首次初始化与密码迁移
//! - [`JoinBarrier`] - 并发子操作的计数汇合

pub mod backends;
pub mod barrier;
pub mod baseline;
pub mod bootstrap;
pub mod bus;
pub mod hasher;
pub mod health;
pub mod manager;
pub mod mirror;
pub mod notifier;
pub mod options;
pub mod path_codec;
pub mod store;
pub mod writer;

pub use backends::{MemoryBackend, RedisBackend};
pub use barrier::{JoinBarrier, JoinWaiter};
pub use baseline::Baseline;
pub use bootstrap::{BootstrapOutcome, Bootstrapper};
pub use bus::{LocalChangeBus, RedisChangeBus};
pub use hasher::Argon2PasswordHasher;
pub use health::{ConnectionStateTracker, StoreHealth};
pub use manager::SharedConfigManager;
pub use mirror::ConfigMirror;
pub use notifier::ChangeNotifier;
pub use options::{RedisOptions, SharedConfigOptions};
pub use store::HierarchicalStore;
pub use writer::ConfigWriter;
