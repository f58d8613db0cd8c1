//! 存储首次初始化
//!
//! 版本标记不存在时把基线写入存储，并把与基线明文一致的用户密码替换为哈希。
//! 版本标记最后写入：中途失败的存储在下次启动时会重新初始化。

use crate::barrier::JoinBarrier;
use crate::baseline::{Baseline, PASSWORD_FIELD, VERSION_KEY, WORKSPACES_KEY};
use crate::writer::ConfigWriter;
use config_abstractions::{ConfigStore, PasswordHasher};
use infrastructure_common::ConfigError;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 初始化结果
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// 版本标记已存在，未做任何写入
    AlreadyInitialized { version: Value },
    /// 已写入基线
    Initialized {
        version: Value,
        sections: usize,
        migrated_passwords: usize,
    },
}

/// 存储初始化器
#[derive(Clone)]
pub struct Bootstrapper {
    store: Arc<dyn ConfigStore>,
    writer: ConfigWriter,
    hasher: Arc<dyn PasswordHasher>,
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("namespace", &self.store.namespace())
            .field("hasher", &self.hasher.name())
            .finish()
    }
}

impl Bootstrapper {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        writer: ConfigWriter,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            store,
            writer,
            hasher,
        }
    }

    /// 检查存储是否已初始化，未初始化时写入基线
    ///
    /// 基线无效时返回 [`ConfigError::BaselineInvalid`] 且不修改存储；
    /// 写入或迁移阶段的错误直接返回，已写入的部分不回滚。
    pub async fn validate(&self, baseline_path: &Path) -> Result<BootstrapOutcome, ConfigError> {
        let baseline = Baseline::load(baseline_path)?;

        if let Some(version) = self.store.get(VERSION_KEY).await? {
            info!("配置存储已初始化，版本: {}", version);
            return Ok(BootstrapOutcome::AlreadyInitialized { version });
        }

        info!(
            "配置存储未初始化，写入基线: {} (版本 {})",
            baseline.path().display(),
            baseline.version()
        );
        let sections = self.write_sections(&baseline).await?;
        let migrated_passwords = self.migrate_passwords(&baseline).await?;

        let version = baseline.version().clone();
        self.writer.set(VERSION_KEY, &version, None).await?;
        info!(
            "配置存储初始化完成: {} 个配置节, {} 个密码已迁移, 版本 {}",
            sections, migrated_passwords, version
        );

        Ok(BootstrapOutcome::Initialized {
            version,
            sections,
            migrated_passwords,
        })
    }

    async fn write_sections(&self, baseline: &Baseline) -> Result<usize, ConfigError> {
        let sections: Vec<(String, Value)> = baseline
            .sections()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let (barrier, waiter) = JoinBarrier::new(sections.len());
        for (name, value) in &sections {
            let writer = self.writer.clone();
            let barrier = barrier.clone();
            let name = name.clone();
            let value = value.clone();
            tokio::spawn(async move {
                debug!("写入基线配置节: {}", name);
                barrier.settle(writer.set(&name, &value, None).await);
            });
        }
        drop(barrier);
        waiter.wait().await?;
        Ok(sections.len())
    }

    /// 每个工作区一个汇合屏障（每次重新哈希到达一次），外层屏障每个工作区到达一次
    async fn migrate_passwords(&self, baseline: &Baseline) -> Result<usize, ConfigError> {
        let workspaces = baseline.workspace_users();
        let migrated = Arc::new(AtomicUsize::new(0));

        let (outer, outer_waiter) = JoinBarrier::new(workspaces.len());
        for (workspace, users) in workspaces {
            let (inner, inner_waiter) = JoinBarrier::new(users.len());
            for user in users {
                let Some(plaintext) = baseline.plaintext_password(&workspace, &user) else {
                    inner.arrive();
                    continue;
                };
                let task = MigrationTask {
                    store: self.store.clone(),
                    writer: self.writer.clone(),
                    hasher: self.hasher.clone(),
                    path: password_path(&workspace, &user),
                    plaintext: plaintext.to_string(),
                };
                let inner = inner.clone();
                let migrated = migrated.clone();
                tokio::spawn(async move {
                    let result = task.run().await.map(|rehashed| {
                        if rehashed {
                            migrated.fetch_add(1, Ordering::SeqCst);
                        }
                    });
                    inner.settle(result);
                });
            }
            drop(inner);

            let outer = outer.clone();
            tokio::spawn(async move {
                let result = inner_waiter.wait().await;
                debug!("工作区密码迁移完成: {} ({:?})", workspace, result.is_ok());
                outer.settle(result);
            });
        }
        drop(outer);
        outer_waiter.wait().await?;

        Ok(migrated.load(Ordering::SeqCst))
    }
}

fn password_path(workspace: &str, user: &str) -> String {
    format!("{}:{}:users:{}:{}", WORKSPACES_KEY, workspace, user, PASSWORD_FIELD)
}

struct MigrationTask {
    store: Arc<dyn ConfigStore>,
    writer: ConfigWriter,
    hasher: Arc<dyn PasswordHasher>,
    path: String,
    plaintext: String,
}

impl MigrationTask {
    /// 存储中的密码仍等于基线明文时替换为哈希，返回是否替换
    async fn run(self) -> Result<bool, ConfigError> {
        let stored = self.store.get(&self.path).await?;
        if stored.as_ref().and_then(Value::as_str) != Some(self.plaintext.as_str()) {
            debug!("密码已迁移，跳过: {}", self.path);
            return Ok(false);
        }

        let hasher = self.hasher;
        let plaintext = self.plaintext;
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| ConfigError::HashError {
                message: e.to_string(),
            })??;

        self.writer
            .set(&self.path, &Value::String(hash), None)
            .await?;
        debug!("密码已替换为哈希: {}", self.path);
        Ok(true)
    }
}
