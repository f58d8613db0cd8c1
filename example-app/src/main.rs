//! # 示例应用程序
//!
//! 演示共享配置的启动顺序：加载启动选项、连接存储、初始化、订阅变更

use clap::Parser;
use config_abstractions::ConfigProvider;
use config_impl::{Argon2PasswordHasher, BootstrapOutcome, SharedConfigManager, SharedConfigOptions};
use infrastructure_common::{run_health_check, HealthStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Lorn ADSP 共享配置示例")]
struct Args {
    /// 基线配置文件路径，未指定时读取 ADSP_CONFIG_PATH
    #[arg(short, long)]
    baseline: Option<PathBuf>,

    /// 启动后写入的演示主题
    #[arg(long)]
    theme: Option<String>,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// 演示用的界面配置
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UiConfig {
    theme: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日志，RUST_LOG 优先
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动 Lorn ADSP 共享配置示例");

    let baseline = args
        .baseline
        .clone()
        .unwrap_or_else(SharedConfigOptions::baseline_path_from_env);
    let options = SharedConfigOptions::load(&baseline)?;

    let manager =
        SharedConfigManager::connect_redis(&options, Arc::new(Argon2PasswordHasher::new())).await?;

    // 初始化或首次同步失败时直接退出
    match manager.init().await {
        Ok(BootstrapOutcome::AlreadyInitialized { version }) => {
            info!("配置存储已是版本 {}", version);
        }
        Ok(BootstrapOutcome::Initialized {
            version,
            sections,
            migrated_passwords,
        }) => {
            info!(
                "已写入基线版本 {}: {} 个配置节, {} 个密码已迁移",
                version, sections, migrated_passwords
            );
        }
        Err(e) => {
            error!("共享配置启动失败: {}", e);
            report_health(&manager).await;
            return Err(e.into());
        }
    }

    demonstrate_configuration(&manager, args.theme.as_deref()).await?;
    report_health(&manager).await;

    // 等待退出信号
    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，正在关闭应用");

    manager.shutdown();
    info!("应用已关闭");
    Ok(())
}

/// 演示配置读写
async fn demonstrate_configuration(
    manager: &SharedConfigManager,
    theme: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(theme) = theme {
        manager
            .set("ui", &serde_json::json!({ "theme": theme }), None)
            .await?;
        // 本进程的变更事件异步到达，绑定前先同步该路径
        manager.populate(Some("ui")).await?;
        info!("已写入演示主题: {}", theme);
    }

    let ui = manager.bind::<UiConfig>("ui").unwrap_or_else(|e| {
        info!("界面配置不可用，使用默认值: {}", e);
        UiConfig::default()
    });
    info!("界面配置: {:?}", ui);

    let keys = manager.get_all_keys().await?;
    info!("镜像中共有 {} 个配置项", keys.len());
    Ok(())
}

/// 输出存储健康状态
async fn report_health(manager: &SharedConfigManager) {
    let Some(health) = manager.health() else {
        return;
    };
    let result = run_health_check(health.as_ref()).await;
    match result.status {
        HealthStatus::Healthy => info!("组件 {} 健康", result.component_name),
        HealthStatus::Degraded { message } => {
            warn!("组件 {} 降级: {}", result.component_name, message)
        }
        HealthStatus::Unhealthy { error } => {
            error!("组件 {} 不健康: {}", result.component_name, error)
        }
    }
}
