//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::error::Result;
use crate::probe::{Fetcher, HttpFetcher, ShutdownSignal, Task};
use crate::service::{MonitorService, ServiceComponents};
use crate::signal_handler::{setup_signal_handlers, wait_for_shutdown};
use crate::store::ProbeRecord;
use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;
use tracing::{info, warn};

/// `init` 命令生成的示例配置
pub const SAMPLE_CONFIG: &str = r#"# Pulse Monitor 配置文件

[global]
# 并发工作者数量
worker_count = 3
# 调度器和工作者检查关闭信号的最长间隔（毫秒）
heartbeat_millis = 1000
# 单次请求超时（秒）
request_timeout_seconds = 10
# 关闭时等待每个任务退出的时间（秒）
shutdown_timeout_seconds = 5
log_level = "info"

[store]
database_path = "monitoring.db"
busy_timeout_seconds = 5
cache_size_kib = 8192

[[resources]]
url = "https://example.com/"
period_seconds = 30

[[resources]]
url = "https://example.com/status"
period_seconds = 10
pattern = "Example Domain"
"#;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
async fn load_config(args: &Args) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(args.get_config_path()).await
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start { workers, database } = &args.command {
            let mut config = load_config(args).await?;

            // 命令行参数覆盖配置文件
            if let Some(workers) = workers {
                config.global.worker_count = *workers;
            }
            if let Some(database) = database {
                config.store.database_path = database.clone();
            }
            TomlConfigLoader::new(false).validate(&config)?;

            self.run_service(config).await
        } else {
            Ok(())
        }
    }
}

impl StartCommand {
    /// 运行服务直到收到终止信号
    async fn run_service(&self, config: Config) -> Result<()> {
        info!(
            "启动探测服务，数据库: {}",
            config.store.database_path.display()
        );

        let components = ServiceComponents::from_config(&config)?;
        let shutdown = ShutdownSignal::new();
        setup_signal_handlers(shutdown.clone())?;

        let running = MonitorService::new(config, components)
            .start(shutdown.clone())
            .await
            .context("启动监控服务失败")?;

        wait_for_shutdown(&shutdown).await;

        let report = running.shutdown().await;
        if !report.is_clean() {
            warn!(
                "部分任务未在超时内退出，调度器已停止: {}，超时工作者: {}",
                report.scheduler_stopped, report.workers_timed_out
            );
        }

        info!("探测服务已停止");
        Ok(())
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { filter, format } = &args.command {
            let config = load_config(args).await?;
            let fetcher = HttpFetcher::new(config.global.request_timeout())
                .context("创建HTTP探测器失败")?;

            let records = self.probe_once(&config, filter.as_deref(), &fetcher).await;
            if records.is_empty() {
                match filter {
                    Some(filter) => eprintln!("未找到URL包含 '{filter}' 的资源"),
                    None => eprintln!("未找到任何资源"),
                }
                return Ok(());
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Text => self.print_text_results(&records),
            }
        }
        Ok(())
    }
}

impl CheckCommand {
    /// 对匹配的资源各执行一次探测，结果不写入数据库
    pub async fn probe_once(
        &self,
        config: &Config,
        filter: Option<&str>,
        fetcher: &dyn Fetcher,
    ) -> Vec<ProbeRecord> {
        let tasks: Vec<Task> = config
            .resources
            .iter()
            .filter(|r| filter.map_or(true, |f| r.url.contains(f)))
            .map(Task::from_resource)
            .collect();

        join_all(tasks.iter().map(|task| task.run(fetcher))).await
    }

    /// 打印文本格式结果
    fn print_text_results(&self, records: &[ProbeRecord]) {
        for record in records {
            match record {
                ProbeRecord::Result(result) => {
                    let status_icon = if (200..300).contains(&result.response_code) {
                        "✓"
                    } else {
                        "✗"
                    };
                    println!(
                        "{} {} - {} - {:.0}ms",
                        status_icon,
                        result.url,
                        result.response_code,
                        result.response_time * 1000.0
                    );
                    if let Some(matched) = &result.pattern_match {
                        println!("  匹配: {matched}");
                    }
                }
                ProbeRecord::Exception(exception) => {
                    println!("✗ {} - 异常", exception.url);
                    println!("  错误: {}", exception.error_text);
                }
            }
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { verbose } = &args.command {
            self.validate_config_file(&args.get_config_path(), *verbose)
                .await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  工作者数量: {}", config.global.worker_count);
            println!("  心跳间隔: {}毫秒", config.global.heartbeat_millis);
            println!("  请求超时: {}秒", config.global.request_timeout_seconds);
            println!("  日志级别: {}", config.global.log_level);
            println!("存储配置:");
            println!("  数据库: {}", config.store.database_path.display());

            println!("资源配置:");
            for (i, resource) in config.resources.iter().enumerate() {
                println!("  {}. {}", i + 1, resource.url);
                println!("     周期: {}秒", resource.period_seconds);
                if let Some(pattern) = &resource.pattern {
                    println!("     匹配模式: {pattern}");
                }
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个探测资源", config.resources.len());
        }

        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { path, force } = &args.command {
            self.create_config_file(path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, SAMPLE_CONFIG).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的探测资源");

        Ok(())
    }
}
