//! Pulse Monitor 主程序入口
//!
//! 周期性端点探测工具

use anyhow::{Context, Result};
use clap::Parser;
use pulse_monitor::cli::args::{Args, Commands};
use pulse_monitor::cli::commands::{
    CheckCommand, Command, InitCommand, StartCommand, ValidateCommand,
};
use pulse_monitor::config::{ConfigLoader, TomlConfigLoader};
use pulse_monitor::logging::{parse_level, LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统，命令行未指定级别时使用配置文件中的级别
    let level = match args.log_level.clone() {
        Some(level) => level.into(),
        None => configured_log_level(&args).await,
    };
    let log_config = LogConfig {
        level,
        json_format: args.json_logs,
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Pulse Monitor v{} 启动", pulse_monitor::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 读取配置文件中的日志级别，配置不可用时返回 info
async fn configured_log_level(args: &Args) -> log::LevelFilter {
    TomlConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
        .map(|config| parse_level(&config.global.log_level))
        .unwrap_or(log::LevelFilter::Info)
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Init { .. } => Box::new(InitCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
