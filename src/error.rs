//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Pulse Monitor 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 任务分发相关错误
    #[error("任务分发错误: {0}")]
    Dispatch(#[from] DispatchError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 打开连接失败
    #[error("打开数据库连接失败: {0}")]
    Connect(String),

    /// 初始化表结构失败
    #[error("初始化数据库表结构失败: {0}")]
    Schema(String),

    /// 写入失败
    #[error("写入 {table} 表失败: {message}")]
    Write { table: &'static str, message: String },
}

/// 任务队列错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// 队列已关闭，无法继续收发任务
    #[error("任务队列已关闭")]
    Closed,
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, MonitorError>;
