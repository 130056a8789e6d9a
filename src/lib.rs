//! Pulse Monitor - 周期性端点探测工具
//!
//! 这是一个用Rust编写的端点可用性监控工具，支持：
//! - 按资源独立周期调度HTTP探测
//! - 多工作者并发执行探测任务
//! - 响应内容正则匹配
//! - SQLite追加式结果存储
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod service;
pub mod signal_handler;
pub mod store;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, ResourceSpec, StoreConfig};
pub use error::MonitorError;
pub use probe::{DispatchQueue, Fetcher, HttpFetcher, Scheduler, ShutdownSignal, Task, WorkerPool};
pub use service::{MonitorService, RunningService, ServiceComponents, ShutdownReport};
pub use store::{ExceptionRecord, ProbeRecord, RecordStore, ResultRecord, SqliteStore};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
