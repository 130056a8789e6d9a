//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// 主配置结构，包含全局配置、存储配置和探测资源列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// 探测资源列表（按配置顺序）
    pub resources: Vec<ResourceSpec>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 工作者数量
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// 心跳上限（毫秒），调度器休眠和工作者出队等待的最长时间
    #[serde(default = "default_heartbeat_millis")]
    pub heartbeat_millis: u64,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 关闭时等待每个任务退出的最长时间（秒）
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            heartbeat_millis: default_heartbeat_millis(),
            request_timeout_seconds: default_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl GlobalConfig {
    /// 心跳上限
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_millis)
    }

    /// 请求超时时间
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// 关闭等待时间
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// 存储配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// SQLite 数据库文件路径
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// 数据库忙等待超时（秒）
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,
    /// 页缓存大小（KiB）
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_seconds: default_busy_timeout(),
            cache_size_kib: default_cache_size_kib(),
        }
    }
}

/// 探测资源定义，启动时读取一次，之后不再变化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSpec {
    /// 探测地址
    pub url: String,
    /// 探测周期（秒），允许小数
    #[serde(alias = "period")]
    pub period_seconds: f64,
    /// 响应体匹配用的正则表达式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ResourceSpec {
    /// 创建新的资源定义
    pub fn new(url: impl Into<String>, period_seconds: impl Into<f64>, pattern: Option<&str>) -> Self {
        Self {
            url: url.into(),
            period_seconds: period_seconds.into(),
            pattern: pattern.map(str::to_string),
        }
    }

    /// 探测周期
    ///
    /// 周期不是有限正数，或换算后不足一纳秒时返回 `None`。
    pub fn period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.period_seconds)
            .ok()
            .filter(|period| !period.is_zero())
    }
}

// 默认值函数
fn default_worker_count() -> usize {
    3
}
fn default_heartbeat_millis() -> u64 {
    1000
}
fn default_timeout() -> u64 {
    10
}
fn default_shutdown_timeout() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_database_path() -> PathBuf {
    PathBuf::from("monitoring.db")
}
fn default_busy_timeout() -> u64 {
    5
}
fn default_cache_size_kib() -> u32 {
    8192
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.worker_count == 0 {
        return Err("工作者数量不能为0".to_string());
    }

    if config.global.heartbeat_millis == 0 {
        return Err("心跳上限不能为0".to_string());
    }

    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.shutdown_timeout_seconds == 0 {
        return Err("关闭等待时间不能为0".to_string());
    }

    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if config.store.database_path.as_os_str().is_empty() {
        return Err("数据库路径不能为空".to_string());
    }

    // 验证资源配置
    if config.resources.is_empty() {
        return Err("至少需要配置一个探测资源".to_string());
    }

    for resource in &config.resources {
        if !resource.url.starts_with("http://") && !resource.url.starts_with("https://") {
            return Err(format!("资源 {} 的URL格式无效", resource.url));
        }

        let Some(period) = resource.period() else {
            return Err(format!(
                "资源 {} 的探测周期无效: {}，必须为大于0的有限秒数",
                resource.url, resource.period_seconds
            ));
        };

        // 调度器用单调时钟加周期计算下次执行时间，不能溢出
        if Instant::now().checked_add(period).is_none() {
            return Err(format!(
                "资源 {} 的探测周期过大: {}秒",
                resource.url, resource.period_seconds
            ));
        }

        if let Some(ref pattern) = resource.pattern {
            if let Err(e) = Regex::new(pattern) {
                return Err(format!(
                    "资源 {} 的匹配模式无效: {}",
                    resource.url, e
                ));
            }
        }
    }

    Ok(())
}
