//! 探测记录数据结构
//!
//! 工作者在任务结束时生成的两类只追加记录

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 成功到达目标并拿到状态码的探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// 探测地址
    pub url: String,
    /// 请求发起时间（Unix 秒）
    pub request_timestamp: f64,
    /// 响应耗时（秒）
    pub response_time: f64,
    /// HTTP状态码
    pub response_code: u16,
    /// 模式匹配到的子串
    pub pattern_match: Option<String>,
}

impl ResultRecord {
    /// 创建新的探测结果
    pub fn new(
        url: impl Into<String>,
        request_timestamp: f64,
        response_time: Duration,
        response_code: u16,
    ) -> Self {
        Self {
            url: url.into(),
            request_timestamp,
            response_time: response_time.as_secs_f64(),
            response_code,
            pattern_match: None,
        }
    }

    /// 设置模式匹配结果
    pub fn with_pattern_match(mut self, pattern_match: Option<String>) -> Self {
        self.pattern_match = pattern_match;
        self
    }
}

/// 没有状态码可用的探测失败（DNS、连接、解码、模式错误等）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// 探测地址
    pub url: String,
    /// 请求发起时间（Unix 秒）
    pub request_timestamp: f64,
    /// 错误描述
    pub error_text: String,
}

impl ExceptionRecord {
    /// 创建新的异常记录
    pub fn new(url: impl Into<String>, request_timestamp: f64, error_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timestamp,
            error_text: error_text.into(),
        }
    }
}

/// 一次探测最终落库的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeRecord {
    /// 写入 results 表
    Result(ResultRecord),
    /// 写入 exceptions 表
    Exception(ExceptionRecord),
}

impl ProbeRecord {
    /// 记录对应的探测地址
    pub fn url(&self) -> &str {
        match self {
            ProbeRecord::Result(record) => &record.url,
            ProbeRecord::Exception(record) => &record.url,
        }
    }

    /// 是否为异常记录
    pub fn is_exception(&self) -> bool {
        matches!(self, ProbeRecord::Exception(_))
    }
}
