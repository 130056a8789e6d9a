//! 探测任务
//!
//! 调度器为每次到期的资源构造一个不可变的 [`Task`]，由恰好一个工作者消费。
//! 匹配模式在构造任务时编译一次，之后随任务克隆共享。

use crate::config::ResourceSpec;
use crate::probe::fetcher::Fetcher;
use crate::store::{ExceptionRecord, ProbeRecord, ResultRecord};
use chrono::Utc;
use regex::Regex;
use std::time::Instant;

/// 编译后的匹配模式
#[derive(Debug, Clone)]
enum Pattern {
    Compiled(Regex),
    /// 编译失败的模式，执行时记录为异常
    Invalid { source: String, error: String },
}

impl Pattern {
    fn compile(source: String) -> Self {
        match Regex::new(&source) {
            Ok(regex) => Pattern::Compiled(regex),
            Err(e) => Pattern::Invalid {
                source,
                error: e.to_string(),
            },
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Pattern::Compiled(regex) => regex.as_str(),
            Pattern::Invalid { source, .. } => source,
        }
    }
}

/// 一次探测的工作单元
#[derive(Debug, Clone)]
pub struct Task {
    url: String,
    pattern: Option<Pattern>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.pattern() == other.pattern()
    }
}

impl Eq for Task {}

impl Task {
    /// 创建新任务，匹配模式在此编译
    pub fn new(url: impl Into<String>, pattern: Option<String>) -> Self {
        Self {
            url: url.into(),
            pattern: pattern.map(Pattern::compile),
        }
    }

    /// 由资源定义构造任务
    pub fn from_resource(resource: &ResourceSpec) -> Self {
        Self::new(resource.url.clone(), resource.pattern.clone())
    }

    /// 探测地址
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 匹配模式原文
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Pattern::as_str)
    }

    /// 执行探测并把结果归类为待写入的记录
    ///
    /// 成功响应和带状态码的失败都生成 [`ResultRecord`]；
    /// 没有状态码的失败以及模式编译失败生成 [`ExceptionRecord`]。
    pub async fn run(&self, fetcher: &dyn Fetcher) -> ProbeRecord {
        let request_timestamp = epoch_seconds();
        let start = Instant::now();

        match fetcher.fetch(&self.url).await {
            Ok(response) => match &self.pattern {
                Some(Pattern::Invalid { error, .. }) => ProbeRecord::Exception(ExceptionRecord::new(
                    self.url.clone(),
                    request_timestamp,
                    format!("匹配模式无效: {error}"),
                )),
                pattern => {
                    let regex = match pattern {
                        Some(Pattern::Compiled(regex)) => Some(regex),
                        _ => None,
                    };
                    ProbeRecord::Result(
                        ResultRecord::new(
                            self.url.clone(),
                            request_timestamp,
                            start.elapsed(),
                            response.status_code,
                        )
                        .with_pattern_match(find_first_match(regex, &response.body)),
                    )
                }
            },
            Err(error) => match error.status_code() {
                Some(code) => ProbeRecord::Result(ResultRecord::new(
                    self.url.clone(),
                    request_timestamp,
                    start.elapsed(),
                    code,
                )),
                None => ProbeRecord::Exception(ExceptionRecord::new(
                    self.url.clone(),
                    request_timestamp,
                    error.to_string(),
                )),
            },
        }
    }
}

/// 在响应体中查找模式的第一个匹配，只返回匹配到的子串
pub fn find_first_match(regex: Option<&Regex>, body: &str) -> Option<String> {
    regex?.find(body).map(|m| m.as_str().to_string())
}

/// 当前墙钟时间（Unix 秒，带小数）
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
