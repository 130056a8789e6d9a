//! HTTP探测器实现
//!
//! 对给定URL发起请求，并把结果分为三类：成功响应、带状态码的失败、
//! 无状态码的失败。工作者根据这个分类决定写入哪张表。

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// 成功的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 按 UTF-8 解码后的响应体
    pub body: String,
}

/// 探测失败类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 服务端返回了非成功状态码
    #[error("HTTP {code} {reason}")]
    Status { code: u16, reason: String },

    /// 连接失败（DNS、拒绝连接、TLS等）
    #[error("连接失败: {0}")]
    Connect(String),

    /// 请求超时
    #[error("请求超时")]
    Timeout,

    /// 响应体解码失败
    #[error("响应体解码失败: {0}")]
    Decode(String),

    /// 其他请求错误
    #[error("请求失败: {0}")]
    Request(String),
}

impl FetchError {
    /// 带状态码的失败返回状态码，其余返回 None
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// 探测器trait，定义一次网络请求
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 请求指定URL
    ///
    /// # 参数
    /// * `url` - 探测地址
    ///
    /// # 返回
    /// * `Result<FetchResponse, FetchError>` - 响应或分类后的失败
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// 基于 reqwest 的HTTP探测器
pub struct HttpFetcher {
    /// HTTP客户端
    client: Client,
}

impl HttpFetcher {
    /// 创建新的HTTP探测器
    ///
    /// # 参数
    /// * `timeout` - 单次请求超时时间
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    /// 将 reqwest 错误归类
    fn classify_error(error: &reqwest::Error) -> FetchError {
        if let Some(status) = error.status() {
            FetchError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            }
        } else if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_connect() {
            FetchError::Connect(error.to_string())
        } else if error.is_decode() || error.is_body() {
            FetchError::Decode(error.to_string())
        } else {
            FetchError::Request(error.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::classify_error(&e))?;
        let body = String::from_utf8(bytes.to_vec())
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(FetchResponse {
            status_code: status.as_u16(),
            body,
        })
    }
}
