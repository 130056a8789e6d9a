//! 探测记录存储模块
//!
//! 提供只追加的持久化接口以及基于 SQLite 的实现。
//! 每个工作者通过 [`RecordStore::open_writer`] 获得独占的写入句柄，
//! 句柄之间互不共享。

pub mod record;
pub mod sqlite;

use crate::error::Result;
use async_trait::async_trait;

pub use record::{ExceptionRecord, ProbeRecord, ResultRecord};
pub use sqlite::SqliteStore;

/// 记录存储trait，进程内只构造一次并在各组件之间共享
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 初始化表结构，重复调用不产生任何效果
    async fn init_schema(&self) -> Result<()>;

    /// 打开一个新的私有写入句柄
    ///
    /// # 返回
    /// * `Result<Box<dyn RecordWriter>>` - 只属于调用方的写入句柄
    async fn open_writer(&self) -> Result<Box<dyn RecordWriter>>;
}

/// 写入句柄trait，每次写入立即提交
#[async_trait]
pub trait RecordWriter: Send {
    /// 写入一条探测结果，返回 results 表中的新行ID
    async fn insert_result(&mut self, record: &ResultRecord) -> Result<i64>;

    /// 写入一条异常记录，返回 exceptions 表中的新行ID
    async fn insert_exception(&mut self, record: &ExceptionRecord) -> Result<i64>;

    /// 按记录类型分发写入
    async fn insert(&mut self, record: &ProbeRecord) -> Result<i64> {
        match record {
            ProbeRecord::Result(result) => self.insert_result(result).await,
            ProbeRecord::Exception(exception) => self.insert_exception(exception).await,
        }
    }
}
