//! 探测引擎模块
//!
//! 包含调度器、分发队列、工作者池以及探测器接口

pub mod fetcher;
pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod task;
pub mod worker;

// 重新导出主要类型
pub use fetcher::{FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use queue::DispatchQueue;
pub use scheduler::{Schedule, ScheduleEntry, Scheduler, Tick};
pub use shutdown::ShutdownSignal;
pub use task::Task;
pub use worker::{PoolStats, WorkerPool};
