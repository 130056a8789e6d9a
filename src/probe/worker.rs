//! 工作者池
//!
//! 固定数量的工作者从分发队列取任务、执行探测并写入存储。
//! 单个任务的任何失败（包括 panic）都不会让工作者退出；
//! 只有队列本身失效时工作者才会终止。

use crate::error::Result;
use crate::probe::fetcher::Fetcher;
use crate::probe::queue::DispatchQueue;
use crate::probe::shutdown::ShutdownSignal;
use crate::probe::task::Task;
use crate::store::{ProbeRecord, RecordStore, RecordWriter};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 工作者池统计
#[derive(Debug, Default)]
pub struct PoolStats {
    /// 探测成功（2xx）并已写入
    succeeded: AtomicU64,
    /// 探测失败（非2xx或异常）并已写入
    failed: AtomicU64,
    /// 写入失败或执行中 panic 而丢失的任务
    lost: AtomicU64,
}

impl PoolStats {
    /// 探测成功数
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// 探测失败数
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 丢失任务数
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// 已处理（无论结果如何）的任务总数
    pub fn processed(&self) -> u64 {
        self.succeeded() + self.failed() + self.lost()
    }
}

/// 单个工作者，写入句柄在首个任务时打开，此后一直由自己持有
struct Worker {
    id: usize,
    queue: Arc<DispatchQueue>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn RecordStore>,
    shutdown: ShutdownSignal,
    heartbeat: Duration,
    writer: Option<Box<dyn RecordWriter>>,
    stats: Arc<PoolStats>,
}

impl Worker {
    /// 工作者主循环
    async fn run(mut self) -> Result<()> {
        debug!("工作者 {} 启动", self.id);

        while !self.shutdown.is_triggered() {
            let popped = tokio::select! {
                _ = self.shutdown.wait() => break,
                popped = self.queue.pop(self.heartbeat) => popped?,
            };

            if let Some(task) = popped {
                self.process(task).await;
            }
        }

        debug!("工作者 {} 已停止", self.id);
        Ok(())
    }

    /// 执行一个任务，隔离其中的所有失败
    async fn process(&mut self, task: Task) {
        let url = task.url().to_string();
        let outcome = AssertUnwindSafe(self.execute(&task)).catch_unwind().await;

        match outcome {
            Ok(Ok(record)) => self.report(&record),
            Ok(Err(e)) => {
                self.stats.lost.fetch_add(1, Ordering::Relaxed);
                error!(critical = true, worker = self.id, "数据库操作失败，任务丢失: {} - {}", url, e);
            }
            Err(_) => {
                self.stats.lost.fetch_add(1, Ordering::Relaxed);
                // panic 时写入句柄可能处于未知状态，下个任务重新打开
                self.writer = None;
                error!(critical = true, worker = self.id, "执行任务时发生panic，任务丢失: {}", url);
            }
        }
    }

    /// 探测并写入，写入句柄按需打开
    async fn execute(&mut self, task: &Task) -> Result<ProbeRecord> {
        let record = task.run(self.fetcher.as_ref()).await;

        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.store.open_writer().await?,
        };
        let inserted = writer.insert(&record).await;
        self.writer = Some(writer);
        inserted?;

        Ok(record)
    }

    /// 记录已写入的探测结果
    fn report(&self, record: &ProbeRecord) {
        match record {
            ProbeRecord::Result(result) if (200..300).contains(&result.response_code) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                info!("URL {} 探测结果已写入数据库", result.url);
            }
            ProbeRecord::Result(result) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("URL {} 探测失败: HTTP {}", result.url, result.response_code);
            }
            ProbeRecord::Exception(exception) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("URL {} 探测失败: {}", exception.url, exception.error_text);
            }
        }
    }
}

/// 固定大小的工作者池
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<()>)>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// 启动工作者池
    ///
    /// # 参数
    /// * `size` - 工作者数量，启动后不再变化
    /// * `queue` - 分发队列
    /// * `fetcher` - 探测器
    /// * `store` - 记录存储
    /// * `shutdown` - 关闭信号
    /// * `heartbeat` - 单次出队等待上限
    pub fn start(
        size: usize,
        queue: Arc<DispatchQueue>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn RecordStore>,
        shutdown: ShutdownSignal,
        heartbeat: Duration,
    ) -> Self {
        let stats = Arc::new(PoolStats::default());

        let handles = (0..size)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&queue),
                    fetcher: Arc::clone(&fetcher),
                    store: Arc::clone(&store),
                    shutdown: shutdown.clone(),
                    heartbeat,
                    writer: None,
                    stats: Arc::clone(&stats),
                };

                let handle = tokio::spawn(async move {
                    if let Err(e) = worker.run().await {
                        error!(critical = true, worker = id, "工作者 {} 崩溃: {}", id, e);
                    }
                });
                (id, handle)
            })
            .collect();

        info!("工作者池已启动，工作者数量: {}", size);
        Self { handles, stats }
    }

    /// 工作者数量
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// 统计信息
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// 等待所有工作者退出，每个工作者最多等待 `timeout`
    ///
    /// # 返回
    /// * `usize` - 超时仍未退出的工作者数量
    pub async fn join(self, timeout: Duration) -> usize {
        let mut timed_out = 0;

        for (id, handle) in self.handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(critical = true, worker = id, "工作者 {} 异常退出: {}", id, e);
                }
                Err(_) => {
                    timed_out += 1;
                    warn!("工作者 {} 在 {:?} 内未退出", id, timeout);
                }
            }
        }

        timed_out
    }
}
