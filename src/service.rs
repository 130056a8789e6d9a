//! 服务管理模块
//!
//! 负责组件初始化、启动以及带超时的关闭流程

use crate::config::Config;
use crate::error::Result;
use crate::probe::{DispatchQueue, Fetcher, HttpFetcher, PoolStats, Scheduler, ShutdownSignal, WorkerPool};
use crate::store::{RecordStore, SqliteStore};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 服务组件集合
pub struct ServiceComponents {
    /// 探测器
    pub fetcher: Arc<dyn Fetcher>,
    /// 记录存储，进程内唯一
    pub store: Arc<dyn RecordStore>,
}

impl ServiceComponents {
    /// 根据配置创建默认组件（HTTP探测器 + SQLite存储）
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.global.request_timeout())
            .context("创建HTTP探测器失败")?;
        let store = SqliteStore::new(&config.store);

        Ok(Self {
            fetcher: Arc::new(fetcher),
            store: Arc::new(store),
        })
    }
}

/// 监控服务
pub struct MonitorService {
    config: Config,
    components: ServiceComponents,
}

impl MonitorService {
    /// 创建监控服务
    pub fn new(config: Config, components: ServiceComponents) -> Self {
        Self { config, components }
    }

    /// 初始化存储并启动调度器和工作者池
    ///
    /// # 参数
    /// * `shutdown` - 关闭信号，触发后调度器和工作者在下一个循环边界退出
    pub async fn start(self, shutdown: ShutdownSignal) -> Result<RunningService> {
        let global = &self.config.global;

        self.components.store.init_schema().await?;

        let queue = Arc::new(DispatchQueue::new());
        let pool = WorkerPool::start(
            global.worker_count,
            Arc::clone(&queue),
            Arc::clone(&self.components.fetcher),
            Arc::clone(&self.components.store),
            shutdown.clone(),
            global.heartbeat(),
        );

        let scheduler = Scheduler::new(
            self.config.resources.clone(),
            Arc::clone(&queue),
            shutdown.clone(),
            global.heartbeat(),
        )
        .spawn();

        info!(
            "监控服务已启动，资源数量: {}，工作者数量: {}",
            self.config.resources.len(),
            pool.size()
        );

        Ok(RunningService {
            scheduler,
            pool,
            queue,
            shutdown,
            shutdown_timeout: global.shutdown_timeout(),
        })
    }
}

/// 关闭结果汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 调度器是否按时退出
    pub scheduler_stopped: bool,
    /// 超时未退出的工作者数量
    pub workers_timed_out: usize,
    /// 关闭时仍在队列中、未被执行的任务数
    pub pending_tasks: usize,
}

impl ShutdownReport {
    /// 所有任务是否都按时退出
    pub fn is_clean(&self) -> bool {
        self.scheduler_stopped && self.workers_timed_out == 0
    }
}

/// 运行中的监控服务
pub struct RunningService {
    scheduler: JoinHandle<()>,
    pool: WorkerPool,
    queue: Arc<DispatchQueue>,
    shutdown: ShutdownSignal,
    shutdown_timeout: Duration,
}

impl RunningService {
    /// 工作者池统计
    pub fn stats(&self) -> Arc<PoolStats> {
        self.pool.stats()
    }

    /// 触发关闭信号并等待调度器和所有工作者退出
    ///
    /// 每个任务最多等待 `shutdown_timeout`，超时的任务不会被强制终止。
    pub async fn shutdown(self) -> ShutdownReport {
        self.shutdown.trigger();
        info!("正在停止监控服务...");

        let scheduler_stopped = match tokio::time::timeout(self.shutdown_timeout, self.scheduler).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(critical = true, "调度器异常退出: {}", e);
                true
            }
            Err(_) => {
                warn!("调度器在 {:?} 内未退出", self.shutdown_timeout);
                false
            }
        };

        let stats = self.pool.stats();
        let workers_timed_out = self.pool.join(self.shutdown_timeout).await;
        let pending_tasks = self.queue.len();

        info!(
            "监控服务已停止，成功: {}，失败: {}，丢失: {}，未执行: {}",
            stats.succeeded(),
            stats.failed(),
            stats.lost(),
            pending_tasks
        );

        ShutdownReport {
            scheduler_stopped,
            workers_timed_out,
            pending_tasks,
        }
    }
}
