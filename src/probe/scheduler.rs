//! 任务调度器模块
//!
//! 为每个资源维护下一次执行时间，到期时构造任务放入分发队列。
//! 每次到期只把执行时间推进一个周期：落后时下一轮立即再次到期，
//! 既不跳过也不合并错过的执行。

use crate::config::ResourceSpec;
use crate::error::Result;
use crate::probe::queue::DispatchQueue;
use crate::probe::shutdown::ShutdownSignal;
use crate::probe::task::Task;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 单个资源的调度状态
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    /// 资源定义
    pub resource: ResourceSpec,
    /// 下一次执行时间，`None` 表示周期无效或时钟溢出，不再调度
    pub next_execution_time: Option<Instant>,
    /// 任务模板，匹配模式只编译一次
    task: Task,
}

impl ScheduleEntry {
    fn new(resource: ResourceSpec, start: Instant) -> Self {
        let next_execution_time = advance(&resource, start);
        Self {
            task: Task::from_resource(&resource),
            next_execution_time,
            resource,
        }
    }
}

/// 从 `from` 推进一个周期
fn advance(resource: &ResourceSpec, from: Instant) -> Option<Instant> {
    let next = resource
        .period()
        .and_then(|period| from.checked_add(period));
    if next.is_none() {
        warn!(
            "资源 {} 的探测周期 {} 秒无法继续调度，已停止该资源",
            resource.url, resource.period_seconds
        );
    }
    next
}

/// 一次调度检查的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// 有资源到期
    Fire {
        /// 待分发的任务
        task: Task,
        /// 本次执行原定的时间
        scheduled_for: Instant,
    },
    /// 最早的资源还需等待这么久
    Sleep(Duration),
    /// 没有可调度的资源
    Idle,
}

/// 全部资源的调度表，由调度器独占
#[derive(Debug, Clone)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    /// 创建调度表，每个资源的首次执行时间为 `start + period`
    pub fn new(resources: Vec<ResourceSpec>, start: Instant) -> Self {
        let entries = resources
            .into_iter()
            .map(|resource| ScheduleEntry::new(resource, start))
            .collect();

        Self { entries }
    }

    /// 调度表中的资源数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 调度表是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全部调度状态
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// 执行时间最早的资源下标，时间相同时取配置顺序靠前的
    pub fn soonest(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.next_execution_time.map(|due| (index, due)))
            .min_by_key(|(_, due)| *due)
            .map(|(index, _)| index)
    }

    /// 检查当前时间下是否有资源到期
    ///
    /// 到期时返回任务，并把该资源的执行时间推进恰好一个周期。
    pub fn tick(&mut self, now: Instant) -> Tick {
        let Some(index) = self.soonest() else {
            return Tick::Idle;
        };

        let entry = &mut self.entries[index];
        let Some(due) = entry.next_execution_time else {
            return Tick::Idle;
        };
        if now < due {
            return Tick::Sleep(due - now);
        }

        entry.next_execution_time = advance(&entry.resource, due);
        Tick::Fire {
            task: entry.task.clone(),
            scheduled_for: due,
        }
    }
}

/// 任务调度器
pub struct Scheduler {
    /// 调度表
    schedule: Schedule,
    /// 分发队列
    queue: Arc<DispatchQueue>,
    /// 关闭信号
    shutdown: ShutdownSignal,
    /// 单次休眠上限
    heartbeat: Duration,
}

impl Scheduler {
    /// 创建新的调度器，以当前时间作为调度起点
    ///
    /// # 参数
    /// * `resources` - 资源列表（按配置顺序）
    /// * `queue` - 分发队列
    /// * `shutdown` - 关闭信号
    /// * `heartbeat` - 单次休眠上限
    pub fn new(
        resources: Vec<ResourceSpec>,
        queue: Arc<DispatchQueue>,
        shutdown: ShutdownSignal,
        heartbeat: Duration,
    ) -> Self {
        Self {
            schedule: Schedule::new(resources, Instant::now()),
            queue,
            shutdown,
            heartbeat,
        }
    }

    /// 运行调度循环，直到关闭信号触发
    ///
    /// 只有分发队列失效时才返回错误，调用方应将其视为致命错误。
    pub async fn run(mut self) -> Result<()> {
        info!("调度器启动，资源数量: {}", self.schedule.len());

        while !self.shutdown.is_triggered() {
            match self.schedule.tick(Instant::now()) {
                Tick::Fire {
                    task,
                    scheduled_for,
                } => {
                    debug!(
                        "分发任务: {}，延迟 {:?}",
                        task.url(),
                        scheduled_for.elapsed()
                    );
                    self.queue.push(task)?;
                }
                Tick::Sleep(wait) => {
                    let wait = wait.min(self.heartbeat);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.shutdown.wait() => {}
                    }
                }
                Tick::Idle => self.shutdown.wait().await,
            }
        }

        info!("调度器已停止");
        Ok(())
    }

    /// 在后台运行调度器，循环中的错误以致命级别记录
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(critical = true, "调度器崩溃: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources() -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("https://a.example.com", 2, None),
            ResourceSpec::new("https://b.example.com", 3, Some("ok")),
        ]
    }

    /// 推进时间并收集所有到期任务的 (url, 距起点的秒数)
    fn drain_until(schedule: &mut Schedule, start: Instant, until_secs: u64) -> Vec<(String, u64)> {
        let mut fired = Vec::new();
        for second in 0..=until_secs {
            let now = start + Duration::from_secs(second);
            while let Tick::Fire {
                task,
                scheduled_for,
            } = schedule.tick(now)
            {
                fired.push((task.url().to_string(), (scheduled_for - start).as_secs()));
            }
        }
        fired
    }

    #[test]
    fn test_first_firing_after_one_period() {
        let start = Instant::now();
        let mut schedule = Schedule::new(resources(), start);

        assert_eq!(schedule.tick(start), Tick::Sleep(Duration::from_secs(2)));
        assert_eq!(schedule.soonest(), Some(0));
    }

    #[test]
    fn test_firings_are_exactly_one_period_apart() {
        let start = Instant::now();
        let mut schedule = Schedule::new(resources(), start);

        let fired = drain_until(&mut schedule, start, 12);
        let a: Vec<u64> = fired
            .iter()
            .filter(|(url, _)| url.contains("a.example"))
            .map(|(_, at)| *at)
            .collect();
        let b: Vec<u64> = fired
            .iter()
            .filter(|(url, _)| url.contains("b.example"))
            .map(|(_, at)| *at)
            .collect();

        assert_eq!(a, vec![2, 4, 6, 8, 10, 12]);
        assert_eq!(b, vec![3, 6, 9, 12]);
    }

    #[test]
    fn test_ties_follow_configuration_order() {
        let start = Instant::now();
        let mut schedule = Schedule::new(resources(), start);

        let fired = drain_until(&mut schedule, start, 6);
        let at_six: Vec<&str> = fired
            .iter()
            .filter(|(_, at)| *at == 6)
            .map(|(url, _)| url.as_str())
            .collect();

        assert_eq!(at_six, vec!["https://a.example.com", "https://b.example.com"]);
    }

    #[test]
    fn test_lagging_entry_fires_once_per_tick_without_skipping() {
        let start = Instant::now();
        let mut schedule = Schedule::new(
            vec![ResourceSpec::new("https://slow.example.com", 2, None)],
            start,
        );

        // 落后 10 秒：每次 tick 只分发一次，原定时间依次为 2、4、6、8、10
        let now = start + Duration::from_secs(10);
        let mut scheduled = Vec::new();
        for _ in 0..5 {
            match schedule.tick(now) {
                Tick::Fire { scheduled_for, .. } => {
                    scheduled.push((scheduled_for - start).as_secs())
                }
                other => panic!("期望到期，实际: {other:?}"),
            }
        }

        assert_eq!(scheduled, vec![2, 4, 6, 8, 10]);
        assert_eq!(schedule.tick(now), Tick::Sleep(Duration::from_secs(2)));
        assert_eq!(
            schedule.entries()[0].next_execution_time,
            Some(start + Duration::from_secs(12))
        );
    }

    #[test]
    fn test_fractional_period_fires_on_exact_offsets() {
        let start = Instant::now();
        let mut schedule = Schedule::new(
            vec![ResourceSpec::new("https://fast.example.com", 0.5, None)],
            start,
        );

        assert_eq!(schedule.tick(start), Tick::Sleep(Duration::from_millis(500)));

        let now = start + Duration::from_millis(2000);
        let mut scheduled = Vec::new();
        while let Tick::Fire { scheduled_for, .. } = schedule.tick(now) {
            scheduled.push((scheduled_for - start).as_millis());
        }

        assert_eq!(scheduled, vec![500, 1000, 1500, 2000]);
        assert_eq!(schedule.tick(now), Tick::Sleep(Duration::from_millis(500)));
    }

    #[test]
    fn test_unschedulable_period_is_idle_instead_of_panicking() {
        let start = Instant::now();
        let mut schedule = Schedule::new(
            vec![
                ResourceSpec::new("https://never.example.com", 1e19, None),
                ResourceSpec::new("https://negative.example.com", -1.0, None),
            ],
            start,
        );

        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.soonest(), None);
        assert_eq!(schedule.tick(start), Tick::Idle);
    }

    // Linux 的单调时钟以 i64 秒表示，溢出点可预测
    #[cfg(target_os = "linux")]
    #[test]
    fn test_entry_retires_when_next_time_overflows() {
        let start = Instant::now();
        let period = Duration::from_secs(4_000_000_000_000_000_000);
        let mut schedule = Schedule::new(
            vec![ResourceSpec::new("https://rare.example.com", 4e18, None)],
            start,
        );

        let first = start + period;
        assert!(matches!(schedule.tick(first), Tick::Fire { .. }));
        let second = first + period;
        assert!(matches!(schedule.tick(second), Tick::Fire { .. }));

        assert_eq!(schedule.entries()[0].next_execution_time, None);
        assert_eq!(schedule.tick(second), Tick::Idle);
    }

    #[test]
    fn test_fired_tasks_carry_resource_pattern() {
        let start = Instant::now();
        let mut schedule = Schedule::new(resources(), start);

        match schedule.tick(start + Duration::from_secs(3)) {
            Tick::Fire { task, .. } => assert_eq!(task.url(), "https://a.example.com"),
            other => panic!("期望到期，实际: {other:?}"),
        }
        match schedule.tick(start + Duration::from_secs(3)) {
            Tick::Fire { task, .. } => assert_eq!(task.pattern(), Some("ok")),
            other => panic!("期望到期，实际: {other:?}"),
        }
    }

    #[test]
    fn test_empty_schedule_is_idle() {
        let mut schedule = Schedule::new(Vec::new(), Instant::now());
        assert!(schedule.is_empty());
        assert_eq!(schedule.tick(Instant::now()), Tick::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_dispatches_due_tasks() {
        let queue = Arc::new(DispatchQueue::new());
        let shutdown = ShutdownSignal::new();
        let scheduler = Scheduler::new(
            resources(),
            Arc::clone(&queue),
            shutdown.clone(),
            Duration::from_secs(1),
        );
        let handle = scheduler.spawn();

        // a: 2、4、6；b: 3、6
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(queue.len(), 5);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("调度器应在心跳上限内退出")
            .unwrap();

        // 关闭之后不再有新任务
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(queue.len(), 5);

        let first = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.url(), "https://a.example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_exits_promptly_on_shutdown() {
        let queue = Arc::new(DispatchQueue::new());
        let shutdown = ShutdownSignal::new();
        let scheduler = Scheduler::new(
            vec![ResourceSpec::new("https://hourly.example.com", 3600, None)],
            Arc::clone(&queue),
            shutdown.clone(),
            Duration::from_secs(1),
        );
        let handle = scheduler.spawn();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let triggered_at = Instant::now();
        shutdown.trigger();
        handle.await.unwrap();

        assert!(triggered_at.elapsed() < Duration::from_secs(1));
        assert!(queue.is_empty());
    }
}
