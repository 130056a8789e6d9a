//! 任务分发队列
//!
//! 无界、先进先出，一个生产者（调度器）对多个消费者（工作者）。
//! 出队带超时，空闲的工作者可以定期回到循环边界检查关闭信号。

use crate::error::DispatchError;
use crate::probe::task::Task;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// 线程安全的任务队列
#[derive(Debug)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Task>,
    receiver: Mutex<mpsc::UnboundedReceiver<Task>>,
    pending: AtomicUsize,
}

impl DispatchQueue {
    /// 创建空队列
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            pending: AtomicUsize::new(0),
        }
    }

    /// 非阻塞入队
    pub fn push(&self, task: Task) -> Result<(), DispatchError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.sender.send(task).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            DispatchError::Closed
        })
    }

    /// 出队，最多等待 `timeout`
    ///
    /// 超时返回 `Ok(None)`。等待时间包含争用接收端锁的时间，
    /// 因此多个工作者同时等待时每个人的等待仍有上限。
    pub async fn pop(&self, timeout: Duration) -> Result<Option<Task>, DispatchError> {
        let received = tokio::time::timeout(timeout, async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        })
        .await;

        match received {
            Ok(Some(task)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(task))
            }
            Ok(None) => Err(DispatchError::Closed),
            Err(_) => Ok(None),
        }
    }

    /// 当前排队中的任务数
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn task(url: &str) -> Task {
        Task::new(url, None)
    }

    #[tokio::test]
    async fn test_fifo_order_single_consumer() {
        let queue = DispatchQueue::new();
        queue.push(task("a")).unwrap();
        queue.push(task("b")).unwrap();
        queue.push(task("c")).unwrap();
        assert_eq!(queue.len(), 3);

        let timeout = Duration::from_millis(50);
        assert_eq!(queue.pop(timeout).await.unwrap().unwrap().url(), "a");
        assert_eq!(queue.pop(timeout).await.unwrap().unwrap().url(), "b");
        assert_eq!(queue.pop(timeout).await.unwrap().unwrap().url(), "c");
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_on_empty_queue() {
        let queue = DispatchQueue::new();
        let started = tokio::time::Instant::now();

        let result = queue.pop(Duration::from_secs(1)).await.unwrap();

        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_contention_is_bounded_by_timeout() {
        let queue = Arc::new(DispatchQueue::new());
        let started = tokio::time::Instant::now();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.pop(Duration::from_secs(1)).await })
            })
            .collect();

        for waiter in waiters {
            assert!(waiter.await.unwrap().unwrap().is_none());
        }
        assert!(started.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_task_consumed_exactly_once() {
        let queue = Arc::new(DispatchQueue::new());
        for i in 0..200 {
            queue.push(task(&format!("task-{i}"))).unwrap();
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(task) = queue.pop(Duration::from_millis(50)).await.unwrap() {
                        seen.push(task.url().to_string());
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }

        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
        assert!(queue.is_empty());
    }
}
