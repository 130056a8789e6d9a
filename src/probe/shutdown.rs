//! 关闭信号
//!
//! 调度器和所有工作者共享同一个信号，在每次循环边界检查；
//! 触发时会立即唤醒所有正在等待的任务。

use tokio::sync::watch;

/// 进程级关闭信号，可克隆，所有克隆共享同一状态
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// 创建未触发的关闭信号
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// 触发关闭，重复触发无副作用
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// 是否已触发
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// 等待信号触发；已触发时立即返回
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // sender 由自身持有，wait_for 不会因通道关闭而失败
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
