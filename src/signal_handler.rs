//! 信号处理模块
//!
//! 把 SIGINT/SIGTERM（非Unix系统为 Ctrl+C）转换为关闭信号

use crate::error::Result;
use crate::probe::ShutdownSignal;
use tracing::info;

#[cfg(not(unix))]
use tracing::error;

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 设置信号处理器，收到终止信号时触发 `shutdown`
pub fn setup_signal_handlers(shutdown: ShutdownSignal) -> Result<()> {
    #[cfg(unix)]
    {
        setup_unix_signals(shutdown)
    }
    #[cfg(not(unix))]
    {
        setup_ctrl_c(shutdown);
        Ok(())
    }
}

/// Unix/Linux系统信号处理
#[cfg(unix)]
fn setup_unix_signals(shutdown: ShutdownSignal) -> Result<()> {
    use futures::stream::StreamExt;

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    tokio::spawn(async move {
        let mut signals = signals;
        if let Some(signal) = signals.next().await {
            match signal {
                SIGINT => info!("接收到 SIGINT 信号，开始优雅关闭..."),
                SIGTERM => info!("接收到 SIGTERM 信号，开始优雅关闭..."),
                other => info!("接收到信号 {other}，开始优雅关闭..."),
            }
            shutdown.trigger();
        }
        handle.close();
    });

    Ok(())
}

/// 非Unix系统只监听 Ctrl+C
#[cfg(not(unix))]
fn setup_ctrl_c(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("接收到 Ctrl+C，开始优雅关闭...");
                shutdown.trigger();
            }
            Err(e) => error!("监听中断信号失败: {e}"),
        }
    });
}

/// 等待关闭信号
pub async fn wait_for_shutdown(shutdown: &ShutdownSignal) {
    shutdown.wait().await;
    info!("接收到关闭信号，开始清理资源...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_for_shutdown_returns_after_trigger() {
        let shutdown = ShutdownSignal::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        let start = std::time::Instant::now();
        wait_for_shutdown(&shutdown).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_setup_signal_handlers() {
        let shutdown = ShutdownSignal::new();
        assert!(setup_signal_handlers(shutdown.clone()).is_ok());
        assert!(!shutdown.is_triggered());
    }
}
