//! 后台过期清理任务
//!
//! 惰性过期保证了正确性，但被放弃的挑战会一直占用内存；
//! 这里按固定间隔调用 [`OtpLedger::sweep_expired`]。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::OtpLedger;

/// 清理任务句柄
///
/// 调用 [`shutdown`](Self::shutdown) 停止任务；直接丢弃句柄同样会让任务退出。
#[derive(Debug)]
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// 停止清理任务并等待其退出
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }

    /// 任务是否已经结束
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// 在当前 tokio 运行时上启动清理任务
///
/// 必须在 tokio 运行时内调用。`every` 为零时按 1 毫秒处理。
pub fn spawn_sweeper(ledger: Arc<OtpLedger>, every: Duration) -> SweeperHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let period = every.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回，跳过
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = ledger.sweep_expired();
                    if removed > 0 {
                        debug!(removed, "swept expired challenges");
                    }
                }
                _ = &mut stop_rx => break,
            }
        }
        debug!("ledger sweeper stopped");
    });

    SweeperHandle {
        stop: Some(stop_tx),
        task,
    }
}
