// 后台任务调度
// 所有网络与磁盘操作都在 tokio 运行时上执行，结果经 UiSender 回到前台

use std::fmt::Display;
use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::error;

use super::event::UiSender;

/// 后台任务调度器
///
/// 即发即忘：不排队、不重试、不支持取消，每次提交对应一个 tokio 任务。
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    handle: Handle,
    ui: UiSender,
}

impl TaskScheduler {
    pub fn new(handle: Handle, ui: UiSender) -> Self {
        Self { handle, ui }
    }

    /// 使用当前运行时（必须在运行时上下文中调用）
    pub fn current(ui: UiSender) -> Self {
        Self::new(Handle::current(), ui)
    }

    pub fn ui(&self) -> &UiSender {
        &self.ui
    }

    /// 提交一个后台任务
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// 提交一个可能失败的后台任务，失败时把错误写入终端日志
    pub fn spawn_reported<F, E>(&self, label: impl Into<String>, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let label = label.into();
        let ui = self.ui.clone();
        self.handle.spawn(async move {
            if let Err(e) = future.await {
                error!("[Task] {} failed: {}", label, e);
                ui.line(format!("{} failed: {}", label, e));
            }
        })
    }

    /// 在阻塞线程池上执行同步操作
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UiEvent;

    #[tokio::test]
    async fn test_spawn_returns_output() {
        let (ui, _rx) = UiSender::channel();
        let scheduler = TaskScheduler::current(ui);
        assert_eq!(scheduler.spawn(async { 21 * 2 }).await.unwrap(), 42);
        assert_eq!(scheduler.spawn_blocking(|| "done").await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_spawn_reported_delivers_error() {
        let (ui, mut rx) = UiSender::channel();
        let scheduler = TaskScheduler::current(ui);

        scheduler
            .spawn_reported("Refresh", async { Err::<(), _>("no route to host") })
            .await
            .unwrap();
        scheduler
            .spawn_reported("Refresh", async { Ok::<(), String>(()) })
            .await
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::Output("Refresh failed: no route to host\n".into())
        );
        assert!(rx.try_recv().is_err());
    }
}
