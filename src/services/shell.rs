// Shell 输出转发
// 轮询 Shell 通道的输出并转发到终端日志，空闲时按固定间隔休眠

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::constants::CONNECTION_CLOSED_NOTICE;
use crate::ssh::ShellIo;
use crate::state::{TaskScheduler, UiSender};

/// Shell 转发器
pub struct ShellRelay {
    shell: Arc<dyn ShellIo>,
    ui: UiSender,
    stop_tx: Option<watch::Sender<bool>>,
    done_rx: watch::Receiver<bool>,
    task_handle: Option<JoinHandle<()>>,
}

impl ShellRelay {
    /// 启动转发循环
    pub fn start(
        shell: Arc<dyn ShellIo>,
        ui: UiSender,
        poll_interval: Duration,
        scheduler: &TaskScheduler,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let relay_loop = Self::run_relay_loop(shell.clone(), ui.clone(), poll_interval, stop_rx);
        let task = scheduler.spawn(async move {
            relay_loop.await;
            let _ = done_tx.send(true);
        });

        Self {
            shell,
            ui,
            stop_tx: Some(stop_tx),
            done_rx,
            task_handle: Some(task),
        }
    }

    /// 发送一条命令（自动追加换行）
    ///
    /// 写入失败只报告到终端日志，不影响转发循环。
    pub async fn send_command(&self, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let result = match self.shell.write(line.as_bytes()).await {
            Ok(()) => self.shell.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("[Shell] Failed to send command: {}", e);
            self.ui.line(format!("Failed to send command: {}", e));
        }
    }

    /// 停止转发（不输出关闭提示）
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        info!("[Shell] Relay stopped");
    }

    /// 等待转发循环结束（通道关闭或被停止）
    pub async fn wait_finished(&self) {
        let mut done_rx = self.done_rx.clone();
        let _ = done_rx.wait_for(|done| *done).await;
    }

    /// 转发循环是否仍在运行
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    async fn run_relay_loop(
        shell: Arc<dyn ShellIo>,
        ui: UiSender,
        poll_interval: Duration,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        info!("[Shell] Starting relay loop");
        let mut decoder = Utf8Decoder::default();

        loop {
            if shell.is_closed() {
                // 关闭前写入的数据仍在缓冲里
                let text = decoder.decode(&shell.drain()) + &decoder.finish();
                if !text.is_empty() {
                    ui.output(text);
                }
                ui.output(CONNECTION_CLOSED_NOTICE);
                info!("[Shell] Channel closed, relay finished");
                return;
            }

            let bytes = shell.drain();
            if !bytes.is_empty() {
                trace!("[Shell] Received {} bytes", bytes.len());
                let text = decoder.decode(&bytes);
                if !text.is_empty() {
                    ui.output(text);
                }
                continue;
            }

            tokio::select! {
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        debug!("[Shell] Stop requested");
                        return;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

impl Drop for ShellRelay {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
    }
}

/// 增量 UTF-8 解码
///
/// 被读取边界切开的多字节字符会留到下一次再解码；非法字节替换为 U+FFFD。
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // 结尾是不完整的字符，等待后续字节
                        None => {
                            self.pending.drain(..valid_up_to);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
    }

    /// 输出剩余的不完整字节
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
