// SSH 会话管理
// 连接成功后的会话对象，提供 Shell / SFTP 通道

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::ChannelMsg;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use super::config::SshConfig;
use super::error::SshError;
use super::handler::SshClientHandler;
use super::transport::{SessionLink, ShellIo};
use crate::services::sftp::{RemoteFs, RusshRemoteFs};

type RusshChannel = russh::Channel<Msg>;

/// SSH 会话（连接成功后）
/// 内部持有 Handle，支持并发打开多个通道
pub struct SshSession {
    /// 共享的 russh Handle（Arc 包装）
    handle: Arc<Handle<SshClientHandler>>,
    /// 服务器主机名
    host: String,
    /// 用户名
    username: String,
    /// 连接状态
    is_connected: AtomicBool,
}

impl SshSession {
    /// 创建新的会话
    pub fn new(handle: Arc<Handle<SshClientHandler>>, host: String, username: String) -> Self {
        Self {
            handle,
            host,
            username,
            is_connected: AtomicBool::new(true),
        }
    }

    /// 检查会话是否活跃
    pub fn is_alive(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed) && !self.handle.is_closed()
    }

    fn ensure_alive(&self) -> Result<(), SshError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SshError::Disconnected("Session is disconnected".to_string()))
        }
    }
}

#[async_trait]
impl SessionLink for SshSession {
    async fn open_shell(&self, config: &SshConfig) -> Result<Arc<dyn ShellIo>, SshError> {
        self.ensure_alive()?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("Failed to open shell channel: {}", e)))?;

        channel
            .request_pty(false, &config.term, config.cols, config.rows, 0, 0, &[])
            .await
            .map_err(|e| SshError::Channel(format!("Failed to request pty: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::Channel(format!("Failed to request shell: {}", e)))?;

        info!("[SSH] Shell channel opened on {}@{}", self.username, self.host);
        Ok(Arc::new(RusshShell::spawn(channel, self.handle.clone())))
    }

    async fn open_sftp(&self) -> Result<Arc<dyn RemoteFs>, SshError> {
        self.ensure_alive()?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("Failed to open sftp channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::Channel(format!("Failed to request sftp subsystem: {}", e)))?;

        let fs = RusshRemoteFs::open(channel.into_stream())
            .await
            .map_err(|e| SshError::Channel(format!("Failed to create SFTP session: {}", e)))?;

        info!("[SSH] SFTP channel opened on {}@{}", self.username, self.host);
        Ok(Arc::new(fs))
    }

    async fn close(&self) -> Result<(), SshError> {
        if !self.is_connected.swap(false, Ordering::AcqRel) || self.handle.is_closed() {
            return Err(SshError::Disconnected("Session already closed".to_string()));
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
            .map_err(SshError::from)
    }
}

/// 终端通道
/// 读循环在后台任务中独占 channel，把输出写入缓冲队列；
/// 写入直接通过 handle.data() 发送，不需要持有 channel。
pub struct RusshShell {
    id: russh::ChannelId,
    handle: Arc<Handle<SshClientHandler>>,
    output: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl RusshShell {
    fn spawn(channel: RusshChannel, handle: Arc<Handle<SshClientHandler>>) -> Self {
        let id = channel.id();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(pump_shell(channel, output_tx, closed.clone(), close_rx));

        Self {
            id,
            handle,
            output: Mutex::new(output_rx),
            closed,
            close_tx: Mutex::new(Some(close_tx)),
        }
    }
}

/// 持续读取通道消息直到关闭
async fn pump_shell(
    mut channel: RusshChannel,
    output: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<AtomicBool>,
    mut close_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    trace!("[Shell] Received {} bytes", data.len());
                    let _ = output.send(data.to_vec());
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    let _ = output.send(data.to_vec());
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("[Shell] Remote side closed the channel");
                    break;
                }
                Some(_) => {}
            },
            _ = &mut close_rx => {
                debug!("[Shell] Closing channel on request");
                let _ = channel.eof().await;
                let _ = channel.close().await;
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
}

#[async_trait]
impl ShellIo for RusshShell {
    fn drain(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Ok(mut rx) = self.output.lock() {
            while let Ok(chunk) = rx.try_recv() {
                buf.extend_from_slice(&chunk);
            }
        }
        buf
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn write(&self, data: &[u8]) -> Result<(), SshError> {
        if self.is_closed() {
            return Err(SshError::Disconnected("Shell channel is closed".to_string()));
        }
        self.handle
            .data(self.id, data.to_vec().into())
            .await
            .map_err(|_| SshError::Channel("Failed to send data to channel".to_string()))
    }

    async fn flush(&self) -> Result<(), SshError> {
        // handle.data() 在返回前已经把数据交给会话
        Ok(())
    }

    async fn close(&self) -> Result<(), SshError> {
        let tx = self.close_tx.lock().ok().and_then(|mut guard| guard.take());
        match tx {
            Some(tx) if !self.is_closed() => {
                let _ = tx.send(());
                Ok(())
            }
            _ => Err(SshError::Disconnected(
                "Shell channel already closed".to_string(),
            )),
        }
    }
}
