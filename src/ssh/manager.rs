// SSH 会话管理
// 建立会话并依次打开 Shell / SFTP 通道，断开时按相反顺序释放

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use super::config::SshConfig;
use super::error::SshError;
use super::event::ConnectionState;
use super::transport::{Connector, SessionLink, ShellIo};
use crate::services::sftp::{RemoteFs, SftpError};
use crate::state::{UiEvent, UiSender};

/// 一个已建立的会话，独占一个 Shell 通道和一个 SFTP 通道
pub struct Session {
    host: String,
    port: u16,
    user: String,
    state: Mutex<ConnectionState>,
    link: Arc<dyn SessionLink>,
    shell: Arc<dyn ShellIo>,
    fs: Arc<dyn RemoteFs>,
    closed: AtomicBool,
}

impl Session {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn shell(&self) -> Arc<dyn ShellIo> {
        self.shell.clone()
    }

    pub fn fs(&self) -> Arc<dyn RemoteFs> {
        self.fs.clone()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// 会话管理器
#[derive(Clone)]
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    ui: UiSender,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, ui: UiSender) -> Self {
        Self { connector, ui }
    }

    /// 建立会话，然后依次打开 Shell 和 SFTP 通道
    ///
    /// 任一通道打开失败时，关闭已打开的部分并返回错误。
    /// 状态变化（Connecting → Connected | Failed）经前台通道上报。
    pub async fn connect(&self, config: &SshConfig) -> Result<Arc<Session>, SshError> {
        info!("[SSH] Connecting to {}", config.target());
        self.ui.connection(ConnectionState::Connecting);

        match self.open(config).await {
            Ok(session) => {
                info!("[SSH] Connected to {}", config.target());
                self.ui.send(UiEvent::ConnectionInfo {
                    host: session.host.clone(),
                    port: session.port,
                    user: session.user.clone(),
                });
                self.ui.connection(ConnectionState::Connected);
                Ok(session)
            }
            Err(e) => {
                warn!("[SSH] Connection to {} failed: {}", config.target(), e);
                self.ui.connection(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    async fn open(&self, config: &SshConfig) -> Result<Arc<Session>, SshError> {
        let link = self.connector.open_session(config).await?;

        let shell = match link.open_shell(config).await {
            Ok(shell) => shell,
            Err(e) => {
                close_link(link.as_ref()).await;
                return Err(e);
            }
        };

        let fs = match link.open_sftp().await {
            Ok(fs) => fs,
            Err(e) => {
                close_shell(shell.as_ref()).await;
                close_link(link.as_ref()).await;
                return Err(e);
            }
        };

        Ok(Arc::new(Session {
            host: config.host.clone(),
            port: config.port,
            user: config.username.clone(),
            state: Mutex::new(ConnectionState::Connected),
            link,
            shell,
            fs,
            closed: AtomicBool::new(false),
        }))
    }

    /// 断开会话（幂等）
    ///
    /// 依次关闭 SFTP 通道、Shell 通道和会话；已关闭的资源被忽略，
    /// 其他释放失败只记录日志。
    pub async fn disconnect(&self, session: &Session) {
        if session.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("[SSH] Disconnecting from {}@{}", session.user, session.host);

        close_fs(session.fs.as_ref()).await;
        close_shell(session.shell.as_ref()).await;
        close_link(session.link.as_ref()).await;

        session.set_state(ConnectionState::Disconnected);
        self.ui.connection(ConnectionState::Disconnected);
    }
}

async fn close_fs(fs: &dyn RemoteFs) {
    match fs.close().await {
        Ok(()) | Err(SftpError::Closed) => {}
        Err(e) => warn!("[SFTP] Failed to close SFTP channel: {}", e),
    }
}

async fn close_shell(shell: &dyn ShellIo) {
    match shell.close().await {
        Ok(()) => {}
        Err(e) if e.is_already_closed() => {}
        Err(e) => warn!("[Shell] Failed to close shell channel: {}", e),
    }
}

async fn close_link(link: &dyn SessionLink) {
    match link.close().await {
        Ok(()) => {}
        Err(e) if e.is_already_closed() => {}
        Err(e) => warn!("[SSH] Failed to close session: {}", e),
    }
}
