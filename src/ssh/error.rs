// SSH 错误类型定义

use thiserror::Error;

/// SSH 错误类型
///
/// 连接阶段的错误（超时、认证、网络）都会让本次连接失败；
/// `Channel` / `Disconnected` 出现在连接建立之后时只影响单个操作。
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 连接超时
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 会话已断开
    #[error("Session disconnected: {0}")]
    Disconnected(String),
}

impl SshError {
    /// 是否属于“已经关闭”一类的错误（断开时可忽略）
    pub fn is_already_closed(&self) -> bool {
        matches!(self, SshError::Disconnected(_))
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        match e {
            russh::Error::Disconnect | russh::Error::SendError => {
                SshError::Disconnected(e.to_string())
            }
            other => SshError::Protocol(other.to_string()),
        }
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}
